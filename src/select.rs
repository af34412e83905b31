//! Next-trial selection and answer resolution.
//!
//! Three selection policies pick the next trial template from a test's
//! list; the authored answer is then resolved against the subject's side
//! preference. The shuffle bag is persisted globally so the permutation
//! survives restarts, and a failed trial that is being repeated does not
//! consume a bag slot: the reshuffle check requires the current trial to
//! be failure-free, decoupling "bag exhausted" from the raw trial count.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::{Answer, AnswerSpec, CuePattern, SelectionMode, TestDefinition};
use crate::error::{Error, Result};
use crate::subject::{AnimalRecord, GlobalRecord};
use crate::Side;

/// Produces the next trial's required answer and cue pattern.
pub struct AnswerSelector<R: Rng = StdRng> {
    rng: R,
}

impl AnswerSelector<StdRng> {
    /// A selector seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }
}

impl Default for AnswerSelector<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> AnswerSelector<R> {
    /// A selector with an explicit RNG (deterministic under test).
    pub const fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Pick the next trial for `test` and resolve its answer.
    ///
    /// Initializes the subject's preference from the training push counts
    /// the first time a resolution needs it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalAnswer`] when resolution produces a value
    /// outside the legal set, which signals a configuration-authoring
    /// defect.
    pub fn next_trial(
        &mut self,
        test: &TestDefinition,
        animal: &mut AnimalRecord,
        global: &mut GlobalRecord,
    ) -> Result<(Answer, CuePattern)> {
        let trial = match test.mode() {
            SelectionMode::Random => {
                // The list is never empty (parse rejects empty tests).
                *test
                    .trials()
                    .choose(&mut self.rng)
                    .ok_or_else(|| Error::Config(format!("test '{}' has no trials", test.name())))?
            }
            SelectionMode::Sequential => test.trials()[animal.trial_count % test.trials().len()],
            SelectionMode::Shuffle => self.shuffled_trial(test, animal, global),
        };

        self.ensure_preference(animal);
        let answer = resolve(trial.answer, animal.preference, test.name())?;
        debug!(test = test.name(), authored = ?trial.answer, resolved = ?answer, "trial selected");
        Ok((answer, trial.cue))
    }

    fn shuffled_trial(
        &mut self,
        test: &TestDefinition,
        animal: &AnimalRecord,
        global: &mut GlobalRecord,
    ) -> crate::config::Trial {
        let len = test.trials().len();
        let at_boundary = animal.trial_count % len == 0;
        let fresh_trial = animal.failed_current_trial == 0;
        let stale = global.shuffle_order.is_empty()
            || global.shuffle_order.iter().any(|&i| i >= len);
        if (at_boundary && fresh_trial) || stale {
            let mut order: Vec<usize> = (0..len).collect();
            order.shuffle(&mut self.rng);
            info!(test = test.name(), ?order, "reshuffled trial bag");
            global.shuffle_order = order;
            test.trials()[global.shuffle_order[0]]
        } else {
            let index = global.shuffle_order[animal.trial_count % global.shuffle_order.len()];
            test.trials()[index]
        }
    }

    /// Initialize the preference from the training counts if unset: the
    /// side that accrued more training pushes, ties broken by a fair
    /// coin flip.
    fn ensure_preference(&mut self, animal: &mut AnimalRecord) {
        if animal.preference.is_some() {
            return;
        }
        let side = if animal.training_push_right > animal.training_push_left {
            Side::Right
        } else if animal.training_push_left > animal.training_push_right {
            Side::Left
        } else if self.rng.gen_bool(0.5) {
            Side::Right
        } else {
            Side::Left
        };
        info!(
            %side,
            right = animal.training_push_right,
            left = animal.training_push_left,
            "initialized side preference from training pushes"
        );
        animal.preference = Some(side);
    }
}

/// Resolve an authored answer against the subject's preference.
fn resolve(spec: AnswerSpec, preference: Option<Side>, test: &str) -> Result<Answer> {
    let answer = match spec {
        AnswerSpec::Left => Answer::Left,
        AnswerSpec::Right => Answer::Right,
        AnswerSpec::Either => Answer::Either,
        AnswerSpec::Input => Answer::Input,
        AnswerSpec::Same => preference
            .map(Answer::from)
            .ok_or_else(|| Error::IllegalAnswer { test: test.to_string() })?,
        AnswerSpec::Opposite => preference
            .map(|side| Answer::from(side.opposite()))
            .ok_or_else(|| Error::IllegalAnswer { test: test.to_string() })?,
    };
    Ok(answer)
}
