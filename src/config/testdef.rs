//! Test definitions: named trial lists and their selection policy.
//!
//! A test is an ordered list of trial templates, each written as an
//! `ANSWER-CUE` pair (for example `"L-B"`: the left button is correct and
//! both LEDs light up). The selection policy is chosen by name prefix:
//! `random*` draws uniformly, `shuffle*` walks a persisted permutation,
//! anything else cycles the list in order.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::Side;

/// Which indicator LEDs a trial lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CuePattern {
    /// Left LED only
    Left,
    /// Right LED only
    Right,
    /// Both LEDs
    Both,
    /// Neither LED
    Neither,
}

impl CuePattern {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'L' => Some(Self::Left),
            'R' => Some(Self::Right),
            // 'E' is accepted as a legacy spelling of "both"
            'B' | 'E' => Some(Self::Both),
            'N' => Some(Self::Neither),
            _ => None,
        }
    }
}

/// Authored answer of a trial template, before resolution.
///
/// `Same` and `Opposite` are relative to the subject's side preference and
/// must be resolved to a concrete [`Answer`] before the trial runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerSpec {
    /// Left button is correct
    Left,
    /// Right button is correct
    Right,
    /// Either button is correct
    Either,
    /// Any input is correct and sets the subject's preference
    Input,
    /// Same side as the subject's preference
    Same,
    /// Opposite side from the subject's preference
    Opposite,
}

impl AnswerSpec {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'L' => Some(Self::Left),
            'R' => Some(Self::Right),
            'E' => Some(Self::Either),
            'I' => Some(Self::Input),
            'S' => Some(Self::Same),
            'O' => Some(Self::Opposite),
            _ => None,
        }
    }
}

/// Resolved answer: what the subject must actually push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Answer {
    /// Left button
    Left,
    /// Right button
    Right,
    /// Either button
    Either,
    /// Any input (and the pushed side becomes the new preference)
    Input,
}

impl Answer {
    /// Whether a push of `side` counts as a correct response.
    #[must_use]
    pub const fn accepts(self, side: Side) -> bool {
        match self {
            Self::Either | Self::Input => true,
            Self::Left => matches!(side, Side::Left),
            Self::Right => matches!(side, Side::Right),
        }
    }

    /// Human-readable label used in result records.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Either => "Either",
            Self::Input => "Input",
        }
    }
}

impl From<Side> for Answer {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => Self::Left,
            Side::Right => Self::Right,
        }
    }
}

/// One stimulus-presentation/response template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trial {
    /// Authored answer
    pub answer: AnswerSpec,
    /// LED pattern presented with the trial
    pub cue: CuePattern,
}

impl Trial {
    /// Parse an `ANSWER-CUE` template such as `"L-B"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadTrialTemplate`] when the template is not a
    /// dash-separated pair of legal answer and cue characters.
    pub fn parse(test: &str, template: &str) -> Result<Self> {
        let bad = || Error::BadTrialTemplate {
            test: test.to_string(),
            template: template.to_string(),
        };
        let (answer, cue) = template.trim().split_once('-').ok_or_else(bad)?;
        let answer = single_char(answer).and_then(AnswerSpec::from_char).ok_or_else(bad)?;
        let cue = single_char(cue).and_then(CuePattern::from_char).ok_or_else(bad)?;
        Ok(Self { answer, cue })
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.trim().chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

/// How the next trial is picked from a test's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Cycle the list in authored order
    Sequential,
    /// Independent uniform draw each trial
    Random,
    /// Walk a persisted shuffled permutation (a "bag")
    Shuffle,
}

impl SelectionMode {
    /// Selection policy encoded in the test's name prefix.
    #[must_use]
    pub fn for_name(name: &str) -> Self {
        if name.starts_with("random") {
            Self::Random
        } else if name.starts_with("shuffle") {
            Self::Shuffle
        } else {
            Self::Sequential
        }
    }
}

/// A named, ordered set of trial templates.
#[derive(Debug, Clone)]
pub struct TestDefinition {
    name: String,
    mode: SelectionMode,
    trials: Vec<Trial>,
}

impl TestDefinition {
    /// Parse a test from its name and the authored list of templates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty list and
    /// [`Error::BadTrialTemplate`] for an unparseable template.
    pub fn parse(name: &str, templates: &[String]) -> Result<Self> {
        let trials = templates
            .iter()
            .map(|t| Trial::parse(name, t))
            .collect::<Result<Vec<_>>>()?;
        if trials.is_empty() {
            return Err(Error::Config(format!("test '{name}' has no trials")));
        }
        Ok(Self {
            name: name.to_string(),
            mode: SelectionMode::for_name(name),
            trials,
        })
    }

    /// Test name as configured.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Selection policy derived from the name.
    #[must_use]
    pub const fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// The ordered trial templates.
    #[must_use]
    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_parse() {
        let trial = Trial::parse("t", "L-B").unwrap();
        assert_eq!(trial.answer, AnswerSpec::Left);
        assert_eq!(trial.cue, CuePattern::Both);

        let trial = Trial::parse("t", " O-N ").unwrap();
        assert_eq!(trial.answer, AnswerSpec::Opposite);
        assert_eq!(trial.cue, CuePattern::Neither);
    }

    #[test]
    fn test_trial_parse_rejects_garbage() {
        assert!(Trial::parse("t", "LB").is_err());
        assert!(Trial::parse("t", "Q-B").is_err());
        assert!(Trial::parse("t", "L-Q").is_err());
        assert!(Trial::parse("t", "LL-B").is_err());
        assert!(Trial::parse("t", "").is_err());
    }

    #[test]
    fn test_mode_from_name_prefix() {
        assert_eq!(SelectionMode::for_name("shuffle1"), SelectionMode::Shuffle);
        assert_eq!(SelectionMode::for_name("random_easy"), SelectionMode::Random);
        assert_eq!(SelectionMode::for_name("trajectory"), SelectionMode::Sequential);
    }

    #[test]
    fn test_answer_accepts() {
        assert!(Answer::Either.accepts(Side::Left));
        assert!(Answer::Input.accepts(Side::Right));
        assert!(Answer::Left.accepts(Side::Left));
        assert!(!Answer::Left.accepts(Side::Right));
    }

    #[test]
    fn test_definition_requires_trials() {
        assert!(TestDefinition::parse("empty", &[]).is_err());
        let def = TestDefinition::parse("seq", &["L-L".into(), "R-R".into()]).unwrap();
        assert_eq!(def.trials().len(), 2);
        assert_eq!(def.mode(), SelectionMode::Sequential);
    }
}
