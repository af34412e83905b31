//! Per-subject experiment record.

use serde::{Deserialize, Serialize};

use super::window::SlidingWindow;
use crate::Side;

/// Experiment state for one subject, keyed by its tag id.
///
/// Created on first detection of a new tag, persisted across restarts,
/// and mutated only by the trial engine. Fields flagged `session_reset`
/// in [`super::schema::ANIMAL_FIELDS`] are zeroed by
/// [`AnimalRecord::begin_session`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimalRecord {
    /// Entry rewards collected
    pub entry_count: u32,
    /// Training rewards collected, pooled across both sides
    pub push_count_either: u32,
    /// Training rewards collected on the right
    pub push_count_right: u32,
    /// Training rewards collected on the left
    pub push_count_left: u32,
    /// Right pushes during training (feeds preference initialization)
    pub training_push_right: u32,
    /// Left pushes during training (feeds preference initialization)
    pub training_push_left: u32,
    /// Learned side preference, set lazily from the training counts
    pub preference: Option<Side>,
    /// Current test, 1-based; 0 means training mode
    pub current_test: usize,
    /// Current block within the test
    pub current_block: u32,
    /// Trials performed in the current block
    pub trial_count: usize,
    /// Trials succeeded in the current block
    pub trial_success_count: u32,
    /// Blocks failed in the current test
    pub failed_blocks: u32,
    /// Consecutive blocks succeeded in the current test
    pub block_success_count: u32,
    /// Trials failed in the current block
    pub failed_trials: u32,
    /// Failures on the current trial (drives the repeat budget)
    pub failed_current_trial: u32,
    /// Tests completed this session
    pub tests_this_session: u32,
    /// Recent trial outcomes, one slot per trial in the block
    pub sliding_window: SlidingWindow,
}

impl AnimalRecord {
    /// Prepare a loaded or freshly created record for a new session.
    ///
    /// Zeroes the session-scoped counters and reallocates the sliding
    /// window if the configured block length changed.
    pub fn begin_session(&mut self, trials_in_block: usize) {
        self.entry_count = 0;
        self.tests_this_session = 0;
        if self.sliding_window.len() != trials_in_block {
            self.sliding_window.reset(trials_in_block);
        }
    }

    /// Training pushes recorded for `side`.
    #[must_use]
    pub const fn training_pushes(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.training_push_left,
            Side::Right => self.training_push_right,
        }
    }

    /// Training rewards collected on `side`.
    #[must_use]
    pub const fn side_rewards(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.push_count_left,
            Side::Right => self.push_count_right,
        }
    }

    /// Serialized value of a schema-declared field, for summaries and the
    /// round-trip tests.
    #[must_use]
    pub fn field_value(&self, name: &str) -> Option<String> {
        let value = match name {
            "entry_count" => self.entry_count.to_string(),
            "push_count_either" => self.push_count_either.to_string(),
            "push_count_right" => self.push_count_right.to_string(),
            "push_count_left" => self.push_count_left.to_string(),
            "training_push_right" => self.training_push_right.to_string(),
            "training_push_left" => self.training_push_left.to_string(),
            "preference" => self.preference.map_or_else(|| "unset".to_string(), |s| s.to_string()),
            "current_test" => self.current_test.to_string(),
            "current_block" => self.current_block.to_string(),
            "trial_count" => self.trial_count.to_string(),
            "trial_success_count" => self.trial_success_count.to_string(),
            "failed_blocks" => self.failed_blocks.to_string(),
            "block_success_count" => self.block_success_count.to_string(),
            "failed_trials" => self.failed_trials.to_string(),
            "failed_current_trial" => self.failed_current_trial.to_string(),
            "tests_this_session" => self.tests_this_session.to_string(),
            "sliding_window" => format!("{}/{}", self.sliding_window.sum(), self.sliding_window.len()),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::super::schema::ANIMAL_FIELDS;
    use super::*;

    #[test]
    fn test_begin_session_resets_session_fields() {
        let mut record = AnimalRecord {
            entry_count: 2,
            tests_this_session: 1,
            push_count_either: 4,
            ..AnimalRecord::default()
        };
        record.begin_session(4);
        assert_eq!(record.entry_count, 0);
        assert_eq!(record.tests_this_session, 0);
        // Persistent counters survive.
        assert_eq!(record.push_count_either, 4);
        assert_eq!(record.sliding_window.len(), 4);
    }

    #[test]
    fn test_begin_session_keeps_matching_window() {
        let mut record = AnimalRecord::default();
        record.sliding_window.reset(4);
        record.sliding_window.mark(0, true);
        record.begin_session(4);
        assert_eq!(record.sliding_window.sum(), 1);
    }

    #[test]
    fn test_every_schema_field_is_readable() {
        let record = AnimalRecord::default();
        for spec in ANIMAL_FIELDS {
            assert!(record.field_value(spec.name).is_some(), "missing field {}", spec.name);
        }
    }
}
