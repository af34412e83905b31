//! Process-wide experiment record.

use serde::{Deserialize, Serialize};

/// Counters shared by every subject.
///
/// The shuffle permutation is deliberately global: the bag is a property
/// of the device, not of the subject, so two animals alternating at the
/// box walk the same permutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalRecord {
    /// Rewards dispensed today, against the configured daily cap
    pub rewards_today: u32,
    /// Experiment day of month the daily count belongs to
    pub reward_day: u32,
    /// Persisted shuffle permutation, as indices into the trial list
    pub shuffle_order: Vec<usize>,
}

impl GlobalRecord {
    /// Prepare a loaded record for a new session.
    pub fn begin_session(&mut self) {
        self.rewards_today = 0;
    }

    /// Serialized value of a schema-declared field.
    #[must_use]
    pub fn field_value(&self, name: &str) -> Option<String> {
        let value = match name {
            "rewards_today" => self.rewards_today.to_string(),
            "reward_day" => self.reward_day.to_string(),
            "shuffle_order" => format!("{:?}", self.shuffle_order),
            _ => return None,
        };
        Some(value)
    }
}
