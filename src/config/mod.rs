//! Typed configuration for the puzzle-box controller.
//!
//! The configuration is a TOML file of per-concern sections. Every field
//! has a default matching the stock experiment, so a partial file is
//! legal; a missing file triggers template generation and a fatal error so
//! the operator reviews the defaults before the first session (see
//! [`Config::load_or_template`]).

mod file;
pub mod testdef;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
pub use testdef::{Answer, AnswerSpec, CuePattern, SelectionMode, TestDefinition, Trial};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reward budgets
    pub rewards: RewardsConfig,
    /// Trial/block/test progression
    pub blocks: BlocksConfig,
    /// Failure escalation
    pub failure: FailureConfig,
    /// Subject presence detection
    pub presence: PresenceConfig,
    /// Loop intervals and debounce tuning
    pub timing: TimingConfig,
    /// Test order and trial lists
    pub tests: TestsConfig,
}

/// Reward budgets: entry rewards, training push rewards, and the daily cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// Maximum entry rewards per subject
    pub entry_reward: u32,
    /// Maximum training push rewards, pooled across both sides
    pub push_reward_either: u32,
    /// Maximum training push rewards for the right side
    pub push_reward_right: u32,
    /// Maximum training push rewards for the left side
    pub push_reward_left: u32,
    /// Maximum rewards dispensed in one day (all subjects)
    pub daily_max: u32,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            entry_reward: 2,
            push_reward_either: 4,
            push_reward_right: 2,
            push_reward_left: 2,
            daily_max: 50,
        }
    }
}

/// Trial/block/test progression parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocksConfig {
    /// Trials in a block (also the sliding-window length)
    pub trials_in_block: usize,
    /// Successful trials required for a block to succeed
    pub success_threshold: u32,
    /// Consecutive successful blocks required to advance to the next test
    pub blocks_to_pass: u32,
    /// Rolling-window block completion instead of fixed-length blocks
    pub consecutive: bool,
    /// Test to loop back to once all tests are complete (0 disables looping)
    pub loop_test: usize,
    /// Maximum tests one subject may complete per session (0 = unlimited)
    pub max_tests_per_session: u32,
}

impl Default for BlocksConfig {
    fn default() -> Self {
        Self {
            trials_in_block: 12,
            success_threshold: 9,
            blocks_to_pass: 2,
            consecutive: false,
            loop_test: 0,
            max_tests_per_session: 1,
        }
    }
}

/// Failure handling: retry budget and escalating timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    /// Pause after every failed trial, in seconds
    pub fail_delay_secs: u64,
    /// Times a failed trial is repeated before moving on
    pub fail_trial_repeat: u32,
    /// Failed trials per block that trigger the long timeout (0 disables)
    pub max_failed_trials: u32,
    /// Timeout once `max_failed_trials` is reached, in seconds
    pub failed_trials_timeout_secs: u64,
    /// Failed blocks per test that trigger the long timeout (0 disables)
    pub max_failed_blocks: u32,
    /// Timeout once `max_failed_blocks` is reached, in minutes
    pub failed_blocks_timeout_mins: u64,
    /// Pause between consecutive tests, in seconds (0 disables)
    pub between_test_timeout_secs: u64,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            fail_delay_secs: 5,
            fail_trial_repeat: 0,
            max_failed_trials: 0,
            failed_trials_timeout_secs: 60,
            max_failed_blocks: 0,
            failed_blocks_timeout_mins: 30,
            between_test_timeout_secs: 0,
        }
    }
}

/// Subject presence detection thresholds.
///
/// The reliability filter is what keeps a single spurious read from
/// evicting the current subject: identity switches are trusted quickly
/// only after readings have been dense for `time_until_reliable_secs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Silence before the current subject counts as departed, in seconds
    pub rfid_timeout_secs: f64,
    /// Time a foreign tag must dominate before the subject is switched,
    /// in seconds
    pub new_animal_timeout_secs: f64,
    /// Read gap after which readings count as noisy again, in seconds
    pub reliability_delay_threshold_secs: f64,
    /// Dense-reading time required before fast switches are trusted,
    /// in seconds
    pub time_until_reliable_secs: f64,
    /// Tags the controller refuses to serve
    pub ignored_tags: Vec<String>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            rfid_timeout_secs: 5.0,
            new_animal_timeout_secs: 1.0,
            reliability_delay_threshold_secs: 3.0,
            time_until_reliable_secs: 10.0,
            ignored_tags: Vec::new(),
        }
    }
}

/// Loop intervals, debounce tuning, and the feeder cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Main-loop poll interval while waiting for a response, in ms
    pub input_poll_ms: u64,
    /// Poll interval while waiting for a subject to arrive, in ms
    pub idle_poll_ms: u64,
    /// Timeout countdown tick, in ms
    pub timeout_tick_ms: u64,
    /// Minimum interval between feed cycles, in ms
    pub min_feed_interval_ms: u64,
    /// Poll interval while waiting for the feeder switch to engage, in ms
    pub feed_engage_poll_ms: u64,
    /// Poll interval while waiting for the feeder switch to release, in ms
    pub feed_release_poll_ms: u64,
    /// Level re-checks confirming a button edge
    pub press_rechecks: u32,
    /// Interval between level re-checks, in ms
    pub press_recheck_ms: u64,
    /// Settle time before arming the press listener, in ms
    pub press_warmup_ms: u64,
    /// Pause after an entry reward, in ms
    pub entry_pause_ms: u64,
    /// Unconditional feed interval while waiting for input, in minutes
    /// (0 disables timed feeding)
    pub timed_feed_interval_mins: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            input_poll_ms: 20,
            idle_poll_ms: 500,
            timeout_tick_ms: 1000,
            min_feed_interval_ms: 500,
            feed_engage_poll_ms: 100,
            feed_release_poll_ms: 50,
            press_rechecks: 1,
            press_recheck_ms: 10,
            press_warmup_ms: 50,
            entry_pause_ms: 1000,
            timed_feed_interval_mins: 0,
        }
    }
}

/// Test order and per-test trial lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestsConfig {
    /// The ordered sequence of tests to be performed
    pub order: Vec<String>,
    /// Trial templates per test, each an `ANSWER-CUE` pair.
    ///
    /// The answer character is `R`, `L`, `E` (either), `I` (input),
    /// `S` (same as preference) or `O` (opposite from preference); the cue
    /// character is `R`, `L`, `B` (both) or `N` (neither).
    pub lists: BTreeMap<String, Vec<String>>,
}

impl Default for TestsConfig {
    fn default() -> Self {
        let mut lists = BTreeMap::new();
        lists.insert("shuffle1".to_string(), vec!["L-L".to_string(), "R-R".to_string()]);
        Self {
            order: vec!["shuffle1".to_string()],
            lists,
        }
    }
}

impl Config {
    /// Check cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when block geometry is impossible or the
    /// test order references a missing trial list.
    pub fn validate(&self) -> Result<()> {
        if self.blocks.trials_in_block == 0 {
            return Err(Error::Config("trials_in_block must be at least 1".into()));
        }
        if self.blocks.success_threshold as usize > self.blocks.trials_in_block {
            return Err(Error::Config(format!(
                "success_threshold ({}) exceeds trials_in_block ({})",
                self.blocks.success_threshold, self.blocks.trials_in_block
            )));
        }
        if self.blocks.loop_test > self.tests.order.len() {
            return Err(Error::Config(format!(
                "loop_test ({}) exceeds the number of configured tests ({})",
                self.blocks.loop_test,
                self.tests.order.len()
            )));
        }
        for name in &self.tests.order {
            if !self.tests.lists.contains_key(name) {
                return Err(Error::Config(format!("test '{name}' has no trial list")));
            }
        }
        Ok(())
    }

    /// Parse the configured trial lists into [`TestDefinition`]s, in
    /// session order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a list is missing, empty, or
    /// contains an unparseable template.
    pub fn test_definitions(&self) -> Result<Vec<TestDefinition>> {
        self.tests
            .order
            .iter()
            .map(|name| {
                let templates = self
                    .tests
                    .lists
                    .get(name)
                    .ok_or_else(|| Error::Config(format!("test '{name}' has no trial list")))?;
                TestDefinition::parse(name, templates)
            })
            .collect()
    }

    /// Whether `tag` is on the ignore list.
    #[must_use]
    pub fn is_ignored(&self, tag: &str) -> bool {
        self.presence.ignored_tags.iter().any(|t| t == tag)
    }

    /// Pause after a failed trial.
    #[must_use]
    pub const fn fail_delay(&self) -> Duration {
        Duration::from_secs(self.failure.fail_delay_secs)
    }

    /// Timeout applied when `max_failed_trials` is reached.
    #[must_use]
    pub const fn failed_trials_timeout(&self) -> Duration {
        Duration::from_secs(self.failure.failed_trials_timeout_secs)
    }

    /// Timeout applied when `max_failed_blocks` is reached.
    #[must_use]
    pub const fn failed_blocks_timeout(&self) -> Duration {
        Duration::from_secs(self.failure.failed_blocks_timeout_mins * 60)
    }

    /// Pause between consecutive tests.
    #[must_use]
    pub const fn between_test_timeout(&self) -> Duration {
        Duration::from_secs(self.failure.between_test_timeout_secs)
    }

    /// Unconditional feed interval (zero when disabled).
    #[must_use]
    pub const fn timed_feed_interval(&self) -> Duration {
        Duration::from_secs(self.timing.timed_feed_interval_mins * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        let tests = config.test_definitions().unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].mode(), SelectionMode::Shuffle);
        assert_eq!(tests[0].trials().len(), 2);
    }

    #[test]
    fn test_validate_rejects_impossible_threshold() {
        let mut config = Config::default();
        config.blocks.trials_in_block = 4;
        config.blocks.success_threshold = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dangling_test_name() {
        let mut config = Config::default();
        config.tests.order.push("missing".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_loop_test() {
        let mut config = Config::default();
        config.blocks.loop_test = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [blocks]
            trials_in_block = 4
            success_threshold = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.blocks.trials_in_block, 4);
        assert_eq!(config.blocks.success_threshold, 3);
        assert_eq!(config.rewards.entry_reward, 2);
        assert_eq!(config.presence.rfid_timeout_secs, 5.0);
    }
}
