//! Record field metadata.
//!
//! The field tables declare, once, which persisted counters survive a
//! process restart and which reset at the start of each session. The
//! record structs apply the reset set in their `begin_session` methods;
//! the round-trip tests walk these tables to confirm every declared field
//! is actually persisted.

/// Metadata for one persisted record field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name as serialized
    pub name: &'static str,
    /// Operator-facing description
    pub description: &'static str,
    /// Whether the field resets at the start of a new session
    pub session_reset: bool,
}

const fn field(name: &'static str, description: &'static str, session_reset: bool) -> FieldSpec {
    FieldSpec { name, description, session_reset }
}

/// Per-subject record fields.
pub const ANIMAL_FIELDS: &[FieldSpec] = &[
    field("entry_count", "Entry rewards collected", true),
    field("push_count_either", "Training rewards collected, both sides", false),
    field("push_count_right", "Training rewards collected, right", false),
    field("push_count_left", "Training rewards collected, left", false),
    field("training_push_right", "Right pushes during training", false),
    field("training_push_left", "Left pushes during training", false),
    field("preference", "Learned side preference", false),
    field("current_test", "Current test (0 = training)", false),
    field("current_block", "Current block", false),
    field("trial_count", "Trials performed in the current block", false),
    field("trial_success_count", "Trials succeeded in the current block", false),
    field("failed_blocks", "Blocks failed in the current test", false),
    field("block_success_count", "Blocks succeeded in the current test", false),
    field("failed_trials", "Trials failed in the current block", false),
    field("failed_current_trial", "Failures on the current trial", false),
    field("tests_this_session", "Tests completed this session", true),
    field("sliding_window", "Recent trial outcomes", false),
];

/// Global record fields.
pub const GLOBAL_FIELDS: &[FieldSpec] = &[
    field("shuffle_order", "Persisted trial permutation", false),
    field("rewards_today", "Rewards dispensed today", true),
    field("reward_day", "Experiment day of month", false),
];
