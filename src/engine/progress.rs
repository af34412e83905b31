//! Trial/block/test progression rules.
//!
//! Pure record transformations, separated from the engine's waiting and
//! actuation so the progression grid is testable without hardware. The
//! engine interleaves timeouts and cues between these calls; counters
//! that reset *after* an escalation timeout are reset by the caller.

use crate::config::Config;
use crate::subject::AnimalRecord;

/// Effects of an incorrect response, decided before any timeout runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FailureEffects {
    /// The same trial index repeats (retry budget not exhausted)
    pub repeat: bool,
    /// The failed-trials escalation timeout fires
    pub escalate: bool,
}

/// Post-trial block state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockCompletion {
    /// The block continues
    Pending,
    /// The block completed successfully
    Success,
    /// The block completed as a failure (fixed mode only)
    Failure,
}

/// Record a correct response.
pub(crate) fn apply_trial_success(animal: &mut AnimalRecord) {
    animal.trial_success_count += 1;
    animal.failed_current_trial = 0;
    animal.sliding_window.mark(animal.trial_count, true);
}

/// Record an incorrect response and decide repeat/escalation.
///
/// `failed_trials` is left for the caller to reset once the escalation
/// timeout has run.
pub(crate) fn apply_trial_failure(config: &Config, animal: &mut AnimalRecord) -> FailureEffects {
    animal.failed_trials += 1;
    animal.failed_current_trial += 1;
    animal.sliding_window.mark(animal.trial_count, false);
    let escalate = config.failure.max_failed_trials > 0
        && animal.failed_trials >= config.failure.max_failed_trials;
    let repeat = config.failure.fail_trial_repeat >= animal.failed_current_trial;
    if !repeat {
        animal.failed_current_trial = 0;
    }
    FailureEffects { repeat, escalate }
}

/// Advance the trial count after logging. A repeating trial holds its
/// index so the same trial is served again.
pub(crate) fn advance_trial(animal: &mut AnimalRecord, repeat: bool) {
    if !repeat {
        animal.trial_count += 1;
    }
}

/// Block-completion check, run after every answered trial.
///
/// Consecutive mode completes the instant the window's success count
/// reaches the threshold (and never fails a block); fixed mode judges
/// the block once `trials_in_block` trials have run.
pub(crate) fn check_block(config: &Config, animal: &AnimalRecord) -> BlockCompletion {
    if config.blocks.consecutive {
        if animal.sliding_window.sum() >= config.blocks.success_threshold {
            BlockCompletion::Success
        } else {
            BlockCompletion::Pending
        }
    } else if animal.trial_count >= config.blocks.trials_in_block {
        if animal.trial_success_count >= config.blocks.success_threshold {
            BlockCompletion::Success
        } else {
            BlockCompletion::Failure
        }
    } else {
        BlockCompletion::Pending
    }
}

/// Effects of a successful block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockSuccess {
    /// The test advanced (`blocks_to_pass` consecutive successes)
    pub test_advanced: bool,
    /// The between-test pause should run
    pub between_test_pause: bool,
}

/// Record a successful block; advances the test when the consecutive
/// success requirement is met, wrapping to `loop_test` if configured.
pub(crate) fn apply_block_success(
    config: &Config,
    test_count: usize,
    animal: &mut AnimalRecord,
) -> BlockSuccess {
    animal.block_success_count += 1;
    if animal.block_success_count < config.blocks.blocks_to_pass {
        return BlockSuccess { test_advanced: false, between_test_pause: false };
    }
    animal.current_test += 1;
    animal.tests_this_session += 1;
    animal.block_success_count = 0;
    if animal.current_test > test_count && config.blocks.loop_test > 0 {
        animal.current_test = config.blocks.loop_test;
    }
    BlockSuccess {
        test_advanced: true,
        between_test_pause: config.failure.between_test_timeout_secs > 0,
    }
}

/// Record a failed block. Returns whether the failed-blocks escalation
/// timeout fires; the caller resets the counter after the timeout.
pub(crate) fn apply_block_failure(config: &Config, animal: &mut AnimalRecord) -> bool {
    animal.failed_blocks += 1;
    config.failure.max_failed_blocks > 0
        && animal.failed_blocks >= config.failure.max_failed_blocks
}

/// Reset per-block counters and the window at block end.
pub(crate) fn end_block(config: &Config, animal: &mut AnimalRecord) {
    animal.trial_count = 0;
    animal.current_block += 1;
    animal.failed_trials = 0;
    animal.trial_success_count = 0;
    animal.sliding_window.reset(config.blocks.trials_in_block);
}

/// Whether the subject still has tests to run: tests remain in the
/// sequence and the per-session cap (0 = unlimited) is not reached.
pub(crate) fn has_tests_left(config: &Config, test_count: usize, animal: &AnimalRecord) -> bool {
    let tests_left = animal.current_test <= test_count;
    let session_ok = config.blocks.max_tests_per_session == 0
        || animal.tests_this_session < config.blocks.max_tests_per_session;
    tests_left && session_ok
}
