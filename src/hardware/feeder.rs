//! Reward dispensing.
//!
//! One feed cycle drives the dispenser motor until the mechanical
//! confirmation switch engages, then keeps driving until it releases
//! again: seeing both edges proves a full revolution rather than a
//! partial one. A mutual-exclusion lock serializes cycles, and a minimum
//! interval after each cycle vetoes immediate re-triggering; both are
//! observable from the edge-callback context through [`FeedStatus`]
//! without taking any lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use super::{DigitalInput, DigitalOutput};
use crate::config::TimingConfig;

/// Why a feed request was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedError {
    /// A cycle is already running, or the minimum interval since the
    /// last cycle has not elapsed. The request is dropped, not queued.
    #[error("feed cycle in progress or cooldown active")]
    Busy,
}

/// Feed-cycle state shared with the edge-callback context.
///
/// Callbacks only load atomics here; the cycle lock itself is never
/// taken outside the main loop.
pub struct FeedStatus {
    origin: Instant,
    feeding: AtomicBool,
    /// Milliseconds from `origin` to the end of the last feed;
    /// `u64::MAX` until the first cycle completes.
    last_end_ms: AtomicU64,
}

impl FeedStatus {
    fn new(origin: Instant) -> Self {
        Self {
            origin,
            feeding: AtomicBool::new(false),
            last_end_ms: AtomicU64::new(u64::MAX),
        }
    }

    /// Whether a feed cycle is currently running.
    #[must_use]
    pub fn is_feeding(&self) -> bool {
        self.feeding.load(Ordering::Acquire)
    }

    /// Time since the last completed cycle, `None` before the first.
    #[must_use]
    pub fn since_last_feed(&self, now: Instant) -> Option<Duration> {
        let end_ms = self.last_end_ms.load(Ordering::Acquire);
        if end_ms == u64::MAX {
            return None;
        }
        let now_ms = now.saturating_duration_since(self.origin).as_millis() as u64;
        Some(Duration::from_millis(now_ms.saturating_sub(end_ms)))
    }

    fn mark_end(&self, now: Instant) {
        let now_ms = now.saturating_duration_since(self.origin).as_millis() as u64;
        self.last_end_ms.store(now_ms, Ordering::Release);
    }
}

/// Motor/switch poll intervals and the cooldown.
#[derive(Debug, Clone)]
pub struct FeederTiming {
    /// Minimum interval between cycles
    pub min_interval: Duration,
    /// Poll interval while waiting for the switch to engage
    pub engage_poll: Duration,
    /// Poll interval while waiting for the switch to release
    pub release_poll: Duration,
}

impl From<&TimingConfig> for FeederTiming {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(timing.min_feed_interval_ms),
            engage_poll: Duration::from_millis(timing.feed_engage_poll_ms),
            release_poll: Duration::from_millis(timing.feed_release_poll_ms),
        }
    }
}

struct Drive {
    motor: Box<dyn DigitalOutput>,
    standby: Box<dyn DigitalOutput>,
}

/// Serializes and executes reward-dispense cycles.
///
/// `feed` takes `&self`; the motor outputs live behind the cycle lock so
/// concurrent callers contend on `try_lock` and observe [`FeedError::Busy`]
/// instead of overlapping cycles.
pub struct FeederController {
    drive: Mutex<Drive>,
    switch: Box<dyn DigitalInput>,
    status: Arc<FeedStatus>,
    timing: FeederTiming,
}

impl FeederController {
    /// Wrap the motor outputs and confirmation switch.
    ///
    /// `motor` is the driven direction; `standby` is the opposite
    /// direction's output, held inactive through every cycle.
    pub fn new(
        mut motor: Box<dyn DigitalOutput>,
        mut standby: Box<dyn DigitalOutput>,
        switch: Box<dyn DigitalInput>,
        timing: FeederTiming,
    ) -> Self {
        motor.set(false);
        standby.set(false);
        Self {
            drive: Mutex::new(Drive { motor, standby }),
            switch,
            status: Arc::new(FeedStatus::new(Instant::now())),
            timing,
        }
    }

    /// Shared status handle for the edge-callback veto.
    #[must_use]
    pub fn status(&self) -> Arc<FeedStatus> {
        Arc::clone(&self.status)
    }

    /// Run one reward-dispense cycle.
    ///
    /// Blocks until the mechanism completes a full revolution. There is
    /// no mid-cycle cancellation; a cycle, once started, runs to
    /// mechanical completion.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Busy`] when a cycle is already running or
    /// `now` is within the minimum interval after the last cycle; the
    /// caller must not retry immediately.
    pub fn feed(&self, now: Instant) -> Result<(), FeedError> {
        let Some(mut drive) = self.drive.try_lock() else {
            debug!("feed request dropped: cycle in progress");
            return Err(FeedError::Busy);
        };
        if let Some(elapsed) = self.status.since_last_feed(now) {
            if elapsed < self.timing.min_interval {
                debug!(?elapsed, "feed request dropped: cooldown active");
                return Err(FeedError::Busy);
            }
        }
        self.status.feeding.store(true, Ordering::Release);
        info!("dispensing reward");

        drive.standby.set(false);
        drive.motor.set(true);
        while !self.switch.is_active() {
            thread::sleep(self.timing.engage_poll);
        }
        while self.switch.is_active() {
            thread::sleep(self.timing.release_poll);
        }
        drive.motor.set(false);
        drive.standby.set(false);

        self.status.mark_end(Instant::now());
        self.status.feeding.store(false, Ordering::Release);
        Ok(())
    }
}
