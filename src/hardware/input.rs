//! Button press arbitration.
//!
//! The button edge callback is the only code that runs outside the main
//! cooperative loop. It communicates through a single-slot signal: at
//! most one pending press, written with an atomic check-and-set and
//! consumed by the polling loop. The callback never blocks and never
//! takes a lock.
//!
//! An edge is dropped, not queued, when the arbiter is not listening,
//! when a feed cycle is running, or when the press lands inside the
//! cooldown right after one — a press against a still-turning dispenser
//! is the animal chasing the reward, not an answer.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::FeedStatus;
use crate::config::TimingConfig;
use crate::Side;

const PENDING_NONE: u8 = 0;
const PENDING_LEFT: u8 = 1;
const PENDING_RIGHT: u8 = 2;

/// Edge confirmation tuning.
#[derive(Debug, Clone)]
pub struct DebounceConfig {
    /// Level re-checks confirming an edge is a press, not a release
    pub rechecks: u32,
    /// Interval between re-checks
    pub recheck_interval: Duration,
    /// Minimum interval after a feed during which edges are dropped
    pub min_feed_interval: Duration,
}

impl From<&TimingConfig> for DebounceConfig {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            rechecks: timing.press_rechecks,
            recheck_interval: Duration::from_millis(timing.press_recheck_ms),
            min_feed_interval: Duration::from_millis(timing.min_feed_interval_ms),
        }
    }
}

/// Single-producer/single-consumer press signal.
///
/// The producer is the asynchronous edge callback ([`InputArbiter::on_edge`]);
/// the consumer is the main loop ([`InputArbiter::poll`]).
pub struct InputArbiter {
    listening: AtomicBool,
    pending: AtomicU8,
    feed: Arc<FeedStatus>,
    debounce: DebounceConfig,
}

impl InputArbiter {
    /// A disarmed arbiter observing the given feed status.
    #[must_use]
    pub fn new(feed: Arc<FeedStatus>, debounce: DebounceConfig) -> Self {
        Self {
            listening: AtomicBool::new(false),
            pending: AtomicU8::new(PENDING_NONE),
            feed,
            debounce,
        }
    }

    /// Clear any stale press and start listening for edges.
    pub fn arm(&self) {
        self.pending.store(PENDING_NONE, Ordering::Release);
        self.listening.store(true, Ordering::Release);
    }

    /// Stop listening for edges.
    pub fn disarm(&self) {
        self.listening.store(false, Ordering::Release);
    }

    /// Take the pending press, if one was latched.
    pub fn poll(&self) -> Option<Side> {
        match self.pending.swap(PENDING_NONE, Ordering::AcqRel) {
            PENDING_LEFT => Some(Side::Left),
            PENDING_RIGHT => Some(Side::Right),
            _ => None,
        }
    }

    /// Handle a falling edge on one button line (callback context).
    ///
    /// `level` re-reads the line and must return `true` while the button
    /// is still held; it is sampled `rechecks` times to reject transient
    /// glitches and release edges.
    ///
    /// Safe to call concurrently with the polling loop; the only shared
    /// writes are atomic.
    pub fn on_edge<F: Fn() -> bool>(&self, side: Side, level: F, now: Instant) {
        if !self.listening.load(Ordering::Acquire) {
            trace!(%side, "edge ignored: not listening");
            return;
        }
        if self.feed.is_feeding() {
            debug!(%side, "edge ignored: feed cycle in progress");
            return;
        }
        if let Some(elapsed) = self.feed.since_last_feed(now) {
            if elapsed < self.debounce.min_feed_interval {
                debug!(%side, ?elapsed, "edge ignored: too soon after feed");
                return;
            }
        }
        for _ in 0..self.debounce.rechecks {
            thread::sleep(self.debounce.recheck_interval);
            if !level() {
                debug!(%side, "edge rejected: level not held");
                return;
            }
        }
        // Latch the press and stop listening in one step so a racing
        // edge on the other line cannot latch a second press.
        if self
            .listening
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let value = match side {
                Side::Left => PENDING_LEFT,
                Side::Right => PENDING_RIGHT,
            };
            self.pending.store(value, Ordering::Release);
            debug!(%side, "press latched");
        }
    }
}
