//! Fixed-length ring of recent trial outcomes.

use serde::{Deserialize, Serialize};

/// Record of the most recent trials' pass/fail outcomes.
///
/// The window length always equals the configured block length; slots are
/// addressed by raw trial count, wrapped internally. In consecutive-block
/// mode the window sum is the rolling success criterion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlidingWindow {
    slots: Vec<u8>,
}

impl SlidingWindow {
    /// A zeroed window of `len` slots.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { slots: vec![0; len] }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the window has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record the outcome of the trial with the given raw count.
    ///
    /// No-op on an empty window (a record not yet sized for a session).
    pub fn mark(&mut self, trial_count: usize, success: bool) {
        let len = self.slots.len();
        if len > 0 {
            self.slots[trial_count % len] = u8::from(success);
        }
    }

    /// Successful trials currently in the window.
    #[must_use]
    pub fn sum(&self) -> u32 {
        self.slots.iter().map(|&s| u32::from(s)).sum()
    }

    /// Zero every slot, resizing to `len` if the block length changed.
    pub fn reset(&mut self, len: usize) {
        self.slots.clear();
        self.slots.resize(len, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_wraps_by_trial_count() {
        let mut w = SlidingWindow::new(4);
        w.mark(0, true);
        w.mark(5, true); // slot 1
        w.mark(4, false); // overwrites slot 0
        assert_eq!(w.sum(), 1);
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn test_reset_resizes() {
        let mut w = SlidingWindow::new(4);
        w.mark(0, true);
        w.reset(6);
        assert_eq!(w.len(), 6);
        assert_eq!(w.sum(), 0);
    }

    #[test]
    fn test_mark_on_empty_window_is_noop() {
        let mut w = SlidingWindow::default();
        w.mark(3, true);
        assert_eq!(w.sum(), 0);
    }
}
