//! The left/right indicator LED pair.

use std::fmt;

use super::DigitalOutput;
use crate::config::CuePattern;

/// Tracks and drives the two indicator LEDs.
pub struct Indicators {
    left: Box<dyn DigitalOutput>,
    right: Box<dyn DigitalOutput>,
    left_on: bool,
    right_on: bool,
}

impl Indicators {
    /// Wrap the two LED output lines. Both start off.
    pub fn new(mut left: Box<dyn DigitalOutput>, mut right: Box<dyn DigitalOutput>) -> Self {
        left.set(false);
        right.set(false);
        Self { left, right, left_on: false, right_on: false }
    }

    /// Light the LEDs for a cue pattern.
    pub fn set_pattern(&mut self, pattern: CuePattern) {
        let (left, right) = match pattern {
            CuePattern::Left => (true, false),
            CuePattern::Right => (false, true),
            CuePattern::Both => (true, true),
            CuePattern::Neither => (false, false),
        };
        self.set(left, right);
    }

    /// Turn both LEDs on.
    pub fn both_on(&mut self) {
        self.set(true, true);
    }

    /// Turn both LEDs off.
    pub fn both_off(&mut self) {
        self.set(false, false);
    }

    fn set(&mut self, left: bool, right: bool) {
        self.left.set(left);
        self.right.set(right);
        self.left_on = left;
        self.right_on = right;
    }

    /// Status string used in result records.
    #[must_use]
    pub fn status(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Indicators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |on: bool| if on { "On" } else { "Off" };
        write!(f, "Left: {} Right: {}", state(self.left_on), state(self.right_on))
    }
}
