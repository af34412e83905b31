//! Hardware seams: digital line traits, the feeder, the press arbiter,
//! and the indicator pair.
//!
//! The engine never touches pins directly; the embedding binary supplies
//! implementations of these traits wired to the actual GPIO driver (or to
//! simulations under test).

mod feeder;
mod indicators;
mod input;

pub use feeder::{FeedError, FeedStatus, FeederController, FeederTiming};
pub use indicators::Indicators;
pub use input::{DebounceConfig, InputArbiter};

/// An output line (motor drive, indicator LED).
pub trait DigitalOutput: Send {
    /// Drive the line active (`true`) or inactive (`false`).
    fn set(&mut self, active: bool);
}

/// An input line (button, confirmation switch).
///
/// `is_active` reports the logical state: for an active-low button this
/// is true while the button is held down.
pub trait DigitalInput: Send + Sync {
    /// Whether the line is currently asserted.
    fn is_active(&self) -> bool;
}

/// Momentary presentation cues.
///
/// Playing a cue is fire-and-forget; the engine never waits on the
/// presentation side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Played after an incorrect response
    Failure,
    /// Played when a failure-escalation timeout ends
    TimeoutExceeded,
}

/// Audio/visual presentation collaborator.
pub trait CueSink: Send {
    /// Play a momentary cue.
    fn play(&mut self, cue: Cue);

    /// Show the neutral background frame.
    fn neutral_frame(&mut self) {}
}

/// The output and input lines the engine drives, as wired by the
/// embedding binary.
pub struct HardwareSet {
    /// Dispenser motor, driven direction
    pub motor_drive: Box<dyn DigitalOutput>,
    /// Dispenser motor, opposite direction (held inactive)
    pub motor_standby: Box<dyn DigitalOutput>,
    /// Mechanical confirmation switch on the dispenser
    pub feeder_switch: Box<dyn DigitalInput>,
    /// Left indicator LED
    pub led_left: Box<dyn DigitalOutput>,
    /// Right indicator LED
    pub led_right: Box<dyn DigitalOutput>,
}
