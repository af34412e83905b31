//! # Puzzlebox: Unattended Behavioral-Experiment Controller
//!
//! Puzzlebox drives an RFID-instrumented puzzle-box enclosure: it identifies
//! the animal present, lights LED cue patterns, arbitrates a two-button
//! response, dispenses a food reward through a motor-driven mechanism, and
//! advances a trial → block → test experiment with escalating timeouts on
//! repeated failure.
//!
//! ## Architecture
//!
//! ```text
//! TagSource ──> IdentityResolver ─┐
//! Buttons ────> InputArbiter ─────┼──> TrialEngine ──> FeederController
//!                                 │        │
//! Config/TestDefinition ──────────┘        └──> ResultsLog (CSV)
//! ```
//!
//! The engine runs a single-threaded cooperative loop; the only concurrent
//! context is the button edge callback, which communicates through a
//! single-slot atomic press signal ([`hardware::InputArbiter`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use puzzlebox::config::Config;
//!
//! // Load the configuration, or write a template and stop for review.
//! let config = Config::load_or_template("puzzlebox.toml")?;
//! let tests = config.test_definitions()?;
//! println!("{} tests configured", tests.len());
//! # Ok::<(), puzzlebox::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod results;
pub mod rfid;
pub mod select;
pub mod subject;

pub use engine::TrialEngine;
pub use error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Which button a subject pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Left button
    Left,
    /// Right button
    Right,
}

impl Side {
    /// The mirror side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Human-readable label used in result records.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
