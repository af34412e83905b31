//! Error types for puzzlebox
//!
//! Recoverable conditions (malformed tag frames, feeder contention) are
//! handled where they occur and never surface here. This enum covers the
//! fatal taxonomy: configuration defects, scanner handshake exhaustion,
//! and illegal answer resolution.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Puzzlebox error types
#[derive(Error, Debug)]
pub enum Error {
    /// No configuration store was present; a template was generated.
    /// The process must stop so the operator can review it before restart.
    #[error("configuration file not found: {path}\nA template has been written there. Review it and restart.")]
    TemplateCreated {
        /// Path of the freshly written template
        path: PathBuf,
    },

    /// Configuration file could not be parsed as TOML
    #[error("configuration syntax error: {0}")]
    ConfigSyntax(#[from] toml::de::Error),

    /// Configuration parsed but is not usable
    #[error("configuration defect: {0}")]
    Config(String),

    /// A trial template could not be parsed (expected "ANSWER-CUE", e.g. "L-B")
    #[error("test '{test}': bad trial template '{template}'")]
    BadTrialTemplate {
        /// Test whose trial list contains the template
        test: String,
        /// The offending template string
        template: String,
    },

    /// Answer resolution produced a value outside {L, R, E, I}.
    /// This signals a configuration-authoring defect; the engine stops
    /// rather than guess.
    #[error("test '{test}': answer resolved outside the legal set (preference unset?)")]
    IllegalAnswer {
        /// Test whose trial produced the illegal resolution
        test: String,
    },

    /// The tag scanner never responded to the startup handshake
    #[error("tag scanner did not respond after {attempts} attempts")]
    ScannerHandshake {
        /// Wake/escape attempts made before giving up
        attempts: u32,
    },

    /// Record store could not be decoded
    #[error("record store error: {0}")]
    Store(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
