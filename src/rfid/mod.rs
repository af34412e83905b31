//! RFID subsystem: frame parsing, the scanner seam, and identity
//! resolution with reliability hysteresis.

mod reader;
mod resolver;
mod tag;

pub use reader::{HandshakeConfig, ScannerPort, SerialTagSource, TagSource, EXIT_DUAL_READER, WAKE_COMMAND};
pub use resolver::{IdentityResolver, Presence, ResolverConfig};
pub use tag::{RfidTag, TagParseError};
