//! Scanner seam: the frame source trait and the serial implementation.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::tag::RfidTag;
use crate::error::{Error, Result};

/// Command that switches the scanner into streaming output.
pub const WAKE_COMMAND: &[u8] = b"CTL1\r";

/// Escape sequence that exits the scanner's dual-reader collection mode,
/// in which it ignores the wake command.
pub const EXIT_DUAL_READER: &[u8] = &[0x11, 0x15, 0x09, 0x14];

/// A stream of timestamped tag-read frames.
///
/// `poll_frame` never blocks on frame availability: it returns `None`
/// when the scanner has nothing new. Malformed frames are discarded with
/// a warning and also surface as `None`.
pub trait TagSource: Send {
    /// The most recent unread frame, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures, never for malformed
    /// frames.
    fn poll_frame(&mut self) -> Result<Option<RfidTag>>;
}

/// Wire-level access to the scanner's serial port.
pub trait ScannerPort: Send {
    /// Bytes waiting in the receive buffer.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read one line from the scanner.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    fn read_line(&mut self) -> io::Result<String>;

    /// Write raw bytes to the scanner.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Handshake retry budget and waits.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// How long to wait for a response to the wake command
    pub wake_wait: Duration,
    /// How long to wait for a response to the escape sequence
    pub escape_wait: Duration,
    /// Poll interval while waiting
    pub poll: Duration,
    /// Wake attempts before giving up
    pub max_attempts: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            wake_wait: Duration::from_secs(5),
            escape_wait: Duration::from_secs(10),
            poll: Duration::from_secs(1),
            max_attempts: 3,
        }
    }
}

/// Frame source backed by a serial scanner.
#[derive(Debug)]
pub struct SerialTagSource<P: ScannerPort> {
    port: P,
}

impl<P: ScannerPort> SerialTagSource<P> {
    /// Connect with the default handshake budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScannerHandshake`] when the scanner stays silent
    /// through the retry budget, or [`Error::Io`] on transport failure.
    pub fn connect(port: P) -> Result<Self> {
        Self::connect_with(port, &HandshakeConfig::default())
    }

    /// Connect, performing the startup handshake.
    ///
    /// The scanner is asked to stream its output to us. A scanner left in
    /// dual-reader collection mode ignores the wake command; the escape
    /// sequence knocks it out of that mode before the wake is retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScannerHandshake`] when the scanner stays silent
    /// through the retry budget, or [`Error::Io`] on transport failure.
    pub fn connect_with(mut port: P, config: &HandshakeConfig) -> Result<Self> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            debug!(attempts, "sending scanner wake command");
            port.write_all(WAKE_COMMAND)?;
            if wait_for_data(&mut port, config.wake_wait, config.poll)? {
                break;
            }
            warn!("scanner silent after wake command, sending dual-reader escape");
            port.write_all(EXIT_DUAL_READER)?;
            if !wait_for_data(&mut port, config.escape_wait, config.poll)? {
                return Err(Error::ScannerHandshake { attempts });
            }
            let response = port.read_line()?;
            debug!(response = response.trim(), "scanner escape response");
            if attempts >= config.max_attempts {
                return Err(Error::ScannerHandshake { attempts });
            }
        }
        let banner = port.read_line()?;
        info!(banner = banner.trim(), "scanner connected");
        Ok(Self { port })
    }
}

fn wait_for_data<P: ScannerPort>(port: &mut P, budget: Duration, poll: Duration) -> Result<bool> {
    let deadline = Instant::now() + budget;
    loop {
        if port.bytes_available()? > 0 {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(poll.min(deadline.saturating_duration_since(Instant::now())));
    }
}

impl<P: ScannerPort> TagSource for SerialTagSource<P> {
    fn poll_frame(&mut self) -> Result<Option<RfidTag>> {
        if self.port.bytes_available()? == 0 {
            return Ok(None);
        }
        let line = self.port.read_line()?;
        match RfidTag::parse(&line) {
            Ok(tag) => Ok(Some(tag)),
            Err(err) => {
                warn!(%err, line = line.trim(), "discarding unparseable scanner output");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted port: responses become available after a given number of
    /// `bytes_available` polls.
    #[derive(Debug)]
    struct ScriptedPort {
        lines: VecDeque<String>,
        silent_polls: u32,
        writes: Vec<Vec<u8>>,
    }

    impl ScriptedPort {
        fn new(lines: &[&str], silent_polls: u32) -> Self {
            Self {
                lines: lines.iter().map(|l| (*l).to_string()).collect(),
                silent_polls,
                writes: Vec::new(),
            }
        }
    }

    impl ScannerPort for ScriptedPort {
        fn bytes_available(&mut self) -> io::Result<usize> {
            if self.silent_polls > 0 {
                self.silent_polls -= 1;
                return Ok(0);
            }
            Ok(self.lines.front().map_or(0, String::len))
        }

        fn read_line(&mut self) -> io::Result<String> {
            Ok(self.lines.pop_front().unwrap_or_default())
        }

        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            self.writes.push(data.to_vec());
            Ok(())
        }
    }

    fn fast_handshake() -> HandshakeConfig {
        HandshakeConfig {
            wake_wait: Duration::from_millis(2),
            escape_wait: Duration::from_millis(2),
            poll: Duration::from_millis(1),
            max_attempts: 3,
        }
    }

    #[test]
    fn test_handshake_immediate_response() {
        let port = ScriptedPort::new(&["OK"], 0);
        let source = SerialTagSource::connect_with(port, &fast_handshake()).unwrap();
        assert_eq!(source.port.writes, vec![WAKE_COMMAND.to_vec()]);
    }

    #[test]
    fn test_handshake_gives_up_on_silence() {
        let port = ScriptedPort::new(&[], u32::MAX);
        let err = SerialTagSource::connect_with(port, &fast_handshake()).unwrap_err();
        assert!(matches!(err, Error::ScannerHandshake { .. }));
    }

    #[test]
    fn test_poll_frame_parses_and_discards() {
        let port = ScriptedPort::new(
            &[
                "OK",
                "TAG 01 05/12/2019 13:45:02.1 982000123456789",
                "LOGGER: noise line",
            ],
            0,
        );
        let mut source = SerialTagSource::connect_with(port, &fast_handshake()).unwrap();

        let tag = source.poll_frame().unwrap().unwrap();
        assert_eq!(tag.tag_number, "982000123456789");

        // Malformed output is discarded, not an error.
        assert!(source.poll_frame().unwrap().is_none());

        // Nothing waiting.
        assert!(source.poll_frame().unwrap().is_none());
    }
}
