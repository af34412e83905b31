//! Tag frame parsing.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Timestamp format used inside scanner frames.
pub const FRAME_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S%.f";

/// Why a scanner frame was rejected.
///
/// A rejected frame is discarded with a warning and never constructed;
/// the resolver keeps its prior identity state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagParseError {
    /// The frame does not have the expected number of fields
    #[error("frame does not have the expected number of fields")]
    FieldCount,
    /// The timestamp field is malformed
    #[error("incorrect format for timestamp")]
    Timestamp,
}

/// One parsed tag-read frame.
///
/// Frames are whitespace-delimited:
/// `record-type reader-id date time tag-number`. The scanner clock is not
/// synchronized with the controller, so consumers should treat the
/// arrival time as authoritative and the frame timestamp as advisory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfidTag {
    /// Record type reported by the scanner
    pub record_type: String,
    /// Which reader antenna saw the tag
    pub reader_id: String,
    /// Timestamp printed by the scanner (unsynchronized clock)
    pub timestamp: NaiveDateTime,
    /// The tag number identifying the subject
    pub tag_number: String,
}

impl RfidTag {
    /// Parse one frame line.
    ///
    /// # Errors
    ///
    /// Returns a [`TagParseError`] when the frame has fewer than five
    /// fields or a malformed timestamp.
    pub fn parse(frame: &str) -> Result<Self, TagParseError> {
        let fields: Vec<&str> = frame.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(TagParseError::FieldCount);
        }
        let stamp = format!("{} {}", fields[2], fields[3]);
        let timestamp = NaiveDateTime::parse_from_str(&stamp, FRAME_TIME_FORMAT)
            .map_err(|_| TagParseError::Timestamp)?;
        Ok(Self {
            record_type: fields[0].to_string(),
            reader_id: fields[1].to_string(),
            timestamp,
            tag_number: fields[4].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame() {
        let tag = RfidTag::parse("TAG 01 05/12/2019 13:45:02.123 982000123456789").unwrap();
        assert_eq!(tag.record_type, "TAG");
        assert_eq!(tag.reader_id, "01");
        assert_eq!(tag.tag_number, "982000123456789");
        assert_eq!(tag.timestamp.format("%H:%M:%S").to_string(), "13:45:02");
    }

    #[test]
    fn test_parse_rejects_short_frame() {
        assert_eq!(
            RfidTag::parse("TAG 01 05/12/2019"),
            Err(TagParseError::FieldCount)
        );
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        assert_eq!(
            RfidTag::parse("TAG 01 2019-05-12 13:45:02 982000123456789"),
            Err(TagParseError::Timestamp)
        );
    }

    #[test]
    fn test_parse_tolerates_trailing_whitespace() {
        let tag = RfidTag::parse("TAG 01 05/12/2019 13:45:02.1 982000123456789\r\n").unwrap();
        assert_eq!(tag.tag_number, "982000123456789");
    }
}
