//! Parsing of client `Range` headers against a known object size
//!
//! Supported forms (single range only):
//!
//! - `bytes=<start>-<end>`: explicit inclusive window
//! - `bytes=<start>-`: from `start` to the end of the object
//! - `bytes=-<n>`: the trailing `n` bytes of the object
//!
//! A window touching bytes at or beyond the object size is unsatisfiable and
//! reported as [`StreamError::UnsatisfiableRange`] so the caller can answer 416.

use crate::error::{Result, StreamError};
use crate::models::{ByteRange, RangeRequest};
use tracing::debug;

const BYTES_UNIT: &str = "bytes=";

/// Parse an optional Range header value for an object of `total_length` bytes
///
/// # Returns
/// * `Ok(RangeRequest::Full)` when no header is present
/// * `Ok(RangeRequest::Partial(range))` for a satisfiable window
/// * `Err(StreamError::MalformedRange)` for syntactically invalid headers
/// * `Err(StreamError::UnsatisfiableRange)` when the window falls outside the object
pub fn parse_range(header: Option<&str>, total_length: u64) -> Result<RangeRequest> {
    let Some(header) = header else {
        return Ok(RangeRequest::Full);
    };

    let header = header.trim();
    let range_set = header
        .strip_prefix(BYTES_UNIT)
        .ok_or_else(|| malformed(header, "unit must be 'bytes='"))?;

    if range_set.contains(',') {
        return Err(malformed(header, "multiple ranges are not supported"));
    }

    let (start, end) = range_set
        .split_once('-')
        .ok_or_else(|| malformed(header, "expected '<start>-<end>'"))?;
    let (start, end) = (start.trim(), end.trim());

    let range = match (start.is_empty(), end.is_empty()) {
        (true, true) => return Err(malformed(header, "start and end are both missing")),

        // Suffix form: the last `n` bytes
        (true, false) => {
            let suffix = parse_position(header, end)?;
            if suffix == 0 || total_length == 0 {
                return Err(StreamError::UnsatisfiableRange { total_length });
            }
            let start = total_length.saturating_sub(suffix);
            ByteRange::new(start, total_length - 1)?
        }

        // Open-ended form: stream to EOF
        (false, true) => {
            let start = parse_position(header, start)?;
            if start >= total_length {
                return Err(StreamError::UnsatisfiableRange { total_length });
            }
            ByteRange::new(start, total_length - 1)?
        }

        (false, false) => {
            let start = parse_position(header, start)?;
            let end = parse_position(header, end)?;
            if start > end {
                return Err(malformed(header, "start is after end"));
            }
            if start >= total_length || end >= total_length {
                return Err(StreamError::UnsatisfiableRange { total_length });
            }
            ByteRange::new(start, end)?
        }
    };

    debug!(
        "Parsed Range header '{}' against total_length={}: {}-{}",
        header, total_length, range.start, range.end
    );
    Ok(RangeRequest::Partial(range))
}

fn parse_position(header: &str, value: &str) -> Result<u64> {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(header, "positions must be decimal integers"));
    }
    // Only digits remain, so parsing can fail solely on overflow. A position
    // that large lies past any object and is left to the bounds checks.
    Ok(value.parse::<u64>().unwrap_or(u64::MAX))
}

fn malformed(header: &str, reason: &str) -> StreamError {
    StreamError::MalformedRange(format!("{} ({})", header, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(start: u64, end: u64) -> RangeRequest {
        RangeRequest::Partial(ByteRange::new(start, end).unwrap())
    }

    #[test]
    fn test_absent_header_is_full_object() {
        assert_eq!(parse_range(None, 1000).unwrap(), RangeRequest::Full);
    }

    #[test]
    fn test_explicit_range() {
        assert_eq!(parse_range(Some("bytes=0-99"), 1000).unwrap(), partial(0, 99));
        assert_eq!(parse_range(Some("bytes=999-999"), 1000).unwrap(), partial(999, 999));
    }

    #[test]
    fn test_open_ended_range() {
        assert_eq!(parse_range(Some("bytes=100-"), 1000).unwrap(), partial(100, 999));
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(parse_range(Some("bytes=-100"), 1000).unwrap(), partial(900, 999));
    }

    #[test]
    fn test_suffix_longer_than_object_covers_whole_object() {
        assert_eq!(parse_range(Some("bytes=-5000"), 1000).unwrap(), partial(0, 999));
        assert_eq!(
            parse_range(Some("bytes=-99999999999999999999999"), 1000).unwrap(),
            partial(0, 999)
        );
    }

    #[test]
    fn test_whitespace_is_tolerated() {
        assert_eq!(parse_range(Some("  bytes= 5 - 9 "), 1000).unwrap(), partial(5, 9));
    }

    #[test]
    fn test_out_of_bounds_is_unsatisfiable() {
        for header in [
            "bytes=1000-1001",
            "bytes=0-1000",
            "bytes=1000-",
            "bytes=-0",
            "bytes=0-99999999999999999999999",
            "bytes=99999999999999999999999-",
        ] {
            match parse_range(Some(header), 1000) {
                Err(StreamError::UnsatisfiableRange { total_length }) => {
                    assert_eq!(total_length, 1000)
                }
                other => panic!("{} should be unsatisfiable, got {:?}", header, other),
            }
        }
    }

    #[test]
    fn test_empty_object_has_no_satisfiable_range() {
        assert!(matches!(
            parse_range(Some("bytes=0-"), 0),
            Err(StreamError::UnsatisfiableRange { total_length: 0 })
        ));
        assert!(matches!(
            parse_range(Some("bytes=-1"), 0),
            Err(StreamError::UnsatisfiableRange { total_length: 0 })
        ));
    }

    #[test]
    fn test_malformed_headers() {
        for header in [
            "bytes=-",
            "bytes=abc-10",
            "bytes=10-xyz",
            "bytes=+1-5",
            "items=0-10",
            "bytes=0-10,20-30",
            "bytes=10",
            "bytes=50-10",
            "",
        ] {
            assert!(
                matches!(parse_range(Some(header), 1000), Err(StreamError::MalformedRange(_))),
                "{:?} should be malformed",
                header
            );
        }
    }
}
