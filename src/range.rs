//! Parsing of the HTTP `Range` request header.
//!
//! Only a single `bytes` range is supported. Anything else is reported
//! as unsupported, so the caller can fall back to sending the full entity.
use std::fmt;

use regex::Regex;

lazy_static! {
    static ref SINGLE_RANGE: Regex = Regex::new(r"^(\d*)-(\d*)$").unwrap();
}

/// Why a `Range` header was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// A unit other than `bytes`, or more than one range.
    Unsupported,
    /// Syntax error, or an impossible range like `3-2`.
    Malformed,
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::Unsupported => write!(f, "unsupported range"),
            RangeError::Malformed => write!(f, "malformed range"),
        }
    }
}

impl std::error::Error for RangeError {}

/// A single byte range. At least one of the bounds is present.
///
/// `first` only means "from `first` to the end", `last` only
/// means "the final `last` bytes".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    first: Option<u64>,
    last: Option<u64>,
}

impl ByteRange {
    /// Parse the value of a `Range` header.
    pub fn parse(header: &str) -> Result<ByteRange, RangeError> {
        let (unit, ranges) = header.split_once('=').ok_or(RangeError::Unsupported)?;
        if !unit.trim().eq_ignore_ascii_case("bytes") || ranges.contains(',') {
            return Err(RangeError::Unsupported);
        }
        let caps = SINGLE_RANGE.captures(ranges.trim()).ok_or(RangeError::Malformed)?;
        let bound = |idx: usize| -> Result<Option<u64>, RangeError> {
            match caps.get(idx).map(|m| m.as_str()) {
                None | Some("") => Ok(None),
                Some(n) => n.parse().map(Some).map_err(|_| RangeError::Malformed),
            }
        };
        let first = bound(1)?;
        let last = bound(2)?;
        match (first, last) {
            (None, None) => Err(RangeError::Malformed),
            (Some(f), Some(l)) if f > l => Err(RangeError::Malformed),
            _ => Ok(ByteRange { first, last }),
        }
    }

    /// Offset of the first byte to send, for an entity of `len` bytes.
    pub fn effective_first_byte(&self, len: u64) -> u64 {
        match (self.first, self.last) {
            (Some(first), _) => first,
            (None, Some(suffix)) => len.saturating_sub(suffix),
            (None, None) => 0,
        }
    }

    /// Offset of the last byte to send (inclusive), for an entity of `len` bytes.
    pub fn effective_last_byte(&self, len: u64) -> u64 {
        let end = len.saturating_sub(1);
        match (self.first, self.last) {
            (Some(_), Some(last)) => last.min(end),
            _ => end,
        }
    }

    /// Whether any byte of an entity of `len` bytes is covered.
    pub fn is_satisfiable(&self, len: u64) -> bool {
        self.effective_first_byte(len) < len
    }
}
