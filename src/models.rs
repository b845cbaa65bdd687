//! Core data models for the cloud streamer

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Stable identifier of a shared object, taken from its indirect URL
///
/// Used both as the resolution cache key and as the lookup key sent to the
/// resolution service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create an ObjectKey from an already extracted identifier
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() || key.contains('/') {
            return Err(StreamError::UnknownStreamKey(format!(
                "invalid object key: {:?}",
                key
            )));
        }
        Ok(ObjectKey(key))
    }

    /// Derive the key from an indirect URL
    ///
    /// The key is everything after the last `/`, minus any trailing
    /// `#fragment`.
    pub fn from_indirect_url(url: &str) -> Result<Self> {
        let last = url.rsplit('/').next().unwrap_or_default();
        let key = last.split('#').next().unwrap_or_default();
        if key.is_empty() {
            return Err(StreamError::InvalidIndirectUrl(url.to_string()));
        }
        Ok(ObjectKey(key.to_string()))
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A resolved, directly fetchable location of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// Short-lived signed URL served by the origin
    pub direct_url: String,
    /// Total object size in bytes, authoritative for range math
    pub total_length: u64,
    /// When the resolution service produced this location
    pub resolved_at: SystemTime,
}

impl ResolvedLocation {
    /// Create a location stamped with the current time
    pub fn new(direct_url: impl Into<String>, total_length: u64) -> Self {
        ResolvedLocation {
            direct_url: direct_url.into(),
            total_length,
            resolved_at: SystemTime::now(),
        }
    }

    /// Time elapsed since resolution
    pub fn age(&self) -> Duration {
        self.resolved_at.elapsed().unwrap_or_default()
    }
}

/// Represents an inclusive byte window of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if the range is valid
    /// * `Err(StreamError)` if start > end
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(StreamError::MalformedRange(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Get the size of this byte range in bytes
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Format the `Content-Range` value for an object of `total_length` bytes
    pub fn content_range(&self, total_length: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_length)
    }
}

/// Outcome of parsing a client's Range header against a known size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No Range header: serve the entire object
    Full,
    /// A single satisfiable window
    Partial(ByteRange),
}

impl RangeRequest {
    /// Number of body bytes the client will receive
    pub fn body_length(&self, total_length: u64) -> u64 {
        match self {
            RangeRequest::Full => total_length,
            RangeRequest::Partial(range) => range.size(),
        }
    }

    /// Offset of the first body byte within the object
    pub fn start(&self) -> u64 {
        match self {
            RangeRequest::Full => 0,
            RangeRequest::Partial(range) => range.start,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, RangeRequest::Partial(_))
    }
}

/// Whether `candidate` parses as an absolute `http` or `https` URL
pub fn is_valid_http_url(candidate: &str) -> bool {
    match url::Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Build a human readable file name from an object title and extension
///
/// Whitespace in the title becomes `_`.
pub fn friendly_file_name(title: &str, extension: &str) -> String {
    let title: String = title
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let extension = extension.trim().trim_start_matches('.');
    if extension.is_empty() {
        title
    } else {
        format!("{}.{}", title, extension)
    }
}

/// File name used when the lookup service has no title for the object
///
/// Uses the `#fragment` of the indirect URL when present, `movie` otherwise.
pub fn fallback_file_name(indirect_url: &str) -> String {
    let fragment = indirect_url
        .split_once('#')
        .map(|(_, fragment)| fragment.trim())
        .filter(|fragment| !fragment.is_empty() && !fragment.contains('/'));
    friendly_file_name(fragment.unwrap_or("movie"), "mp4")
}
