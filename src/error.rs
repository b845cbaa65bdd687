//! Error types for the cloud streamer

use thiserror::Error;

/// Result type alias for streamer operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Failures reported by a [`Resolver`](crate::resolver::Resolver)
///
/// The relay never looks inside the lookup service's payload, so this is the
/// whole vocabulary it has for "resolution did not work".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("lookup service error: {0}")]
    Upstream(String),

    #[error("malformed lookup response: {0}")]
    Malformed(String),
}

/// Error types that can occur while creating or relaying a stream
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("URL is not valid: {0}")]
    InvalidIndirectUrl(String),

    #[error("Unknown stream: {0}")]
    UnknownStreamKey(String),

    #[error("Malformed Range header: {0}")]
    MalformedRange(String),

    #[error("Range not satisfiable for object of {total_length} bytes")]
    UnsatisfiableRange { total_length: u64 },

    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error("Upstream transport error: {0}")]
    UpstreamTransport(String),

    #[error("Direct URL expired")]
    LinkExpired,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::IoError(err.to_string())
    }
}

impl StreamError {
    /// Convert error to HTTP status code
    ///
    /// Only meaningful before response headers are written; once a body is
    /// in flight the connection is aborted instead.
    pub fn to_http_status(&self) -> u16 {
        match self {
            StreamError::InvalidIndirectUrl(_) => 400,
            StreamError::UnknownStreamKey(_) => 400,
            StreamError::MalformedRange(_) => 400,
            StreamError::Unauthorized => 401,
            StreamError::UnsatisfiableRange { .. } => 416,

            // An expiry that survives the refresh is reported as a resolution failure
            StreamError::Resolution(_) => 500,
            StreamError::LinkExpired => 500,

            StreamError::UpstreamTransport(_) => 502,

            StreamError::ConfigError(_) => 500,
            StreamError::IoError(_) => 500,
            StreamError::InternalError(_) => 500,
        }
    }

    /// Whether this error is the upstream's "direct URL expired" signal
    pub fn is_link_expired(&self) -> bool {
        matches!(self, StreamError::LinkExpired)
    }

    /// Whether the error was caused by the client's request
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.to_http_status())
    }
}
