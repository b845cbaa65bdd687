//! Token authentication for stream creation and cache purge

use crate::config::AuthConfig;
use crate::error::{Result, StreamError};
use http::HeaderMap;
use tracing::warn;

/// Compares the `Authorization` header against `prefix + token`
#[derive(Debug, Clone)]
pub struct TokenAuth {
    expected: String,
}

impl TokenAuth {
    pub fn new(config: &AuthConfig) -> Self {
        TokenAuth {
            expected: format!("{}{}", config.token_prefix, config.token),
        }
    }

    /// Check the request headers
    ///
    /// # Returns
    /// * `Ok(())` if the header matches exactly
    /// * `Err(StreamError::Unauthorized)` if it is missing or different
    pub fn check(&self, headers: &HeaderMap) -> Result<()> {
        let presented = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match presented {
            Some(value) if value == self.expected => Ok(()),
            Some(_) => {
                warn!("Rejected request with invalid authorization token");
                Err(StreamError::Unauthorized)
            }
            None => {
                warn!("Rejected request without authorization header");
                Err(StreamError::Unauthorized)
            }
        }
    }
}
