//! Configuration management for the cloud streamer

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`StreamerConfig::public_base_url`]
pub const ENV_PUBLIC_URL: &str = "CLOUD_STREAMER_PUBLIC_URL";

/// Environment variable overriding the auth token (and enabling auth)
pub const ENV_AUTH_TOKEN: &str = "CLOUD_STREAMER_AUTH_TOKEN";

/// Configuration for the streamer service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamerConfig {
    /// Address the HTTP server binds to (default: 0.0.0.0:3000)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Externally visible base URL used when handing out relay links
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Endpoint of the resolution (lookup) service
    #[serde(default = "default_lookup_endpoint")]
    pub lookup_endpoint: String,

    /// Content-Type sent with every media response (default: video/mp4)
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Timeout for one lookup call, in seconds (default: 10)
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,

    /// Connect timeout towards the origin, in seconds (default: 10)
    #[serde(default = "default_upstream_connect_timeout")]
    pub upstream_connect_timeout_secs: u64,

    /// Idle read timeout towards the origin, in seconds (default: 60)
    #[serde(default = "default_upstream_read_timeout")]
    pub upstream_read_timeout_secs: u64,

    /// Number of chunks buffered between origin and client (default: 16)
    #[serde(default = "default_relay_buffer_chunks")]
    pub relay_buffer_chunks: usize,

    /// Grace period for in-flight sessions on shutdown, in seconds (default: 5)
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// Log level: trace, debug, info, warn or error (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to serve `/metrics` (default: true)
    #[serde(default = "default_true")]
    pub metrics_endpoint: bool,

    /// Token authentication for stream creation and purge (optional)
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

/// Configuration for token authentication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Whether to require the token (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Prefix expected before the token in `Authorization` (default: "Bearer ")
    #[serde(default = "default_token_prefix")]
    pub token_prefix: String,

    /// The shared secret
    #[serde(default)]
    pub token: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token_prefix: default_token_prefix(),
            token: String::new(),
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_lookup_endpoint() -> String {
    "https://ckdatabasews.icloud.com/database/1/com.apple.cloudkit/production/public/records/resolve"
        .to_string()
}

fn default_content_type() -> String {
    "video/mp4".to_string()
}

fn default_resolve_timeout() -> u64 {
    10
}

fn default_upstream_connect_timeout() -> u64 {
    10
}

fn default_upstream_read_timeout() -> u64 {
    60
}

fn default_relay_buffer_chunks() -> usize {
    16
}

fn default_drain_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_token_prefix() -> String {
    "Bearer ".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StreamerConfig {
    fn default() -> Self {
        StreamerConfig {
            listen_address: default_listen_address(),
            public_base_url: default_public_base_url(),
            lookup_endpoint: default_lookup_endpoint(),
            content_type: default_content_type(),
            resolve_timeout_secs: default_resolve_timeout(),
            upstream_connect_timeout_secs: default_upstream_connect_timeout(),
            upstream_read_timeout_secs: default_upstream_read_timeout(),
            relay_buffer_chunks: default_relay_buffer_chunks(),
            drain_timeout_secs: default_drain_timeout(),
            log_level: default_log_level(),
            metrics_endpoint: default_true(),
            auth: None,
        }
    }
}

impl StreamerConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(StreamerConfig)` if loading and validation succeed
    /// * `Err(StreamError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            StreamError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: StreamerConfig = serde_yaml::from_str(&content).map_err(|e| {
            StreamError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Setting the auth token through the environment also enables auth.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_PUBLIC_URL).ok(),
            std::env::var(ENV_AUTH_TOKEN).ok(),
        );
    }

    fn apply_overrides(&mut self, public_url: Option<String>, auth_token: Option<String>) {
        if let Some(url) = public_url.filter(|v| !v.is_empty()) {
            self.public_base_url = url;
        }
        if let Some(token) = auth_token.filter(|v| !v.is_empty()) {
            let auth = self.auth.get_or_insert_with(AuthConfig::default);
            auth.enabled = true;
            auth.token = token;
        }
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen_address must parse as a socket address
    /// - public_base_url and lookup_endpoint must be http(s) URLs
    /// - content_type must be a valid header value
    /// - all timeouts and relay_buffer_chunks must be > 0
    /// - log_level must be a known level
    /// - an enabled auth section must carry a token
    pub fn validate(&self) -> Result<()> {
        self.listen_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                StreamError::ConfigError(format!(
                    "listen_address '{}' is not a socket address: {}",
                    self.listen_address, e
                ))
            })?;

        for (name, value) in [
            ("public_base_url", &self.public_base_url),
            ("lookup_endpoint", &self.lookup_endpoint),
        ] {
            if !crate::models::is_valid_http_url(value) {
                return Err(StreamError::ConfigError(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, value
                )));
            }
        }

        if http::HeaderValue::from_str(&self.content_type).is_err() || self.content_type.is_empty()
        {
            return Err(StreamError::ConfigError(format!(
                "content_type '{}' is not a valid header value",
                self.content_type
            )));
        }

        for (name, value) in [
            ("resolve_timeout_secs", self.resolve_timeout_secs),
            ("upstream_connect_timeout_secs", self.upstream_connect_timeout_secs),
            ("upstream_read_timeout_secs", self.upstream_read_timeout_secs),
        ] {
            if value == 0 {
                return Err(StreamError::ConfigError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.relay_buffer_chunks == 0 {
            return Err(StreamError::ConfigError(
                "relay_buffer_chunks must be greater than 0".to_string(),
            ));
        }

        self.tracing_level()?;

        if let Some(auth) = &self.auth {
            if auth.enabled && auth.token.is_empty() {
                return Err(StreamError::ConfigError(
                    "auth.token must be set when auth is enabled".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// The configured log level as a tracing level
    pub fn tracing_level(&self) -> Result<tracing::Level> {
        self.log_level.parse::<tracing::Level>().map_err(|_| {
            StreamError::ConfigError(format!("Invalid log_level '{}'", self.log_level))
        })
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_secs)
    }

    pub fn upstream_read_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_read_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// The auth section, only when it is enabled
    pub fn active_auth(&self) -> Option<&AuthConfig> {
        self.auth.as_ref().filter(|auth| auth.enabled)
    }
}
