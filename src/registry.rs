//! Registry of handed-out relay links
//!
//! `POST /api/stream` records which indirect URL a `/stream/:key/:fileName`
//! path stands for, so later GETs can be validated and resolved.

use crate::error::{Result, StreamError};
use crate::models::ObjectKey;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use url::Url;

/// Maps `key/fileName` (as it appears in the relay path) to an indirect URL
#[derive(Debug)]
pub struct StreamRegistry {
    base_url: Url,
    links: RwLock<HashMap<String, String>>,
}

impl StreamRegistry {
    /// Create a registry producing links under `public_base_url`
    pub fn new(public_base_url: &str) -> Result<Self> {
        let base_url = Url::parse(public_base_url).map_err(|e| {
            StreamError::ConfigError(format!(
                "Invalid public base URL '{}': {}",
                public_base_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StreamError::ConfigError(format!(
                "public base URL '{}' cannot carry a path",
                public_base_url
            )));
        }
        Ok(StreamRegistry {
            base_url,
            links: RwLock::new(HashMap::new()),
        })
    }

    /// Record a link and return the public relay URL
    ///
    /// The file name is percent-encoded into a single path segment.
    pub fn register(&self, key: &ObjectKey, file_name: &str, indirect_url: &str) -> Result<String> {
        let mut link = self.base_url.clone();
        link.set_query(None);
        link.set_fragment(None);
        {
            let mut segments = link.path_segments_mut().map_err(|_| {
                StreamError::InternalError("public base URL cannot carry a path".to_string())
            })?;
            segments.pop_if_empty().push("stream").push(key.as_str()).push(file_name);
        }

        let encoded_name = link
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or(file_name)
            .to_string();

        self.links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(registry_key(key.as_str(), &encoded_name), indirect_url.to_string());

        debug!("Registered stream link {} -> {}", link, indirect_url);
        Ok(link.to_string())
    }

    /// Find the indirect URL for a relay path
    pub fn lookup(&self, key: &str, file_name: &str) -> Result<String> {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&registry_key(key, file_name))
            .cloned()
            .ok_or_else(|| StreamError::UnknownStreamKey(format!("{}/{}", key, file_name)))
    }

    pub fn len(&self) -> usize {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn registry_key(key: &str, file_name: &str) -> String {
    format!("{}/{}", key, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = StreamRegistry::new("http://127.0.0.1:3000").unwrap();
        let key = ObjectKey::new("0a1b2c").unwrap();

        let link = registry
            .register(&key, "Holiday.mp4", "https://www.icloud.com/iclouddrive/0a1b2c")
            .unwrap();
        assert_eq!(link, "http://127.0.0.1:3000/stream/0a1b2c/Holiday.mp4");
        assert_eq!(
            registry.lookup("0a1b2c", "Holiday.mp4").unwrap(),
            "https://www.icloud.com/iclouddrive/0a1b2c"
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_file_name_is_percent_encoded() {
        let registry = StreamRegistry::new("https://media.example.com/tv/").unwrap();
        let key = ObjectKey::new("k1").unwrap();

        let link = registry.register(&key, "Über Film?.mp4", "https://x/k1").unwrap();
        assert!(link.starts_with("https://media.example.com/tv/stream/k1/"));
        assert!(!link.contains(' '));
        assert!(!link.contains('?'));

        let encoded = link.rsplit('/').next().unwrap();
        assert_eq!(registry.lookup("k1", encoded).unwrap(), "https://x/k1");
    }

    #[test]
    fn test_unknown_pair() {
        let registry = StreamRegistry::new("http://localhost").unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.lookup("k", "x.mp4"),
            Err(StreamError::UnknownStreamKey(_))
        ));
    }

    #[test]
    fn test_rejects_unusable_base() {
        assert!(StreamRegistry::new("mailto:someone@example.com").is_err());
        assert!(StreamRegistry::new("not a url").is_err());
    }
}
