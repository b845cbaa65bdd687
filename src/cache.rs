//! Resolution cache
//!
//! Memoizes [`Resolver`] results per [`ObjectKey`] for the lifetime of the
//! process. Reads never block on resolution. Writes for one key are
//! serialized through a per-key async lock, so concurrent refreshes of the
//! same key cannot interleave while different keys resolve in parallel.

use crate::error::{Result, StreamError};
use crate::models::{ObjectKey, ResolvedLocation};
use crate::resolver::Resolver;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub resolutions: u64,
    pub failures: u64,
    pub invalidations: u64,
}

/// Process-lifetime map from object key to resolved location
pub struct ResolutionCache {
    resolver: Arc<dyn Resolver>,
    entries: RwLock<HashMap<ObjectKey, ResolvedLocation>>,
    key_locks: Mutex<HashMap<ObjectKey, Arc<AsyncMutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    resolutions: AtomicU64,
    failures: AtomicU64,
    invalidations: AtomicU64,
}

impl ResolutionCache {
    /// Create an empty cache in front of `resolver`
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        ResolutionCache {
            resolver,
            entries: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            resolutions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Look up a stored location without any I/O
    pub fn get(&self, key: &ObjectKey) -> Option<ResolvedLocation> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Return the cached location, resolving it when absent or when forced
    ///
    /// On resolver failure the stored entry (if any) is left untouched.
    pub async fn resolve(&self, key: &ObjectKey, force_refresh: bool) -> Result<ResolvedLocation> {
        if !force_refresh {
            if let Some(location) = self.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Resolution cache HIT: key={} (age={:?})",
                    key,
                    location.age()
                );
                return Ok(location);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Resolution cache MISS: key={}", key);
        } else {
            debug!("Forced refresh: key={}", key);
        }

        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.resolve_locked(key, force_refresh).await
        };
        self.release_key_lock(key, lock);
        result
    }

    /// Resolution body, run while holding the per-key lock
    async fn resolve_locked(&self, key: &ObjectKey, force_refresh: bool) -> Result<ResolvedLocation> {
        // Another task may have filled the entry while we waited
        if !force_refresh {
            if let Some(location) = self.get(key) {
                debug!("Entry for key={} filled by a concurrent resolution", key);
                return Ok(location);
            }
        }

        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let resolution = match self.resolver.resolve(key).await {
            Ok(resolution) => resolution,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Resolution failed for key={}: {}", key, e);
                return Err(StreamError::Resolution(e));
            }
        };

        let location = ResolvedLocation::new(resolution.direct_url, resolution.total_length);
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), location.clone());

        if let Some(previous) = previous {
            if previous.total_length != location.total_length {
                warn!(
                    "total_length for key={} changed on re-resolution: {} -> {}",
                    key, previous.total_length, location.total_length
                );
            }
        }

        info!(
            "Cached resolution for key={} (total_length={})",
            key, location.total_length
        );
        Ok(location)
    }

    /// Remove the entry for `key`, returning whether one existed
    pub fn invalidate(&self, key: &ObjectKey) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();

        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!("Invalidated cache entry for key={}", key);
        } else {
            debug!("Nothing to invalidate for key={}", key);
        }
        removed
    }

    /// Remove every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        self.invalidations
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Drop all state at shutdown
    pub fn close(&self) -> usize {
        let count = self.clear();
        self.key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("Resolution cache closed ({} entries dropped)", count);
        count
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    fn key_lock(&self, key: &ObjectKey) -> Arc<AsyncMutex<()>> {
        self.key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Forget the lock for `key` once no other task holds or waits on it
    fn release_key_lock(&self, key: &ObjectKey, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }
}
