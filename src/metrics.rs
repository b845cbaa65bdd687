//! Metrics collection for the stream relay
//!
//! Thread-safe counters using atomic operations. Cache counters live on the
//! [`ResolutionCache`](crate::cache::ResolutionCache) itself.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for the stream relay
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Request statistics
    total_requests: AtomicU64,
    full_requests: AtomicU64,
    partial_requests: AtomicU64,
    unsatisfiable_requests: AtomicU64,
    rejected_requests: AtomicU64,

    // Refresh statistics
    link_refreshes: AtomicU64,
    refreshes_exhausted: AtomicU64,

    // Session outcomes
    completed_sessions: AtomicU64,
    client_disconnects: AtomicU64,
    failed_sessions: AtomicU64,

    bytes_to_client: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub full_requests: u64,
    pub partial_requests: u64,
    pub unsatisfiable_requests: u64,
    pub rejected_requests: u64,
    pub link_refreshes: u64,
    pub refreshes_exhausted: u64,
    pub completed_sessions: u64,
    pub client_disconnects: u64,
    pub failed_sessions: u64,
    pub bytes_to_client: u64,
}

impl RelayMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted stream request
    ///
    /// # Arguments
    /// * `partial` - Whether the client asked for a byte range
    pub fn record_request(&self, partial: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if partial {
            self.partial_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.full_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a request answered with 416
    pub fn record_unsatisfiable(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.unsatisfiable_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request rejected before streaming started
    pub fn record_rejected(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refresh of an expired direct URL
    pub fn record_link_refresh(&self) {
        self.link_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a second expiry within one session
    pub fn record_refresh_exhausted(&self) {
        self.refreshes_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_client_disconnect(&self) {
        self.client_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes handed to the client connection
    pub fn record_bytes_to_client(&self, bytes: u64) {
        self.bytes_to_client.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    ///
    /// Fields are loaded independently, so the snapshot may not be perfectly
    /// consistent under concurrent updates.
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            full_requests: self.full_requests.load(Ordering::Relaxed),
            partial_requests: self.partial_requests.load(Ordering::Relaxed),
            unsatisfiable_requests: self.unsatisfiable_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            link_refreshes: self.link_refreshes.load(Ordering::Relaxed),
            refreshes_exhausted: self.refreshes_exhausted.load(Ordering::Relaxed),
            completed_sessions: self.completed_sessions.load(Ordering::Relaxed),
            client_disconnects: self.client_disconnects.load(Ordering::Relaxed),
            failed_sessions: self.failed_sessions.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Sessions that ended, whatever the reason
    pub fn finished_sessions(&self) -> u64 {
        self.completed_sessions + self.client_disconnects + self.failed_sessions
    }
}
