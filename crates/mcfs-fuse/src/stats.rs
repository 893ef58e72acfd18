//! Activity counters for a mounted project.
//!
//! All counters are lock-free atomics so they can be bumped from any kernel
//! worker thread without coordination.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for filesystem and catalog activity.
#[derive(Debug, Default)]
pub struct MountStats {
    metadata_ops: AtomicU64,
    errors: AtomicU64,
    list_calls: AtomicU64,
    point_queries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    timeouts: AtomicU64,
}

/// Point-in-time copy of [`MountStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub metadata_ops: u64,
    pub errors: u64,
    pub list_calls: u64,
    pub point_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub timeouts: u64,
}

impl MountStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a kernel metadata callback (lookup, getattr, readdir).
    #[inline]
    pub fn record_metadata_op(&self) {
        self.metadata_ops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a callback that replied with an error.
    #[inline]
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a `list_directory` request to the catalog.
    #[inline]
    pub fn record_list_call(&self) {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an `entry_by_path` request to the catalog.
    #[inline]
    pub fn record_point_query(&self) {
        self.point_queries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a callback abandoned after the I/O timeout.
    #[inline]
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            metadata_ops: self.metadata_ops.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            list_calls: self.list_calls.load(Ordering::Relaxed),
            point_queries: self.point_queries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Directory cache hit rate in `0.0..=1.0`; 0.0 before any lookup.
    #[allow(clippy::cast_precision_loss)]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Total requests sent to the catalog.
    pub fn backend_calls(&self) -> u64 {
        self.list_calls + self.point_queries
    }
}
