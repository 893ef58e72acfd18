//! Per-directory listing cache.
//!
//! Each directory path maps to an immutable [`CacheEntry`] behind an `Arc`.
//! A refresh fetches the complete listing first and then swaps the `Arc` in a
//! single map insert, so concurrent readers see either the old listing or the
//! new one, never a mix. Different paths refresh independently; two refreshes
//! of the same path may both reach the catalog and the last one to publish
//! wins.
//!
//! Invalidations carry a generation number. A refresh that started before
//! the most recent invalidation of its path publishes its result still marked
//! stale, so an invalidation issued mid-fetch is never lost.

use crate::stats::MountStats;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mcfs_api::{ApiResult, RemoteCatalog, RemoteEntry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// One directory's children as last fetched from the catalog.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Children in catalog order.
    pub children: Arc<[RemoteEntry]>,
    pub fetched_at: Instant,
    /// Forces a refetch regardless of age.
    pub stale: bool,
    /// Generation of the invalidation that set `stale`.
    invalidated_at: u64,
}

impl CacheEntry {
    pub fn new(children: Vec<RemoteEntry>, fetched_at: Instant) -> Self {
        Self {
            children: children.into(),
            fetched_at,
            stale: false,
            invalidated_at: 0,
        }
    }

    /// Fresh means not marked stale and fetched no more than `timeout` before
    /// `now`.
    pub fn is_fresh(&self, now: Instant, timeout: Duration) -> bool {
        !self.stale && now.saturating_duration_since(self.fetched_at) <= timeout
    }

    /// First child sitting at `candidate`, byte-exact.
    pub fn find(&self, candidate: &str) -> Option<&RemoteEntry> {
        self.children.iter().find(|e| e.matches_path(candidate))
    }
}

/// Concurrent map from directory path to its cached listing.
pub struct DirectoryCache {
    entries: DashMap<String, Arc<CacheEntry>>,
    timeout: Duration,
    stats: Arc<MountStats>,
    generation: AtomicU64,
}

impl DirectoryCache {
    pub fn new(timeout: Duration, stats: Arc<MountStats>) -> Self {
        Self {
            entries: DashMap::new(),
            timeout,
            stats,
            generation: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The current entry for `path`, fresh or not.
    pub fn get(&self, path: &str) -> Option<Arc<CacheEntry>> {
        self.entries.get(path).map(|e| Arc::clone(e.value()))
    }

    /// The entry for `path` if it is fresh at `now`.
    pub fn fresh(&self, path: &str, now: Instant) -> Option<Arc<CacheEntry>> {
        self.get(path).filter(|e| e.is_fresh(now, self.timeout))
    }

    /// Children of the directory at `path`.
    ///
    /// Served from memory when fresh. Otherwise the catalog is queried and
    /// the result published with `fetched_at = now`. A failed query is
    /// returned as-is and leaves any existing entry untouched. If the path
    /// was invalidated while the query was in flight, the published entry
    /// stays stale.
    pub async fn listing(
        &self,
        catalog: &dyn RemoteCatalog,
        path: &str,
        now: Instant,
    ) -> ApiResult<Arc<[RemoteEntry]>> {
        // The map guard is released before the await below.
        if let Some(entry) = self.fresh(path, now) {
            self.stats.record_cache_hit();
            trace!(path, "listing cache hit");
            return Ok(Arc::clone(&entry.children));
        }

        self.stats.record_cache_miss();
        self.stats.record_list_call();
        debug!(path, "listing cache miss, querying catalog");
        let started = self.generation.load(Ordering::SeqCst);
        let children = catalog.list_directory(path).await?;

        let mut fetched = CacheEntry::new(children, now);
        let result = Arc::clone(&fetched.children);
        match self.entries.entry(path.to_string()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                if current.stale && current.invalidated_at > started {
                    debug!(path, "invalidated during fetch, publishing as stale");
                    fetched.stale = true;
                    fetched.invalidated_at = current.invalidated_at;
                }
                slot.insert(Arc::new(fetched));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(fetched));
            }
        }
        debug!(path, count = result.len(), "listing published");
        Ok(result)
    }

    /// Flags the listing at `path` for refetch on next use.
    ///
    /// Returns false if nothing is cached for `path`.
    pub fn mark_stale(&self, path: &str) -> bool {
        match self.entries.get_mut(path) {
            Some(mut slot) => {
                let mut updated = CacheEntry::clone(slot.value());
                updated.stale = true;
                updated.invalidated_at = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                *slot.value_mut() = Arc::new(updated);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
