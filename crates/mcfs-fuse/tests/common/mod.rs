//! In-memory catalog for node, cache and filesystem tests.
//!
//! `FakeCatalog::fixture()` serves this tree:
//!
//! ```text
//! /
//! ├── data/
//! │   ├── raw/
//! │   │   ├── run1.csv   (10 bytes)
//! │   │   └── run2.csv   (20 bytes)
//! │   └── sample.txt     (1024 bytes)
//! └── readme.md          (12 bytes)
//! ```
//!
//! Every query is counted, and failures or latency can be injected per
//! query kind.

// Not all tests use all helpers
#![allow(dead_code)]

use async_trait::async_trait;
use mcfs_api::{ApiError, ApiResult, RemoteCatalog, RemoteEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Every path in the fixture tree except the root.
pub const FIXTURE_PATHS: &[&str] = &[
    "/data",
    "/data/raw",
    "/data/raw/run1.csv",
    "/data/raw/run2.csv",
    "/data/sample.txt",
    "/readme.md",
];

/// Which failure an injected error simulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// HTTP 401.
    Auth,
    /// HTTP 500.
    Backend,
}

impl Failure {
    fn to_error(self) -> ApiError {
        match self {
            Failure::Auth => ApiError::AuthenticationFailed,
            Failure::Backend => ApiError::Status { status: 500 },
        }
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    listings: Mutex<HashMap<String, Vec<RemoteEntry>>>,
    entries: Mutex<HashMap<String, RemoteEntry>>,
    list_calls: AtomicUsize,
    point_calls: AtomicUsize,
    list_failure: Mutex<Option<Failure>>,
    point_failure: Mutex<Option<Failure>>,
    delay: Mutex<Option<Duration>>,
    next_id: AtomicUsize,
}

impl FakeCatalog {
    /// A catalog holding only an empty root.
    pub fn empty() -> Self {
        let fake = Self::default();
        fake.put_entry(RemoteEntry::new_directory(fake.id(), "/"));
        fake.listings.lock().unwrap().insert("/".to_string(), Vec::new());
        fake
    }

    /// The tree described in the module docs.
    pub fn fixture() -> Self {
        let fake = Self::empty();
        fake.add_dir("/", "data");
        fake.add_file("/", "readme.md", 12);
        fake.add_file("/data", "sample.txt", 1024);
        fake.add_dir("/data", "raw");
        fake.add_file("/data/raw", "run1.csv", 10);
        fake.add_file("/data/raw", "run2.csv", 20);
        fake
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn put_entry(&self, entry: RemoteEntry) {
        self.entries.lock().unwrap().insert(entry.full_path(), entry);
    }

    fn push_child(&self, parent: &str, entry: RemoteEntry) {
        self.listings
            .lock()
            .unwrap()
            .entry(parent.to_string())
            .or_default()
            .push(entry.clone());
        self.put_entry(entry);
    }

    /// Places `entry` in `parent`'s listing and answers point queries for
    /// `parent/<entry.name>` with it, whatever path the entry reports.
    pub fn add_entry(&self, parent: &str, entry: RemoteEntry) {
        self.listings
            .lock()
            .unwrap()
            .entry(parent.to_string())
            .or_default()
            .push(entry.clone());
        self.entries.lock().unwrap().insert(join(parent, &entry.name), entry);
    }

    /// Adds a directory `name` under `parent` and returns its entry.
    pub fn add_dir(&self, parent: &str, name: &str) -> RemoteEntry {
        let path = join(parent, name);
        let entry = RemoteEntry::new_directory(self.id(), &path);
        self.listings.lock().unwrap().entry(path).or_default();
        self.push_child(parent, entry.clone());
        entry
    }

    /// Adds a file `name` of `size` bytes under `parent` and returns its entry.
    pub fn add_file(&self, parent: &str, name: &str, size: u64) -> RemoteEntry {
        let entry = RemoteEntry::new_file(self.id(), name, parent, size).with_mime_type("text/plain");
        self.push_child(parent, entry.clone());
        entry
    }

    /// Removes `name` from `parent`'s listing and from point queries.
    pub fn remove(&self, parent: &str, name: &str) {
        let mut listings = self.listings.lock().unwrap();
        if let Some(children) = listings.get_mut(parent) {
            children.retain(|e| e.name != name);
        }
        self.entries.lock().unwrap().remove(&join(parent, name));
    }

    /// The entry a point query for `path` would return.
    pub fn entry(&self, path: &str) -> RemoteEntry {
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| panic!("fixture has no entry at {path}"))
    }

    pub fn fail_listings(&self, failure: Failure) {
        *self.list_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_point_queries(&self, failure: Failure) {
        *self.point_failure.lock().unwrap() = Some(failure);
    }

    pub fn clear_failures(&self) {
        *self.list_failure.lock().unwrap() = None;
        *self.point_failure.lock().unwrap() = None;
    }

    /// Delays every query by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn point_calls(&self) -> usize {
        self.point_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.list_calls.store(0, Ordering::SeqCst);
        self.point_calls.store(0, Ordering::SeqCst);
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// A directory named `name` whose `path` came back null.
pub fn pathless_directory(name: &str) -> RemoteEntry {
    let mut entry = RemoteEntry::new_directory(900, "");
    entry.name = name.to_string();
    entry
}

#[async_trait]
impl RemoteCatalog for FakeCatalog {
    async fn list_directory(&self, path: &str) -> ApiResult<Vec<RemoteEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        let failure = *self.list_failure.lock().unwrap();
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }
        self.listings
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ApiError::NotFound { path: path.to_string() })
    }

    async fn entry_by_path(&self, path: &str) -> ApiResult<RemoteEntry> {
        self.point_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        let failure = *self.point_failure.lock().unwrap();
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ApiError::NotFound { path: path.to_string() })
    }
}
