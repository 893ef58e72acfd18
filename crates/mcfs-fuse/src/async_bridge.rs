//! Blocking entry point from kernel callbacks into the catalog runtime.
//!
//! fuser calls us on its own worker thread and expects a synchronous reply,
//! while node operations are async because they may query the catalog. A
//! [`Bridge`] spawns the operation on the mount's tokio runtime and blocks
//! the callback thread until it finishes or the I/O timeout passes. On
//! timeout the task is aborted, which drops the in-flight HTTP request.
//!
//! The runtime must be multi-threaded: the callback thread only waits, the
//! runtime's own workers drive the query.

use crate::error::FuseResult;
use crate::stats::MountStats;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{error, warn};

/// Why a bridged operation produced no answer.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("{op} on {path} gave no answer within {limit:?}")]
    Timeout {
        op: &'static str,
        path: String,
        limit: Duration,
    },

    #[error("{op} on {path} was dropped before completing")]
    Dropped { op: &'static str, path: String },
}

/// Runs node operations for kernel callbacks, bounded by one timeout.
pub struct Bridge<'a> {
    handle: &'a Handle,
    limit: Duration,
    stats: &'a MountStats,
}

impl<'a> Bridge<'a> {
    pub fn new(handle: &'a Handle, limit: Duration, stats: &'a MountStats) -> Self {
        Self { handle, limit, stats }
    }

    /// Runs `operation` to completion and returns its result.
    ///
    /// `op` and `path` only label logs and errors. Must not be called from a
    /// thread that is itself driving the runtime.
    pub fn run<T, F>(&self, op: &'static str, path: &str, operation: F) -> FuseResult<T>
    where
        F: Future<Output = FuseResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let task = self.handle.spawn(operation);
        let abort = task.abort_handle();

        match self.handle.block_on(tokio::time::timeout(self.limit, task)) {
            Ok(Ok(answer)) => answer,
            Ok(Err(join_error)) => {
                error!(op, path, error = %join_error, "catalog task ended abnormally");
                Err(BridgeError::Dropped {
                    op,
                    path: path.to_string(),
                }
                .into())
            }
            Err(_elapsed) => {
                abort.abort();
                self.stats.record_timeout();
                warn!(op, path, limit_ms = self.limit.as_millis(), "catalog did not answer in time");
                Err(BridgeError::Timeout {
                    op,
                    path: path.to_string(),
                    limit: self.limit,
                }
                .into())
            }
        }
    }
}
