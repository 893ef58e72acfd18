//! Error handling and mapping for the FUSE filesystem.
//!
//! The kernel only ever sees three outcomes from a metadata callback: the
//! entry does not exist (`ENOENT`), the request does not fit the node
//! (`ENOTDIR`, `EISDIR`), or the catalog could not answer (`EIO`).
//! Authentication failures collapse into `EIO` here; they are only told
//! apart in logs. Names no catalog entry can carry (`.`, `..`, non-UTF-8)
//! are simply not found.

use crate::async_bridge::BridgeError;
use mcfs_api::{ApiError, ErrorCategory};
use thiserror::Error;
use tracing::warn;

/// FUSE-specific errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FuseError {
    /// Catalog query failed.
    #[error("Catalog query failed: {0}")]
    Api(#[from] ApiError),

    /// IO error (runtime startup).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The catalog gave no answer in time, or the task running it died.
    #[error("{0}")]
    Bridge(#[from] BridgeError),

    /// No entry at the given path.
    #[error("No such entry: {0}")]
    NotFound(String),

    /// A directory operation was attempted on a file.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A file operation was attempted on a directory.
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// The kernel referenced an inode we do not know.
    #[error("Invalid inode: {0}")]
    InvalidInode(u64),

    /// Name was not valid UTF-8, was `.`/`..`, or contained a separator.
    #[error("Invalid file name")]
    InvalidName,
}

impl FuseError {
    /// Converts this error to a libc error code for FUSE.
    pub fn to_errno(&self) -> i32 {
        match self {
            FuseError::Api(e) => e.to_errno(),
            FuseError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            FuseError::Bridge(_) => libc::EIO,
            FuseError::NotFound(_) | FuseError::InvalidInode(_) | FuseError::InvalidName => libc::ENOENT,
            FuseError::NotADirectory(_) => libc::ENOTDIR,
            FuseError::IsADirectory(_) => libc::EISDIR,
        }
    }

    /// Returns true for "no such entry", as opposed to a failed query.
    pub fn is_not_found(&self) -> bool {
        self.to_errno() == libc::ENOENT
    }
}

/// Result type for FUSE operations.
pub type FuseResult<T> = Result<T, FuseError>;

/// Extension trait to convert errors to errno.
pub trait ToErrno {
    /// Converts this error to a libc error code.
    fn to_errno(&self) -> i32;
}

impl ToErrno for ApiError {
    fn to_errno(&self) -> i32 {
        match self.category() {
            ErrorCategory::NotFound => libc::ENOENT,
            ErrorCategory::AuthenticationFailed | ErrorCategory::BackendUnavailable => libc::EIO,
        }
    }
}

/// Logs a catalog failure, keeping authentication problems distinguishable.
pub(crate) fn log_api_failure(op: &'static str, path: &str, e: &ApiError) {
    match e.category() {
        ErrorCategory::NotFound => {}
        ErrorCategory::AuthenticationFailed => {
            warn!(op, path, "catalog rejected credentials");
        }
        ErrorCategory::BackendUnavailable => {
            warn!(op, path, error = %e, "catalog query failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_api_error_mapping() {
        assert_eq!(
            FuseError::from(ApiError::NotFound { path: "/x".to_string() }).to_errno(),
            libc::ENOENT
        );
        assert_eq!(FuseError::from(ApiError::AuthenticationFailed).to_errno(), libc::EIO);
        assert_eq!(FuseError::from(ApiError::Status { status: 500 }).to_errno(), libc::EIO);
    }

    #[test]
    fn test_auth_and_backend_failures_look_the_same() {
        assert_eq!(
            ApiError::AuthenticationFailed.to_errno(),
            ApiError::Status { status: 502 }.to_errno()
        );
    }

    #[test]
    fn test_local_error_mapping() {
        assert_eq!(FuseError::NotFound("/a".to_string()).to_errno(), libc::ENOENT);
        assert_eq!(FuseError::InvalidInode(99).to_errno(), libc::ENOENT);
        assert_eq!(FuseError::NotADirectory("/a".to_string()).to_errno(), libc::ENOTDIR);
        assert_eq!(FuseError::IsADirectory("/d".to_string()).to_errno(), libc::EISDIR);
        assert_eq!(FuseError::InvalidName.to_errno(), libc::ENOENT);
        let timeout = BridgeError::Timeout {
            op: "lookup",
            path: "/a".to_string(),
            limit: Duration::from_secs(1),
        };
        assert_eq!(FuseError::Bridge(timeout).to_errno(), libc::EIO);
        let dropped = BridgeError::Dropped {
            op: "readdir",
            path: "/".to_string(),
        };
        assert_eq!(FuseError::Bridge(dropped).to_errno(), libc::EIO);
    }

    #[test]
    fn test_is_not_found() {
        assert!(FuseError::NotFound("/a".to_string()).is_not_found());
        assert!(FuseError::from(ApiError::NotFound { path: "/a".to_string() }).is_not_found());
        assert!(!FuseError::from(ApiError::AuthenticationFailed).is_not_found());
    }
}
