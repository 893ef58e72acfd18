//! Error types for catalog requests.

use thiserror::Error;

/// Errors returned by catalog queries.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service rejected the bearer token (HTTP 401).
    #[error("Authentication rejected by catalog service")]
    AuthenticationFailed,

    /// No remote entry exists at the requested path (HTTP 404).
    #[error("No remote entry at {path}")]
    NotFound { path: String },

    /// Any other non-success HTTP status.
    #[error("Catalog service returned HTTP {status}")]
    Status { status: u16 },

    /// Connection, TLS or timeout failure.
    #[error("Catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the expected JSON shape.
    #[error("Malformed catalog response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured base URL could not be parsed.
    #[error("Invalid catalog URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type for catalog queries.
pub type ApiResult<T> = Result<T, ApiError>;

/// Coarse classification of [`ApiError`].
///
/// Mount backends only distinguish "the entry does not exist" from "the
/// catalog could not answer"; authentication failures are kept apart so they
/// can be logged differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    AuthenticationFailed,
    BackendUnavailable,
}

impl ErrorCategory {
    pub fn name(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::BackendUnavailable => "BackendUnavailable",
        }
    }
}

impl ApiError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::NotFound { .. } => ErrorCategory::NotFound,
            ApiError::AuthenticationFailed => ErrorCategory::AuthenticationFailed,
            ApiError::Status { .. }
            | ApiError::Transport(_)
            | ApiError::Decode(_)
            | ApiError::InvalidUrl(_) => ErrorCategory::BackendUnavailable,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}

impl From<&ApiError> for ErrorCategory {
    fn from(e: &ApiError) -> Self {
        e.category()
    }
}
