// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by the indexer, the store and the search router.
//!
//! Each variant is one error *kind*. Callers at the boundary map kinds to
//! wire codes and status codes through [`ErrorKind`] instead of matching on
//! message text.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, CodevecError>;

/// Errors produced by codevec.
#[derive(Debug, Error)]
pub enum CodevecError {
    /// Bad input shape or out-of-range value. Caller error, not retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The embedding provider cannot be reached at all.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A single provider call failed while the provider itself is reachable.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// The store rejected a vector of the wrong size.
    #[error("embedding dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A similarity query could not resolve its reference unit.
    #[error("reference code not found: {0}")]
    ReferenceNotFound(String),

    /// A rate governor denied the request.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Persistence layer failure.
    #[error("store error: {0}")]
    Store(String),

    /// Unknown search dispatch value.
    #[error("invalid search type '{0}', expected semantic, exact or similarity")]
    InvalidSearchType(String),

    /// The caller-supplied deadline elapsed.
    #[error("operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Error kinds, with stable wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    ProviderUnavailable,
    Provider,
    DimensionMismatch,
    ReferenceNotFound,
    RateLimited,
    Store,
    InvalidSearchType,
    Timeout,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorKind::Provider => "PROVIDER_ERROR",
            ErrorKind::DimensionMismatch => "DIMENSION_MISMATCH",
            ErrorKind::ReferenceNotFound => "REFERENCE_NOT_FOUND",
            ErrorKind::RateLimited => "RATE_LIMIT_EXCEEDED",
            ErrorKind::Store => "STORE_ERROR",
            ErrorKind::InvalidSearchType => "INVALID_SEARCH_TYPE",
            ErrorKind::Timeout => "TIMEOUT",
        }
    }

    /// HTTP-equivalent status for the excluded transport layer.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::InvalidSearchType => 400,
            ErrorKind::ReferenceNotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::DimensionMismatch | ErrorKind::Store => 500,
            ErrorKind::Provider => 502,
            ErrorKind::ProviderUnavailable => 503,
            ErrorKind::Timeout => 504,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl CodevecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodevecError::Validation(_) => ErrorKind::Validation,
            CodevecError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            CodevecError::Provider(_) => ErrorKind::Provider,
            CodevecError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            CodevecError::ReferenceNotFound(_) => ErrorKind::ReferenceNotFound,
            CodevecError::RateLimited { .. } => ErrorKind::RateLimited,
            CodevecError::Store(_) => ErrorKind::Store,
            CodevecError::InvalidSearchType(_) => ErrorKind::InvalidSearchType,
            CodevecError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Seconds to wait before retrying, for rate-limit denials.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            CodevecError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        CodevecError::Validation(msg.into())
    }
}

impl From<rusqlite::Error> for CodevecError {
    fn from(err: rusqlite::Error) -> Self {
        CodevecError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for CodevecError {
    fn from(err: serde_json::Error) -> Self {
        CodevecError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        let err = CodevecError::RateLimited {
            retry_after_secs: 12,
        };
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.kind().code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(err.kind().status_code(), 429);
        assert_eq!(err.retry_after_secs(), Some(12));
    }

    #[test]
    fn test_reference_not_found_is_404() {
        let err = CodevecError::ReferenceNotFound("r1:missing.go".into());
        assert_eq!(err.kind().status_code(), 404);
        assert!(err.retry_after_secs().is_none());
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = CodevecError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert_eq!(
            err.to_string(),
            "embedding dimension mismatch: store expects 384, got 768"
        );
    }
}
