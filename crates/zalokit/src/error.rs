//! Error types for the SDK
//!
//! Provides the typed error taxonomy used across the crate plus a
//! serializable [`ErrorDescriptor`] snapshot for per-recipient batch
//! outcomes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the SDK
///
/// Exactly one automatic retry exists anywhere in the pipeline: an
/// unauthorized response triggers a single token refresh followed by a
/// single retry of the original request. Every other error propagates to
/// the caller, typed by kind, for caller-driven retry policy.
#[derive(Debug, Error)]
pub enum Error {
    /// Required setup value missing (e.g. redirect URI for the
    /// authorization URL). Fatal to the call, not retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Authorization code or refresh token rejected, or a request still
    /// unauthorized after the refresh-and-retry. The caller must
    /// re-authenticate.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Access token is stale and no refresh token is available to recover.
    #[error("Access token has expired and no refresh token is available")]
    TokenExpired,

    /// API rate limit exceeded. Never absorbed by the SDK; the caller is
    /// expected to honour `retry_after` (seconds) before retrying.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        /// Seconds to wait before retrying, when the server said so
        retry_after: Option<u64>,
        /// Raw server message
        message: String,
    },

    /// Malformed request input, rejected before or by the remote endpoint.
    /// Not retried.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Generic non-2xx, platform-envelope, or transport failure. The
    /// caller may retry at their discretion; the SDK never does (sends
    /// are not idempotent in general).
    #[error("API error: {message}")]
    Api {
        /// Raw server message or transport error text
        message: String,
        /// Platform error code from the response envelope, when present
        code: Option<i64>,
        /// HTTP status, when a response was received
        http_status: Option<u16>,
    },

    /// Token persistence failed. Raised even though the in-memory
    /// credential mutation already succeeded, so the caller knows a
    /// process restart will lose the refreshed token.
    #[error("Token storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Get the kind of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Api { .. } => ErrorKind::Api,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Check if a caller-level retry of the failed call can succeed
    /// without re-authenticating or changing the request
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::RateLimit | ErrorKind::Api)
    }

    /// Seconds the server asked the caller to wait, for rate-limit errors
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status attached to this error, when a response was received
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Api { http_status, .. } => *http_status,
            Self::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    /// Build a serializable snapshot of this error
    #[must_use]
    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: self.kind(),
            http_status: self.http_status(),
            retry_after: self.retry_after(),
            message: self.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Api {
            message: format!("HTTP request failed: {err}"),
            code: None,
            http_status: err.status().map(|s| s.as_u16()),
        }
    }
}

/// Error kinds, mirroring the variants of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Required setup value missing
    Configuration,
    /// Credentials rejected; re-authentication required
    Authentication,
    /// Stale token with no refresh token
    TokenExpired,
    /// Rate limit exceeded
    RateLimit,
    /// Malformed request input
    Validation,
    /// Generic API or transport failure
    Api,
    /// Token persistence failure
    Storage,
}

/// Serializable snapshot of an [`Error`]
///
/// Produced once per failed unit of work inside a batch and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Error kind
    pub kind: ErrorKind,
    /// HTTP status, when a response was received
    pub http_status: Option<u16>,
    /// Seconds to wait before retrying, for rate-limit errors
    pub retry_after: Option<u64>,
    /// Human-readable message
    pub message: String,
}

impl From<&Error> for ErrorDescriptor {
    fn from(err: &Error) -> Self {
        err.descriptor()
    }
}
