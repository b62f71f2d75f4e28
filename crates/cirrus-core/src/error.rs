//! Error types for Cirrus.
//!
//! This module provides a unified error type for all Cirrus operations.
//! The variants form a closed taxonomy: callers test the category by
//! matching on the variant, never by inspecting message text. Context
//! added with [`Error::context`] augments the message while keeping the
//! variant, so category checks survive wrapping.

use reqwest::StatusCode;
use thiserror::Error;

/// A specialized `Result` type for Cirrus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Cirrus.
#[derive(Error, Debug)]
pub enum Error {
    /// The stored credential is missing or no longer usable; the user
    /// must log in again.
    #[error("reauthentication required: {0}")]
    ReauthRequired(String),

    /// The server refused the operation for this identity.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The server is throttling or temporarily unavailable.
    #[error("service busy, retry later: {0}")]
    RetryLater(String),

    /// The request was malformed or unsupported.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The remote item does not exist (or is gone).
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The operation conflicts with remote state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage quota or request size limits exceeded.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Device-code login has not been completed by the user yet.
    #[error("authorization pending: {0}")]
    AuthorizationPending(String),

    /// Device-code login was declined by the user.
    #[error("authorization declined: {0}")]
    AuthorizationDeclined(String),

    /// The device code (or another token) has expired.
    #[error("token expired: {0}")]
    TokenExpired(String),

    /// A response body could not be decoded.
    #[error("failed to decode response: {0}")]
    DecodingFailed(String),

    /// The request never produced an HTTP response.
    #[error("network failure: {0}")]
    NetworkFailed(String),

    /// The server reported a failure with no more specific category.
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// Local I/O or invariant failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// A session record is locked by another process.
    #[error("locked: {0}")]
    Locked(String),
}

impl Error {
    /// Prepend operation context to the message, keeping the variant.
    #[must_use]
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        let wrap = |m: String| format!("{ctx}: {m}");
        match self {
            Self::ReauthRequired(m) => Self::ReauthRequired(wrap(m)),
            Self::AccessDenied(m) => Self::AccessDenied(wrap(m)),
            Self::RetryLater(m) => Self::RetryLater(wrap(m)),
            Self::InvalidRequest(m) => Self::InvalidRequest(wrap(m)),
            Self::ResourceNotFound(m) => Self::ResourceNotFound(wrap(m)),
            Self::Conflict(m) => Self::Conflict(wrap(m)),
            Self::QuotaExceeded(m) => Self::QuotaExceeded(wrap(m)),
            Self::AuthorizationPending(m) => Self::AuthorizationPending(wrap(m)),
            Self::AuthorizationDeclined(m) => Self::AuthorizationDeclined(wrap(m)),
            Self::TokenExpired(m) => Self::TokenExpired(wrap(m)),
            Self::DecodingFailed(m) => Self::DecodingFailed(wrap(m)),
            Self::NetworkFailed(m) => Self::NetworkFailed(wrap(m)),
            Self::OperationFailed(m) => Self::OperationFailed(wrap(m)),
            Self::Internal(m) => Self::Internal(wrap(m)),
            Self::Locked(m) => Self::Locked(wrap(m)),
        }
    }

    /// Whether the request executor may retry after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryLater(_) | Self::NetworkFailed(_))
    }

    /// Map an HTTP status code to an error category.
    ///
    /// Used as the fallback when the response body carries no structured
    /// error code.
    #[must_use]
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 => Self::ReauthRequired(message),
            403 => Self::AccessDenied(message),
            404 | 410 => Self::ResourceNotFound(message),
            409 => Self::Conflict(message),
            413 | 507 => Self::QuotaExceeded(message),
            429 | 503 => Self::RetryLater(message),
            400 | 405 | 406 | 422 => Self::InvalidRequest(message),
            _ => Self::OperationFailed(message),
        }
    }

    /// Map a structured server error code to an error category.
    ///
    /// Returns `None` for unrecognized codes so callers can fall back to
    /// the HTTP status mapping.
    #[must_use]
    pub fn from_api_code(code: &str, message: String) -> Option<Self> {
        let err = match code {
            "accessDenied" | "notAllowed" => Self::AccessDenied(message),
            "unauthenticated" | "invalid_grant" => Self::ReauthRequired(message),
            "itemNotFound" => Self::ResourceNotFound(message),
            "nameAlreadyExists" | "resourceModified" => Self::Conflict(message),
            "quotaLimitReached" => Self::QuotaExceeded(message),
            "activityLimitReached" | "serviceNotAvailable" => Self::RetryLater(message),
            "invalidRequest" | "malformedEntityTag" | "bad_verification_code" => {
                Self::InvalidRequest(message)
            }
            "generalException" => Self::OperationFailed(message),
            "authorization_pending" => Self::AuthorizationPending(message),
            "authorization_declined" => Self::AuthorizationDeclined(message),
            "expired_token" => Self::TokenExpired(message),
            _ => return None,
        };
        Some(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(format!("I/O error: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::DecodingFailed(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::NetworkFailed(e.to_string())
    }
}
