//! Failure classification
//!
//! The single source of truth for retryability. Both pagination strategies
//! funnel every failure through [`classify`] before the retry coordinator
//! decides what to do with it.

use crate::client::ApiError;

/// What a failed API call means for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request rate was exceeded (HTTP 429); retryable with backoff
    RateLimited,
    /// The session's credentials expired (HTTP 403 with an "expired" message);
    /// recoverable by refreshing the client
    CredentialExpired,
    /// Anything else; fatal and propagated immediately
    Unexpected,
}

impl ErrorKind {
    /// Classify a structured API failure.
    pub fn of(error: &ApiError) -> Self {
        classify(error.status, &error.message)
    }

    /// Whether the retry loop can do anything about this failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorKind::Unexpected)
    }
}

/// Map a status code and message to an [`ErrorKind`].
///
/// A 403 only counts as credential expiry when the message says so; plain
/// authorization failures are not recoverable by refreshing.
pub fn classify(status: u16, message: &str) -> ErrorKind {
    match status {
        429 => ErrorKind::RateLimited,
        403 if message.to_lowercase().contains("expired") => ErrorKind::CredentialExpired,
        _ => ErrorKind::Unexpected,
    }
}
