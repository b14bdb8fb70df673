//! CLI error types and conversions

use crate::poller::PollError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Fetch engine error
    #[error("poll error: {0}")]
    Poll(#[from] PollError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error (missing credentials, bad policy values)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Output error
    #[error("output error: {0}")]
    Output(String),
}
