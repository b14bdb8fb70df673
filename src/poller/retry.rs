//! Retry coordination
//!
//! [`RetryCoordinator`] owns the attempt and refresh counters for one fetch
//! run and turns classified failures into decisions: back off and retry with
//! the same client, retry with a freshly built client, stop gracefully, or
//! propagate a fatal error.

use super::classify::ErrorKind;
use super::config::{backoff_with_jitter, RetryPolicy};
use super::{PollError, StopReason};
use crate::client::{ApiError, ClientRefresher};
use crate::{Credentials, Marketplace};
use tracing::{error, info, warn};

/// Retry counters for a fetch run.
///
/// `attempt` starts at 1 and resets at the start of each resource/item's
/// pagination. `client_refreshes` is a per-run budget: it is never reset
/// while the same coordinator drives a multi-item run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Current attempt number (1-based) for the resource/item being fetched
    pub attempt: u32,
    /// Total client refreshes performed so far in this run
    pub client_refreshes: u32,
}

impl RetryState {
    fn new() -> Self {
        Self {
            attempt: 1,
            client_refreshes: 0,
        }
    }
}

/// Outcome of resolving a recoverable failure.
#[derive(Debug)]
pub enum Resolution<C> {
    /// Retry the failed request with this client (the same one, or a
    /// freshly built replacement)
    Retry(C),
    /// Give up gracefully, keeping whatever was collected so far
    Stop(StopReason),
}

/// Decides, for each classified failure, whether the fetch loop continues.
///
/// Owns the client while a decision is in flight: the caller hands the
/// client in with the error and receives it (or a replacement) back on
/// [`Resolution::Retry`]. The client is replaced wholesale on refresh,
/// never mutated.
pub struct RetryCoordinator<'a, C> {
    policy: &'a RetryPolicy,
    refresher: &'a dyn ClientRefresher<C>,
    credentials: &'a Credentials,
    marketplace: Marketplace,
    state: RetryState,
}

impl<'a, C> RetryCoordinator<'a, C> {
    /// Create a coordinator for one fetch run.
    pub fn new(
        policy: &'a RetryPolicy,
        refresher: &'a dyn ClientRefresher<C>,
        credentials: &'a Credentials,
        marketplace: Marketplace,
    ) -> Self {
        Self {
            policy,
            refresher,
            credentials,
            marketplace,
            state: RetryState::new(),
        }
    }

    /// Current counters.
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Start pagination of a new item: the attempt counter resets, the
    /// refresh budget carries over.
    pub fn begin_item(&mut self) {
        self.state.attempt = 1;
    }

    /// Resolve a failed page fetch into a retry decision.
    ///
    /// On a rate limit this awaits the backoff delay before returning, so by
    /// the time the caller sees [`Resolution::Retry`] it may fire the request
    /// immediately. Unexpected failures and refresh failures return `Err` and
    /// abort the run.
    pub async fn resolve(&mut self, error: ApiError, client: C) -> Result<Resolution<C>, PollError> {
        match ErrorKind::of(&error) {
            ErrorKind::RateLimited => {
                if self.state.attempt <= self.policy.max_attempts() {
                    let delay = backoff_with_jitter(self.policy, self.state.attempt);
                    warn!(
                        attempt = self.state.attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited - retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    self.state.attempt += 1;
                    Ok(Resolution::Retry(client))
                } else {
                    error!(
                        max_attempts = self.policy.max_attempts(),
                        "Request rate exceeded after exhausting retries - stopping"
                    );
                    Ok(Resolution::Stop(StopReason::RetriesExhausted))
                }
            }
            ErrorKind::CredentialExpired => {
                if self.state.client_refreshes < self.policy.max_client_refreshes() {
                    info!("Credentials expired - refreshing API client");
                    let refreshed = self
                        .refresher
                        .refresh(self.credentials, self.marketplace)
                        .await
                        .map_err(PollError::RefreshFailed)?;
                    self.state.client_refreshes += 1;
                    info!(
                        refreshes = self.state.client_refreshes,
                        max_refreshes = self.policy.max_client_refreshes(),
                        "Client refreshed - retrying"
                    );
                    Ok(Resolution::Retry(refreshed))
                } else {
                    error!(
                        max_refreshes = self.policy.max_client_refreshes(),
                        "Client refresh budget exhausted - stopping"
                    );
                    Ok(Resolution::Stop(StopReason::RefreshBudgetExhausted))
                }
            }
            ErrorKind::Unexpected => Err(PollError::unexpected(error)),
        }
    }
}
