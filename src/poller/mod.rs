//! Resilient fetch engine
//!
//! This module drives continuation-token pagination to completion against a
//! rate-limited API while surviving transient failures:
//!
//! 1. **Classification**: every failure is reduced to one of three kinds by
//!    [`classify::classify`] - rate limited, credential expired, or unexpected
//! 2. **Coordination**: [`retry::RetryCoordinator`] owns the attempt and
//!    refresh budgets and decides whether to back off, replace the client, or
//!    give up
//! 3. **Pagination**: [`pagination::Poller`] runs the fetch loops - one for a
//!    single paged resource, one for a sub-resource nested under each record
//!    of a parent list
//! 4. **Observation**: per-item progress and aborts are reported through the
//!    [`progress::ProgressObserver`] seam
//!
//! # Quick Start
//!
//! ```no_run
//! use chrono::{TimeZone, Utc};
//! use marketplace_order_poller::client::{ClientRefresher, LwaClientFactory, OrderFilters};
//! use marketplace_order_poller::manager::OrderListFetcher;
//! use marketplace_order_poller::poller::Poller;
//! use marketplace_order_poller::{Credentials, Marketplace};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = Credentials::from_env()?;
//! let marketplace = Marketplace::UnitedStates;
//! let factory = LwaClientFactory::new();
//! let client = factory.refresh(&credentials, marketplace).await?;
//!
//! let filters = OrderFilters::created_after(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
//! let poller = Poller::new(&credentials, marketplace, &factory);
//! let report = poller
//!     .fetch_all(client, &OrderListFetcher::new(filters, marketplace))
//!     .await?;
//! println!("{} orders, complete: {}", report.records.len(), report.is_complete());
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Exhausted budgets are not errors: the engine stops gracefully and the
//! report says so ([`FetchReport::stopped`], [`Completion::PartialFailure`]).
//! Only unexpected failures and refresh failures surface as [`PollError`],
//! and by then everything already committed to the caller's aggregate is
//! still in the caller's hands.

pub mod classify;
pub mod config;
pub mod pagination;
pub mod progress;
pub mod retry;

pub use classify::ErrorKind;
pub use config::RetryPolicy;
pub use pagination::{PageFetcher, ParentRecord, PerItemFetcher, Poller};
pub use progress::{ProgressObserver, TracingObserver};
pub use retry::{Resolution, RetryCoordinator, RetryState};

/// Fetch engine errors.
///
/// These are the unrecoverable conditions. Budget exhaustion is reported
/// through [`FetchReport`] / [`Completion`] instead.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Retry policy rejected at construction
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),

    /// Failure the classifier deemed non-retryable
    #[error("unexpected API failure (status {status}): {message}")]
    Unexpected {
        /// HTTP status of the failed response, 0 if none was received
        status: u16,
        /// Message reported by the API or transport
        message: String,
    },

    /// The client-refresh capability itself failed
    #[error("client refresh failed: {0}")]
    RefreshFailed(crate::client::ApiError),
}

impl PollError {
    /// Wrap a classified-as-unexpected API failure.
    pub fn unexpected(error: crate::client::ApiError) -> Self {
        Self::Unexpected {
            status: error.status,
            message: error.message,
        }
    }
}

/// Why the engine stopped before completing a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The rate-limit attempt budget ran out
    RetriesExhausted,
    /// The client-refresh budget ran out
    RefreshBudgetExhausted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::RetriesExhausted => "retries exhausted",
            StopReason::RefreshBudgetExhausted => "client refresh budget exhausted",
        };
        write!(f, "{s}")
    }
}

/// Result of a single-resource fetch: the records collected, plus whether the
/// run finished all pages or stopped early.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport<T> {
    /// Records collected, in page order
    pub records: Vec<T>,
    /// `Some` when the run stopped before the final page
    pub stopped: Option<StopReason>,
}

impl<T> FetchReport<T> {
    /// Whether every page was fetched.
    pub fn is_complete(&self) -> bool {
        self.stopped.is_none()
    }
}

/// Completion state of a multi-item run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every item's pages were fetched
    Complete,
    /// The run aborted early; counts describe how far it got
    PartialFailure {
        /// Items whose pages were fully fetched and committed
        completed_items: usize,
        /// Items the run was asked to process
        total_items: usize,
        /// Why the run aborted
        reason: StopReason,
    },
}

impl Completion {
    /// Whether the run covered every item.
    pub fn is_complete(&self) -> bool {
        matches!(self, Completion::Complete)
    }
}

/// Result of a multi-item fetch assembled by the facade: the aggregated
/// records plus the run's completion state.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateReport<T> {
    /// Records aggregated across all completed items, in item order
    pub records: Vec<T>,
    /// How the run ended
    pub completion: Completion,
}

impl<T> AggregateReport<T> {
    /// Whether the run covered every item.
    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }
}
