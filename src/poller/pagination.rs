//! Pagination strategies
//!
//! Two fetch shapes share the same retry machinery:
//!
//! - [`Poller::fetch_all`] drives continuation-token pagination for one
//!   logical resource (an order listing)
//! - [`Poller::fetch_all_for_items`] iterates a list of parent records and
//!   paginates a sub-resource for each one (addresses or line items per
//!   order), aggregating into a caller-owned buffer
//!
//! Records are only appended after a successful page response, so retries
//! never duplicate previously-fetched records.

use super::progress::{ProgressObserver, TracingObserver};
use super::retry::{Resolution, RetryCoordinator};
use super::{Completion, FetchReport, PollError, RetryPolicy};
use crate::client::{ApiResult, ClientRefresher, Page, PageToken};
use crate::{Credentials, Marketplace, Order};
use async_trait::async_trait;
use tracing::{debug, warn};

static DEFAULT_OBSERVER: TracingObserver = TracingObserver;

/// Strategy for fetching one page of a single paged resource.
#[async_trait]
pub trait PageFetcher<C>: Send + Sync {
    /// Record type the resource yields
    type Record: Send;

    /// Fetch the page identified by `token` (`None` = first page).
    async fn fetch_page(
        &self,
        client: &C,
        token: Option<&PageToken>,
    ) -> ApiResult<Page<Self::Record>>;
}

/// Strategy for fetching one page of a sub-resource nested under a parent
/// record (e.g. the line items of one order).
#[async_trait]
pub trait PerItemFetcher<C>: Send + Sync {
    /// Record type the sub-resource yields
    type Record: Send;

    /// Fetch the page identified by `token` for the given parent item.
    async fn fetch_page(
        &self,
        item_id: &str,
        client: &C,
        token: Option<&PageToken>,
    ) -> ApiResult<Page<Self::Record>>;
}

/// A parent record the multi-item loop can key a sub-resource fetch on.
pub trait ParentRecord {
    /// Identifier handed to the per-item fetch strategy.
    fn record_id(&self) -> &str;
}

impl ParentRecord for Order {
    fn record_id(&self) -> &str {
        &self.amazon_order_id
    }
}

impl ParentRecord for String {
    fn record_id(&self) -> &str {
        self
    }
}

impl ParentRecord for &str {
    fn record_id(&self) -> &str {
        self
    }
}

/// Drives pagination to completion under one retry policy.
///
/// Owns nothing long-lived itself: credentials and the refresh capability are
/// borrowed from the caller, and the API client is handed in per fetch and
/// replaced wholesale whenever the coordinator refreshes it.
pub struct Poller<'a, C> {
    policy: RetryPolicy,
    credentials: &'a Credentials,
    marketplace: Marketplace,
    refresher: &'a dyn ClientRefresher<C>,
    observer: &'a dyn ProgressObserver,
}

impl<'a, C> Poller<'a, C> {
    /// Create a poller with the default retry policy and tracing observer.
    pub fn new(
        credentials: &'a Credentials,
        marketplace: Marketplace,
        refresher: &'a dyn ClientRefresher<C>,
    ) -> Self {
        Self {
            policy: RetryPolicy::default(),
            credentials,
            marketplace,
            refresher,
            observer: &DEFAULT_OBSERVER,
        }
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the progress observer.
    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = observer;
        self
    }

    fn coordinator(&self) -> RetryCoordinator<'_, C> {
        RetryCoordinator::new(
            &self.policy,
            self.refresher,
            self.credentials,
            self.marketplace,
        )
    }

    /// Fetch every page of a single resource.
    ///
    /// On a graceful stop the report carries everything collected so far plus
    /// the stop reason; only unexpected failures surface as `Err`.
    pub async fn fetch_all<F>(
        &self,
        client: C,
        fetcher: &F,
    ) -> Result<FetchReport<F::Record>, PollError>
    where
        F: PageFetcher<C>,
    {
        let mut coordinator = self.coordinator();
        let mut client = client;
        let mut records = Vec::new();
        let mut token: Option<PageToken> = None;
        let mut page_number = 1usize;

        loop {
            match fetcher.fetch_page(&client, token.as_ref()).await {
                Ok(page) => {
                    debug!(
                        page = page_number,
                        records = page.records.len(),
                        "Fetched page"
                    );
                    records.extend(page.records);
                    match page.next_token {
                        Some(next) => {
                            token = Some(next);
                            page_number += 1;
                        }
                        None => {
                            debug!(total = records.len(), "Pagination complete");
                            return Ok(FetchReport {
                                records,
                                stopped: None,
                            });
                        }
                    }
                }
                // The failed page's token is kept, so a retry resumes exactly
                // where the failure happened.
                Err(error) => match coordinator.resolve(error, client).await? {
                    Resolution::Retry(next_client) => client = next_client,
                    Resolution::Stop(reason) => {
                        warn!(
                            collected = records.len(),
                            %reason,
                            "Stopping pagination early"
                        );
                        return Ok(FetchReport {
                            records,
                            stopped: Some(reason),
                        });
                    }
                },
            }
        }
    }

    /// Fetch every page of a sub-resource for each parent item, in input
    /// order, appending committed records to `out`.
    ///
    /// An item's records are committed to `out` only once all of its pages
    /// succeeded. If the coordinator stops the run, remaining items are not
    /// attempted and the completion reports how far the run got. A fatal
    /// error propagates as `Err`, leaving everything already committed to
    /// `out` intact.
    pub async fn fetch_all_for_items<I, F>(
        &self,
        items: &[I],
        client: C,
        fetcher: &F,
        out: &mut Vec<F::Record>,
    ) -> Result<Completion, PollError>
    where
        I: ParentRecord,
        F: PerItemFetcher<C>,
    {
        let total = items.len();
        let mut coordinator = self.coordinator();
        let mut client = client;

        for (index, item) in items.iter().enumerate() {
            coordinator.begin_item();
            let item_id = item.record_id();
            let mut token: Option<PageToken> = None;
            let mut pending: Vec<F::Record> = Vec::new();

            loop {
                match fetcher.fetch_page(item_id, &client, token.as_ref()).await {
                    Ok(page) => {
                        pending.extend(page.records);
                        match page.next_token {
                            Some(next) => token = Some(next),
                            None => break,
                        }
                    }
                    Err(error) => match coordinator.resolve(error, client).await? {
                        Resolution::Retry(next_client) => client = next_client,
                        Resolution::Stop(reason) => {
                            self.observer.on_abort(index, total, reason);
                            return Ok(Completion::PartialFailure {
                                completed_items: index,
                                total_items: total,
                                reason,
                            });
                        }
                    },
                }
            }

            debug!(item = item_id, records = pending.len(), "Item complete");
            out.extend(pending);
            self.observer.on_item_complete(index + 1, total);
        }

        Ok(Completion::Complete)
    }
}
