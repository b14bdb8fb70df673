//! High-level polling facade
//!
//! [`PollingManager`] pairs a credential bundle with a marketplace and wires
//! the default HTTP client factory into the fetch engine, exposing one call
//! per result set: the order listing, and the per-order address and line-item
//! sub-resources.

use crate::client::{
    ApiResult, LwaClientFactory, OrderFilters, OrdersApi, Page, PageToken, SellingApiClient,
};
use crate::poller::{
    AggregateReport, FetchReport, PageFetcher, PerItemFetcher, PollError, Poller, RetryPolicy,
};
use crate::{Credentials, Marketplace, Order, OrderAddress, OrderItem};
use async_trait::async_trait;
use tracing::{error, info_span};

/// Fetches pages of the order listing under the configured filters.
pub struct OrderListFetcher {
    filters: OrderFilters,
    marketplace: Marketplace,
}

impl OrderListFetcher {
    /// Create a listing fetcher for the given filters and marketplace.
    pub fn new(filters: OrderFilters, marketplace: Marketplace) -> Self {
        Self {
            filters,
            marketplace,
        }
    }
}

#[async_trait]
impl<C: OrdersApi> PageFetcher<C> for OrderListFetcher {
    type Record = Order;

    async fn fetch_page(&self, client: &C, token: Option<&PageToken>) -> ApiResult<Page<Order>> {
        client
            .fetch_orders_page(&self.filters, self.marketplace, token)
            .await
    }
}

/// Fetches the shipping address sub-resource for one order.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressFetcher;

#[async_trait]
impl<C: OrdersApi> PerItemFetcher<C> for AddressFetcher {
    type Record = OrderAddress;

    async fn fetch_page(
        &self,
        item_id: &str,
        client: &C,
        _token: Option<&PageToken>,
    ) -> ApiResult<Page<OrderAddress>> {
        // The address endpoint is unpaged; the returned page is always final.
        client.fetch_order_address(item_id).await
    }
}

/// Fetches the line-item sub-resource pages for one order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineItemFetcher;

#[async_trait]
impl<C: OrdersApi> PerItemFetcher<C> for LineItemFetcher {
    type Record = OrderItem;

    async fn fetch_page(
        &self,
        item_id: &str,
        client: &C,
        token: Option<&PageToken>,
    ) -> ApiResult<Page<OrderItem>> {
        client.fetch_order_items_page(item_id, token).await
    }
}

/// Facade owning everything a fetch run needs.
pub struct PollingManager {
    credentials: Credentials,
    marketplace: Marketplace,
    policy: RetryPolicy,
    factory: LwaClientFactory,
}

impl PollingManager {
    /// Create a manager with the default retry policy and LWA factory.
    pub fn new(credentials: Credentials, marketplace: Marketplace) -> Self {
        Self {
            credentials,
            marketplace,
            policy: RetryPolicy::default(),
            factory: LwaClientFactory::new(),
        }
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the client factory (for testing against a stub endpoint).
    pub fn with_factory(mut self, factory: LwaClientFactory) -> Self {
        self.factory = factory;
        self
    }

    /// The marketplace this manager fetches from.
    pub fn marketplace(&self) -> Marketplace {
        self.marketplace
    }

    fn poller(&self) -> Poller<'_, SellingApiClient> {
        Poller::new(&self.credentials, self.marketplace, &self.factory)
            .with_policy(self.policy.clone())
    }

    async fn build_client(&self) -> Result<SellingApiClient, PollError> {
        use crate::client::ClientRefresher;
        self.factory
            .refresh(&self.credentials, self.marketplace)
            .await
            .map_err(PollError::RefreshFailed)
    }

    /// Fetch every order matching the filters.
    pub async fn fetch_all_orders(
        &self,
        filters: &OrderFilters,
    ) -> Result<FetchReport<Order>, PollError> {
        let span = info_span!("fetch_all_orders", marketplace = %self.marketplace);
        let _enter = span.enter();

        let client = self.build_client().await?;
        let fetcher = OrderListFetcher::new(filters.clone(), self.marketplace);
        self.poller().fetch_all(client, &fetcher).await
    }

    /// Fetch the shipping address for each of the given orders.
    pub async fn fetch_order_addresses(
        &self,
        orders: &[Order],
    ) -> Result<AggregateReport<OrderAddress>, PollError> {
        let span = info_span!("fetch_order_addresses", orders = orders.len());
        let _enter = span.enter();
        self.fetch_per_order(orders, &AddressFetcher).await
    }

    /// Fetch every line item for each of the given orders.
    pub async fn fetch_order_items(
        &self,
        orders: &[Order],
    ) -> Result<AggregateReport<OrderItem>, PollError> {
        let span = info_span!("fetch_order_items", orders = orders.len());
        let _enter = span.enter();
        self.fetch_per_order(orders, &LineItemFetcher).await
    }

    async fn fetch_per_order<F>(
        &self,
        orders: &[Order],
        fetcher: &F,
    ) -> Result<AggregateReport<F::Record>, PollError>
    where
        F: PerItemFetcher<SellingApiClient>,
    {
        let client = self.build_client().await?;
        let mut records = Vec::new();

        match self
            .poller()
            .fetch_all_for_items(orders, client, fetcher, &mut records)
            .await
        {
            Ok(completion) => Ok(AggregateReport {
                records,
                completion,
            }),
            Err(e) => {
                error!(
                    preserved_records = records.len(),
                    "Aborting run after fatal error"
                );
                Err(e)
            }
        }
    }
}
