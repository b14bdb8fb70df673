//! API client contracts
//!
//! The fetch engine never talks HTTP directly: it depends on the narrow
//! capabilities defined here. [`OrdersApi`] is the paged-fetch surface,
//! [`ClientRefresher`] produces a replacement client once credentials expire,
//! and failures travel as structured [`ApiError`] values carrying the status
//! code and message the classifier operates on.

use crate::{Credentials, Marketplace, Order, OrderAddress, OrderItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod http;

pub use http::{LwaClientFactory, SellingApiClient};

/// A failed API call, reduced to the two facts the engine classifies on.
///
/// `status` is `0` when no HTTP response was received at all (transport
/// errors); those classify as unexpected and abort the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("API request failed (status {status}): {message}")]
pub struct ApiError {
    /// HTTP status code of the failed response, 0 if none was received
    pub status: u16,
    /// Error message reported by the API or the transport
    pub message: String,
}

impl ApiError {
    /// Create an error from a status code and message.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Create a transport-level error that never produced an HTTP response.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }
}

/// Result type for API client operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Opaque continuation token returned by a paged endpoint.
///
/// Absence signals the end of a resource's pages. Tokens are scoped to one
/// fetch session and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

impl PageToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token value to send with the next request.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of records plus the token for the next page, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Records contained in this page
    pub records: Vec<T>,
    /// Continuation token; `None` means this was the final page
    pub next_token: Option<PageToken>,
}

impl<T> Page<T> {
    /// Build a page from records and an optional continuation token.
    pub fn new(records: Vec<T>, next_token: Option<PageToken>) -> Self {
        Self {
            records,
            next_token,
        }
    }

    /// A final page carrying the given records and no continuation token.
    pub fn last(records: Vec<T>) -> Self {
        Self::new(records, None)
    }
}

/// Filters applied to an order-listing fetch.
#[derive(Debug, Clone, Default)]
pub struct OrderFilters {
    /// Only orders created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
    /// Only orders created before this instant
    pub created_before: Option<DateTime<Utc>>,
    /// Restrict to these order statuses (empty = all)
    pub order_statuses: Vec<String>,
}

impl OrderFilters {
    /// Filter on creation time only.
    pub fn created_after(instant: DateTime<Utc>) -> Self {
        Self {
            created_after: Some(instant),
            ..Self::default()
        }
    }

    /// Render the filters as query parameters.
    pub fn to_query(&self, marketplace: Marketplace) -> Vec<(&'static str, String)> {
        let mut params = vec![("MarketplaceIds", marketplace.marketplace_id().to_string())];
        if let Some(after) = self.created_after {
            params.push(("CreatedAfter", after.to_rfc3339()));
        }
        if let Some(before) = self.created_before {
            params.push(("CreatedBefore", before.to_rfc3339()));
        }
        if !self.order_statuses.is_empty() {
            params.push(("OrderStatuses", self.order_statuses.join(",")));
        }
        params
    }
}

/// Paged-fetch capability the engine drives.
///
/// Implementations own one authenticated session. The engine holds the client
/// exclusively while a retry loop runs and replaces it wholesale (never
/// mutates it) when the refresher produces a new one.
#[async_trait]
pub trait OrdersApi: Send + Sync {
    /// Fetch one page of the order listing.
    async fn fetch_orders_page(
        &self,
        filters: &OrderFilters,
        marketplace: Marketplace,
        token: Option<&PageToken>,
    ) -> ApiResult<Page<Order>>;

    /// Fetch the shipping address of a single order.
    ///
    /// The address endpoint is not paged; the returned page is always final.
    async fn fetch_order_address(&self, order_id: &str) -> ApiResult<Page<OrderAddress>>;

    /// Fetch one page of a single order's line items.
    async fn fetch_order_items_page(
        &self,
        order_id: &str,
        token: Option<&PageToken>,
    ) -> ApiResult<Page<OrderItem>>;

    /// HTTP status of the most recent response, if any request was made.
    fn last_status_code(&self) -> Option<u16>;
}

/// Factory capability producing a freshly authenticated client.
///
/// Invoked by the retry coordinator when a client's credentials expire. A
/// refresh failure is fatal: there is no refresh-of-refresh.
#[async_trait]
pub trait ClientRefresher<C>: Send + Sync {
    /// Build a new authenticated client for the given credentials.
    async fn refresh(&self, credentials: &Credentials, marketplace: Marketplace) -> ApiResult<C>;
}
