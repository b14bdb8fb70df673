//! HTTP-backed Selling Partner API client
//!
//! Provides the default [`OrdersApi`] implementation on top of reqwest:
//! - shared connection pool with explicit timeouts
//! - query-parameter GET requests against the regional endpoint
//! - structured error mapping into [`ApiError`] values
//! - LWA refresh-token exchange for (re)building authenticated clients
//!
//! Note that there is no retry logic at this layer. Failures are returned as
//! values and every retry decision belongs to the fetch engine.

use once_cell::sync::Lazy;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{ApiError, ApiResult, ClientRefresher, OrderFilters, Page, PageToken};
use crate::{Credentials, Marketplace, Order, OrderAddress, OrderItem};
use async_trait::async_trait;

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// LWA token exchange endpoint
const LWA_TOKEN_URL: &str = "https://api.amazon.com/auth/o2/token";

/// Shared HTTP client for all API sessions.
///
/// reqwest clients are cheap to clone (Arc internally); a single global
/// instance keeps connection pooling effective across client refreshes.
static SHARED_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(
        Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                panic!("FATAL: Failed to build HTTP client: {e}. Check system TLS configuration.");
            }),
    )
});

/// Access the process-wide shared HTTP client.
pub fn shared_http_client() -> Arc<Client> {
    SHARED_HTTP_CLIENT.clone()
}

/// SP-API response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    payload: T,
}

/// SP-API error body: `{"errors": [{"code": ..., "message": ...}]}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrdersPayload {
    #[serde(default)]
    orders: Vec<Order>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddressPayload {
    amazon_order_id: String,
    #[serde(default)]
    shipping_address: Option<AddressFields>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddressFields {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address_line1: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state_or_region: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrderItemsPayload {
    #[serde(default)]
    order_items: Vec<OrderItem>,
    #[serde(default)]
    next_token: Option<String>,
}

/// Authenticated API session against one regional endpoint.
///
/// Holds a short-lived access token; once the token expires the session is
/// discarded and the [`LwaClientFactory`] builds a replacement.
pub struct SellingApiClient {
    http: Arc<Client>,
    base_url: String,
    access_token: String,
    last_status: AtomicU16,
}

impl SellingApiClient {
    /// Create a session for the given marketplace endpoint.
    pub fn new(marketplace: Marketplace, access_token: impl Into<String>) -> Self {
        Self::with_base_url(marketplace.endpoint(), access_token)
    }

    /// Create a session against a custom base URL (for testing).
    pub fn with_base_url(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: shared_http_client(),
            base_url: base_url.into(),
            access_token: access_token.into(),
            last_status: AtomicU16::new(0),
        }
    }

    /// Execute a GET request and deserialize the enveloped payload.
    async fn get<T>(&self, endpoint: &str, params: &[(&str, String)]) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(url = %url, params = params.len(), "GET");

        let response = self
            .http
            .get(&url)
            .query(params)
            .header("x-amz-access-token", &self.access_token)
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let status = response.status();
        self.last_status.store(status.as_u16(), Ordering::Relaxed);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) if !parsed.errors.is_empty() => parsed.errors[0].message.clone(),
                _ => body,
            };
            return Err(ApiError::new(status.as_u16(), message));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            ApiError::new(
                status.as_u16(),
                format!("Failed to deserialize response: {e}"),
            )
        })?;
        Ok(envelope.payload)
    }
}

#[async_trait]
impl super::OrdersApi for SellingApiClient {
    async fn fetch_orders_page(
        &self,
        filters: &OrderFilters,
        marketplace: Marketplace,
        token: Option<&PageToken>,
    ) -> ApiResult<Page<Order>> {
        let mut params = filters.to_query(marketplace);
        if let Some(token) = token {
            params.push(("NextToken", token.as_str().to_string()));
        }

        let payload: OrdersPayload = self.get("/orders/v0/orders", &params).await?;
        Ok(Page::new(
            payload.orders,
            payload.next_token.map(PageToken::new),
        ))
    }

    async fn fetch_order_address(&self, order_id: &str) -> ApiResult<Page<OrderAddress>> {
        let endpoint = format!("/orders/v0/orders/{order_id}/address");
        let payload: AddressPayload = self.get(&endpoint, &[]).await?;

        let records = match payload.shipping_address {
            Some(fields) => vec![OrderAddress {
                amazon_order_id: payload.amazon_order_id,
                name: fields.name,
                address_line1: fields.address_line1,
                city: fields.city,
                state_or_region: fields.state_or_region,
                postal_code: fields.postal_code,
                country_code: fields.country_code,
            }],
            None => Vec::new(),
        };
        Ok(Page::last(records))
    }

    async fn fetch_order_items_page(
        &self,
        order_id: &str,
        token: Option<&PageToken>,
    ) -> ApiResult<Page<OrderItem>> {
        let endpoint = format!("/orders/v0/orders/{order_id}/orderItems");
        let mut params = Vec::new();
        if let Some(token) = token {
            params.push(("NextToken", token.as_str().to_string()));
        }

        let payload: OrderItemsPayload = self.get(&endpoint, &params).await?;
        Ok(Page::new(
            payload.order_items,
            payload.next_token.map(PageToken::new),
        ))
    }

    fn last_status_code(&self) -> Option<u16> {
        match self.last_status.load(Ordering::Relaxed) {
            0 => None,
            status => Some(status),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LwaTokenResponse {
    access_token: String,
}

/// Client factory performing the LWA refresh-token exchange.
///
/// Used both for the initial client and by the retry coordinator whenever an
/// expired session must be replaced.
pub struct LwaClientFactory {
    http: Arc<Client>,
    token_url: String,
}

impl LwaClientFactory {
    /// Create a factory against the production LWA endpoint.
    pub fn new() -> Self {
        Self {
            http: shared_http_client(),
            token_url: LWA_TOKEN_URL.to_string(),
        }
    }

    /// Create a factory against a custom token endpoint (for testing).
    pub fn with_token_url(token_url: impl Into<String>) -> Self {
        Self {
            http: shared_http_client(),
            token_url: token_url.into(),
        }
    }

    /// Exchange the refresh token for a fresh access token.
    async fn exchange(&self, credentials: &Credentials) -> ApiResult<String> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", credentials.refresh_token.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::new(
                status.as_u16(),
                format!("Token exchange failed: {body}"),
            ));
        }

        let token: LwaTokenResponse = response.json().await.map_err(|e| {
            ApiError::new(
                status.as_u16(),
                format!("Failed to deserialize token response: {e}"),
            )
        })?;
        Ok(token.access_token)
    }
}

impl Default for LwaClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientRefresher<SellingApiClient> for LwaClientFactory {
    async fn refresh(
        &self,
        credentials: &Credentials,
        marketplace: Marketplace,
    ) -> ApiResult<SellingApiClient> {
        let access_token = self.exchange(credentials).await?;
        debug!(marketplace = %marketplace, "Built authenticated API client");
        Ok(SellingApiClient::new(marketplace, access_token))
    }
}
