//! # Marketplace Order Poller
//!
//! A resilient polling client for rate-limited, paginated marketplace order
//! APIs (Amazon Selling-Partner-style). The library drives continuation-token
//! pagination to completion while surviving transient rate limiting and
//! credential expiry, without ever losing data that was already collected.
//!
//! ## Features
//!
//! - **Resilient pagination**: exponential backoff with jitter on 429s,
//!   bounded by a configurable attempt budget
//! - **Credential recovery**: expired clients are replaced wholesale through a
//!   pluggable refresh capability, bounded by a per-run refresh budget
//! - **Two fetch shapes**: single-resource pagination (an order listing) and
//!   per-item nested pagination (addresses or line items for each order)
//! - **Honest completeness**: results carry a completion marker, so an early
//!   stop after exhausted budgets is never mistaken for full success
//! - **Injected observability**: progress reporting goes through an observer
//!   trait, with a tracing-backed default
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::{TimeZone, Utc};
//! use marketplace_order_poller::client::OrderFilters;
//! use marketplace_order_poller::manager::PollingManager;
//! use marketplace_order_poller::{Credentials, Marketplace};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = Credentials::from_env()?;
//! let manager = PollingManager::new(credentials, Marketplace::UnitedStates);
//!
//! let filters = OrderFilters::created_after(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
//! let report = manager.fetch_all_orders(&filters).await?;
//!
//! println!("fetched {} orders (complete: {})", report.records.len(), report.is_complete());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`client`] - API client contracts and the reqwest-backed implementation
//! - [`poller`] - the fetch engine: retry coordination, error classification,
//!   backoff, and both pagination strategies
//! - [`manager`] - high-level facade wiring credentials to the engine
//! - [`cli`] - command-line interface implementations

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// API client contracts and HTTP implementation
pub mod client;

/// High-level polling facade
pub mod manager;

/// Resilient fetch engine
pub mod poller;

pub use manager::PollingManager;

/// Credential bundle required to construct an authenticated API client.
///
/// Treated as an opaque, immutable value: the engine passes it through to the
/// client-refresh capability unchanged.
#[derive(Clone)]
pub struct Credentials {
    /// LWA application client id
    pub client_id: String,
    /// LWA application client secret
    pub client_secret: String,
    /// Long-lived refresh token for the selling account
    pub refresh_token: String,
}

impl Credentials {
    /// Create a credential bundle from its parts.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Load credentials from the `SP_CLIENT_ID`, `SP_CLIENT_SECRET` and
    /// `SP_REFRESH_TOKEN` environment variables.
    pub fn from_env() -> Result<Self, String> {
        let get = |key: &str| {
            std::env::var(key).map_err(|_| format!("Missing environment variable: {key}"))
        };
        Ok(Self {
            client_id: get("SP_CLIENT_ID")?,
            client_secret: get("SP_CLIENT_SECRET")?,
            refresh_token: get("SP_REFRESH_TOKEN")?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secrets never reach logs, only the client id does.
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Target regional marketplace, selecting the API endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marketplace {
    /// United States (NA endpoint)
    #[serde(rename = "US")]
    UnitedStates,
    /// Canada (NA endpoint)
    #[serde(rename = "CA")]
    Canada,
    /// Mexico (NA endpoint)
    #[serde(rename = "MX")]
    Mexico,
    /// United Kingdom (EU endpoint)
    #[serde(rename = "UK")]
    UnitedKingdom,
    /// Germany (EU endpoint)
    #[serde(rename = "DE")]
    Germany,
    /// France (EU endpoint)
    #[serde(rename = "FR")]
    France,
    /// Japan (FE endpoint)
    #[serde(rename = "JP")]
    Japan,
    /// Australia (FE endpoint)
    #[serde(rename = "AU")]
    Australia,
}

impl Marketplace {
    /// Base URL of the regional API endpoint.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Marketplace::UnitedStates | Marketplace::Canada | Marketplace::Mexico => {
                "https://sellingpartnerapi-na.amazon.com"
            }
            Marketplace::UnitedKingdom | Marketplace::Germany | Marketplace::France => {
                "https://sellingpartnerapi-eu.amazon.com"
            }
            Marketplace::Japan | Marketplace::Australia => {
                "https://sellingpartnerapi-fe.amazon.com"
            }
        }
    }

    /// Marketplace identifier sent with order-listing requests.
    pub fn marketplace_id(&self) -> &'static str {
        match self {
            Marketplace::UnitedStates => "ATVPDKIKX0DER",
            Marketplace::Canada => "A2EUQ1WTGCTBG2",
            Marketplace::Mexico => "A1AM78C64UM0Y8",
            Marketplace::UnitedKingdom => "A1F83G8C2ARO7P",
            Marketplace::Germany => "A1PA6795UKMFR9",
            Marketplace::France => "A13V1IB3VIYZZH",
            Marketplace::Japan => "A1VC38T7YXB528",
            Marketplace::Australia => "A39IBJ37TRP1C6",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Marketplace::UnitedStates => "US",
            Marketplace::Canada => "CA",
            Marketplace::Mexico => "MX",
            Marketplace::UnitedKingdom => "UK",
            Marketplace::Germany => "DE",
            Marketplace::France => "FR",
            Marketplace::Japan => "JP",
            Marketplace::Australia => "AU",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Marketplace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "US" => Ok(Marketplace::UnitedStates),
            "CA" => Ok(Marketplace::Canada),
            "MX" => Ok(Marketplace::Mexico),
            "UK" | "GB" => Ok(Marketplace::UnitedKingdom),
            "DE" => Ok(Marketplace::Germany),
            "FR" => Ok(Marketplace::France),
            "JP" => Ok(Marketplace::Japan),
            "AU" => Ok(Marketplace::Australia),
            _ => Err(format!(
                "Invalid marketplace: {s}. Valid options: US, CA, MX, UK, DE, FR, JP, AU"
            )),
        }
    }
}

/// Monetary amount as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Money {
    /// ISO 4217 currency code (e.g., "USD")
    pub currency_code: String,
    /// Decimal amount
    pub amount: rust_decimal::Decimal,
}

/// A marketplace order record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Order {
    /// Marketplace-assigned order identifier
    pub amazon_order_id: String,
    /// Purchase timestamp (ISO 8601)
    pub purchase_date: chrono::DateTime<chrono::Utc>,
    /// Last update timestamp (ISO 8601)
    pub last_update_date: chrono::DateTime<chrono::Utc>,
    /// Order status (e.g., "Shipped", "Pending")
    pub order_status: String,
    /// Identifier of the marketplace the order was placed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace_id: Option<String>,
    /// Order total, absent until the order is priced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_total: Option<Money>,
    /// Number of items shipped
    #[serde(default)]
    pub number_of_items_shipped: u32,
    /// Number of items not yet shipped
    #[serde(default)]
    pub number_of_items_unshipped: u32,
}

/// Shipping address for a single order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderAddress {
    /// Order the address belongs to
    pub amazon_order_id: String,
    /// Recipient name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// First street line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    /// City
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// State or region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_or_region: Option<String>,
    /// Postal code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// ISO country code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

/// A single line item within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderItem {
    /// Marketplace-assigned line item identifier
    pub order_item_id: String,
    /// Amazon Standard Identification Number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
    /// Seller-assigned SKU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_sku: Option<String>,
    /// Item title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Quantity ordered
    pub quantity_ordered: u32,
    /// Item price, absent for zero-priced promotions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_price: Option<Money>,
}
