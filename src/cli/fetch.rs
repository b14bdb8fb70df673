//! Fetch command implementations

use crate::client::OrderFilters;
use crate::manager::PollingManager;
use crate::poller::{Completion, RetryPolicy};
use crate::{Credentials, Marketplace};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::CliError;

/// Try to parse a datetime from RFC3339 format.
///
/// Handles inputs both with and without timezone designators:
/// - "2024-01-01T00:00:00Z" - explicit UTC
/// - "2024-01-01T00:00:00+01:00" - explicit offset
/// - "2024-01-01T00:00:00" - no timezone, assumed UTC
fn try_parse_datetime_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

/// Parse a window start from YYYY-MM-DD or RFC3339 datetime format.
///
/// For date-only input, uses start-of-day (00:00:00 UTC).
pub fn parse_start_time_flexible(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(dt) = try_parse_datetime_rfc3339(input) {
        return Ok(dt);
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid start time: {e}")))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidArgument("Invalid start time".to_string()))?;
    Ok(datetime.and_utc())
}

/// Parse a window end from YYYY-MM-DD or RFC3339 datetime format.
///
/// For date-only input, uses end-of-day (23:59:59.999 UTC) so the specified
/// date is fully included.
pub fn parse_end_time_flexible(input: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(dt) = try_parse_datetime_rfc3339(input) {
        return Ok(dt);
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid end time: {e}")))?;
    let datetime = date
        .and_hms_milli_opt(23, 59, 59, 999)
        .ok_or_else(|| CliError::InvalidArgument("Invalid end time".to_string()))?;
    Ok(datetime.and_utc())
}

/// Serialize records as pretty JSON to the given path, or stdout.
pub fn write_json<T: Serialize>(path: Option<&Path>, records: &[T]) -> Result<(), CliError> {
    match path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| CliError::Output(format!("Failed to create {}: {e}", path.display())))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, records)
                .map_err(|e| CliError::Output(e.to_string()))?;
            writer
                .flush()
                .map_err(|e| CliError::Output(e.to_string()))?;
            info!(path = %path.display(), count = records.len(), "Wrote records");
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, records)
                .map_err(|e| CliError::Output(e.to_string()))?;
            writeln!(handle).map_err(|e| CliError::Output(e.to_string()))?;
        }
    }
    Ok(())
}

/// Resilient marketplace order poller
#[derive(Debug, Parser)]
#[command(name = "marketplace-order-poller", version, about)]
pub struct Cli {
    /// Target marketplace (US, CA, MX, UK, DE, FR, JP, AU)
    #[arg(long, global = true, default_value = "US")]
    pub marketplace: Marketplace,

    /// Base sleep in seconds before the first backoff retry
    #[arg(long, global = true, default_value_t = 5.0)]
    pub base_sleep_secs: f64,

    /// Maximum backoff retries per resource
    #[arg(long, global = true, default_value_t = 5)]
    pub max_attempts: u32,

    /// Exponential growth factor between retries
    #[arg(long, global = true, default_value_t = 4.0)]
    pub backoff_base: f64,

    /// Client refreshes allowed per run
    #[arg(long, global = true, default_value_t = 3)]
    pub max_client_refreshes: u32,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Build the retry policy from the global flags.
    pub fn retry_policy(&self) -> Result<RetryPolicy, CliError> {
        if !self.base_sleep_secs.is_finite() || self.base_sleep_secs <= 0.0 {
            return Err(CliError::InvalidArgument(format!(
                "base sleep must be positive, got {}",
                self.base_sleep_secs
            )));
        }
        RetryPolicy::new(
            Duration::from_secs_f64(self.base_sleep_secs),
            self.max_attempts,
            self.backoff_base,
            self.max_client_refreshes,
        )
        .map_err(|e| CliError::InvalidArgument(e.to_string()))
    }

    /// Build a manager from environment credentials and the global flags.
    pub fn manager(&self) -> Result<PollingManager, CliError> {
        let credentials = Credentials::from_env().map_err(CliError::Configuration)?;
        Ok(PollingManager::new(credentials, self.marketplace).with_policy(self.retry_policy()?))
    }
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch all orders in a creation-time window
    Orders(FetchArgs),
    /// Fetch shipping addresses for all orders in a window
    Addresses(FetchArgs),
    /// Fetch line items for all orders in a window
    OrderItems(FetchArgs),
}

/// Shared arguments for the fetch commands
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Window start: YYYY-MM-DD or RFC3339 datetime
    #[arg(long)]
    pub created_after: String,

    /// Window end: YYYY-MM-DD or RFC3339 datetime
    #[arg(long)]
    pub created_before: Option<String>,

    /// Restrict to this order status (repeatable)
    #[arg(long = "status")]
    pub statuses: Vec<String>,

    /// Write JSON to this file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl FetchArgs {
    /// Build order filters from the arguments.
    pub fn filters(&self) -> Result<OrderFilters, CliError> {
        let mut filters = OrderFilters::created_after(parse_start_time_flexible(&self.created_after)?);
        if let Some(before) = &self.created_before {
            filters.created_before = Some(parse_end_time_flexible(before)?);
        }
        filters.order_statuses = self.statuses.clone();
        Ok(filters)
    }

    /// Execute the `orders` command.
    pub async fn execute_orders(&self, cli: &Cli) -> Result<(), CliError> {
        let manager = cli.manager()?;
        let report = manager.fetch_all_orders(&self.filters()?).await?;

        match report.stopped {
            Some(reason) => warn!(
                %reason,
                collected = report.records.len(),
                "Order listing incomplete"
            ),
            None => info!(orders = report.records.len(), "Order listing complete"),
        }

        write_json(self.output.as_deref(), &report.records)
    }

    /// Execute the `addresses` command.
    pub async fn execute_addresses(&self, cli: &Cli) -> Result<(), CliError> {
        let manager = cli.manager()?;
        let listing = manager.fetch_all_orders(&self.filters()?).await?;
        if !listing.is_complete() {
            warn!("Order listing incomplete; fetching addresses for the orders collected so far");
        }

        let aggregate = manager.fetch_order_addresses(&listing.records).await?;
        report_completion("addresses", aggregate.completion);
        write_json(self.output.as_deref(), &aggregate.records)
    }

    /// Execute the `order-items` command.
    pub async fn execute_order_items(&self, cli: &Cli) -> Result<(), CliError> {
        let manager = cli.manager()?;
        let listing = manager.fetch_all_orders(&self.filters()?).await?;
        if !listing.is_complete() {
            warn!("Order listing incomplete; fetching line items for the orders collected so far");
        }

        let aggregate = manager.fetch_order_items(&listing.records).await?;
        report_completion("line items", aggregate.completion);
        write_json(self.output.as_deref(), &aggregate.records)
    }
}

fn report_completion(what: &str, completion: Completion) {
    match completion {
        Completion::Complete => info!("Fetched {what} for every order"),
        Completion::PartialFailure {
            completed_items,
            total_items,
            reason,
        } => warn!(
            %reason,
            completed_items,
            total_items,
            "Fetched {what} for only part of the order list"
        ),
    }
}
