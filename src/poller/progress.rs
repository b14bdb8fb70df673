//! Progress reporting for multi-item runs.
//!
//! The engine never logs progress directly; it calls into an injected
//! [`ProgressObserver`] so embedding callers can route progress wherever they
//! like (and tests can capture it). [`TracingObserver`] is the default and
//! emits the same kind of structured log lines the rest of the crate does.

use super::StopReason;
use tracing::{info, warn};

/// Observer for multi-item fetch progress.
///
/// `completed` counts parent items whose pages were fully fetched and
/// committed; `total` is the number of items the run was asked to process.
pub trait ProgressObserver: Send + Sync {
    /// Called after each item's pages complete.
    fn on_item_complete(&self, completed: usize, total: usize);

    /// Called once when the run aborts early.
    fn on_abort(&self, completed: usize, total: usize, reason: StopReason);
}

/// Fraction of the run completed, in percent.
pub fn percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        (completed as f64 / total as f64) * 100.0
    }
}

/// Human-readable progress string for logging.
pub fn format_progress(completed: usize, total: usize) -> String {
    format!(
        "[PROGRESS] Fetched {completed}/{total} items - {:.1}% complete",
        percentage(completed, total)
    )
}

/// Default observer that reports through the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_item_complete(&self, completed: usize, total: usize) {
        info!("{}", format_progress(completed, total));
    }

    fn on_abort(&self, completed: usize, total: usize, reason: StopReason) {
        warn!(
            remaining = total.saturating_sub(completed),
            "[ABORTED] {} - {:.1}% complete ({} of {} items fetched)",
            reason,
            percentage(completed, total),
            completed,
            total
        );
    }
}
