//! Retry policy and backoff calculation

use super::PollError;
use rand::Rng;
use std::time::Duration;

/// Default base sleep before the first backoff retry.
/// Five seconds is long enough for a request-rate window to recover while
/// keeping a full retry ladder under a few minutes.
pub const DEFAULT_BASE_SLEEP: Duration = Duration::from_secs(5);

/// Default maximum number of backoff retries per resource/item.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default exponential growth factor between retries.
pub const DEFAULT_BACKOFF_BASE: f64 = 4.0;

/// Default number of client refreshes allowed per run.
pub const DEFAULT_MAX_CLIENT_REFRESHES: u32 = 3;

/// Jitter is drawn uniformly from `[0, delay * JITTER_FRACTION)`.
const JITTER_FRACTION: f64 = 0.1;

/// Caller-supplied retry policy.
///
/// Validated at construction: a zero sleep or attempt budget would degrade to
/// an immediate stop and a growth factor at or below one would never back
/// off, so both are rejected.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_sleep: Duration,
    max_attempts: u32,
    backoff_base: f64,
    max_client_refreshes: u32,
}

impl RetryPolicy {
    /// Build a policy, rejecting degenerate values.
    pub fn new(
        base_sleep: Duration,
        max_attempts: u32,
        backoff_base: f64,
        max_client_refreshes: u32,
    ) -> Result<Self, PollError> {
        if base_sleep.is_zero() {
            return Err(PollError::InvalidPolicy(
                "base_sleep must be positive".to_string(),
            ));
        }
        if max_attempts == 0 {
            return Err(PollError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if backoff_base <= 1.0 {
            return Err(PollError::InvalidPolicy(format!(
                "backoff_base must be greater than 1, got {backoff_base}"
            )));
        }
        Ok(Self {
            base_sleep,
            max_attempts,
            backoff_base,
            max_client_refreshes,
        })
    }

    /// Base sleep before the first backoff retry.
    pub fn base_sleep(&self) -> Duration {
        self.base_sleep
    }

    /// Maximum number of backoff retries per resource/item.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Exponential growth factor between retries.
    pub fn backoff_base(&self) -> f64 {
        self.backoff_base
    }

    /// Client refreshes allowed per run (shared across items).
    pub fn max_client_refreshes(&self) -> u32 {
        self.max_client_refreshes
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_sleep: DEFAULT_BASE_SLEEP,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_client_refreshes: DEFAULT_MAX_CLIENT_REFRESHES,
        }
    }
}

/// Calculate the backoff delay for the given attempt, with jitter.
///
/// The delay grows as `base_sleep * backoff_base^attempt`, plus a uniform
/// jitter in `[0, delay * 0.1)` so synchronized callers do not retry in
/// lockstep.
pub fn backoff_with_jitter(policy: &RetryPolicy, attempt: u32) -> Duration {
    backoff_with_jitter_from(&mut rand::thread_rng(), policy, attempt)
}

/// Deterministic variant taking an explicit random source.
pub fn backoff_with_jitter_from<R: Rng>(rng: &mut R, policy: &RetryPolicy, attempt: u32) -> Duration {
    let sleep = policy.base_sleep().as_secs_f64() * policy.backoff_base().powi(attempt as i32);
    let jitter = rng.gen_range(0.0..sleep * JITTER_FRACTION);
    Duration::try_from_secs_f64(sleep + jitter).unwrap_or(Duration::MAX)
}
