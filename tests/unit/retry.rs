//! Unit tests for the retry coordinator state machine

use async_trait::async_trait;
use marketplace_order_poller::client::{ApiError, ApiResult, ClientRefresher};
use marketplace_order_poller::poller::{
    PollError, Resolution, RetryCoordinator, RetryPolicy, StopReason,
};
use marketplace_order_poller::{Credentials, Marketplace};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Stand-in client; the generation tracks how often it was rebuilt.
#[derive(Debug, PartialEq, Eq)]
struct TestClient {
    generation: u32,
}

/// Refresher that hands out numbered replacement clients.
#[derive(Default)]
struct CountingRefresher {
    calls: AtomicU32,
}

impl CountingRefresher {
    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientRefresher<TestClient> for CountingRefresher {
    async fn refresh(
        &self,
        _credentials: &Credentials,
        _marketplace: Marketplace,
    ) -> ApiResult<TestClient> {
        let generation = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TestClient { generation })
    }
}

/// Refresher whose token exchange always fails.
struct FailingRefresher;

#[async_trait]
impl ClientRefresher<TestClient> for FailingRefresher {
    async fn refresh(
        &self,
        _credentials: &Credentials,
        _marketplace: Marketplace,
    ) -> ApiResult<TestClient> {
        Err(ApiError::new(500, "token service down"))
    }
}

fn fast_policy(max_attempts: u32, max_refreshes: u32) -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(1), max_attempts, 2.0, max_refreshes).unwrap()
}

fn credentials() -> Credentials {
    Credentials::new("client-id", "client-secret", "refresh-token")
}

fn rate_limited() -> ApiError {
    ApiError::new(429, "Request rate exceeded")
}

fn expired() -> ApiError {
    ApiError::new(403, "The security token included in the request is expired")
}

#[tokio::test]
async fn three_retries_then_stop_with_budget_of_three() {
    let policy = fast_policy(3, 3);
    let refresher = CountingRefresher::default();
    let creds = credentials();
    let mut coordinator =
        RetryCoordinator::new(&policy, &refresher, &creds, Marketplace::UnitedStates);

    let mut client = TestClient { generation: 0 };
    for failure in 1..=3 {
        match coordinator.resolve(rate_limited(), client).await.unwrap() {
            Resolution::Retry(same) => client = same,
            Resolution::Stop(reason) => panic!("failure {failure} stopped early: {reason}"),
        }
    }

    // The fourth consecutive rate limit exhausts the budget.
    match coordinator.resolve(rate_limited(), client).await.unwrap() {
        Resolution::Stop(StopReason::RetriesExhausted) => {}
        other => panic!("expected stop, got {other:?}"),
    }
    assert_eq!(refresher.calls(), 0);
}

#[tokio::test]
async fn one_refresh_then_stop_with_budget_of_one() {
    let policy = fast_policy(5, 1);
    let refresher = CountingRefresher::default();
    let creds = credentials();
    let mut coordinator =
        RetryCoordinator::new(&policy, &refresher, &creds, Marketplace::UnitedStates);

    let client = TestClient { generation: 0 };
    let client = match coordinator.resolve(expired(), client).await.unwrap() {
        Resolution::Retry(fresh) => {
            assert_eq!(fresh.generation, 1, "expected a freshly built client");
            fresh
        }
        other => panic!("expected refresh, got {other:?}"),
    };

    match coordinator.resolve(expired(), client).await.unwrap() {
        Resolution::Stop(StopReason::RefreshBudgetExhausted) => {}
        other => panic!("expected stop, got {other:?}"),
    }
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn refresh_does_not_reset_the_attempt_counter() {
    let policy = fast_policy(5, 3);
    let refresher = CountingRefresher::default();
    let creds = credentials();
    let mut coordinator =
        RetryCoordinator::new(&policy, &refresher, &creds, Marketplace::UnitedStates);

    let client = TestClient { generation: 0 };
    let client = match coordinator.resolve(rate_limited(), client).await.unwrap() {
        Resolution::Retry(c) => c,
        other => panic!("expected retry, got {other:?}"),
    };
    assert_eq!(coordinator.state().attempt, 2);

    match coordinator.resolve(expired(), client).await.unwrap() {
        Resolution::Retry(fresh) => assert_eq!(fresh.generation, 1),
        other => panic!("expected refresh, got {other:?}"),
    }
    assert_eq!(coordinator.state().attempt, 2);
    assert_eq!(coordinator.state().client_refreshes, 1);
}

#[tokio::test]
async fn begin_item_resets_attempt_but_keeps_refresh_budget() {
    let policy = fast_policy(5, 3);
    let refresher = CountingRefresher::default();
    let creds = credentials();
    let mut coordinator =
        RetryCoordinator::new(&policy, &refresher, &creds, Marketplace::UnitedStates);

    let client = TestClient { generation: 0 };
    let client = match coordinator.resolve(rate_limited(), client).await.unwrap() {
        Resolution::Retry(c) => c,
        other => panic!("expected retry, got {other:?}"),
    };
    match coordinator.resolve(expired(), client).await.unwrap() {
        Resolution::Retry(_) => {}
        other => panic!("expected refresh, got {other:?}"),
    }

    coordinator.begin_item();
    assert_eq!(coordinator.state().attempt, 1);
    assert_eq!(coordinator.state().client_refreshes, 1);
}

#[tokio::test]
async fn unexpected_failures_are_fatal() {
    let policy = fast_policy(5, 3);
    let refresher = CountingRefresher::default();
    let creds = credentials();
    let mut coordinator =
        RetryCoordinator::new(&policy, &refresher, &creds, Marketplace::UnitedStates);

    let error = ApiError::new(500, "internal error");
    let result = coordinator
        .resolve(error, TestClient { generation: 0 })
        .await;

    match result {
        Err(PollError::Unexpected { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "internal error");
        }
        other => panic!("expected fatal error, got {other:?}"),
    }
}

#[tokio::test]
async fn refresh_failure_is_fatal() {
    let policy = fast_policy(5, 3);
    let refresher = FailingRefresher;
    let creds = credentials();
    let mut coordinator =
        RetryCoordinator::new(&policy, &refresher, &creds, Marketplace::UnitedStates);

    let result = coordinator
        .resolve(expired(), TestClient { generation: 0 })
        .await;

    assert!(matches!(result, Err(PollError::RefreshFailed(_))));
}
