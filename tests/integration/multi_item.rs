//! Integration tests for multi-item (per-order) pagination runs

use async_trait::async_trait;
use marketplace_order_poller::client::{ApiError, ApiResult, ClientRefresher, Page, PageToken};
use marketplace_order_poller::poller::{
    Completion, PerItemFetcher, PollError, Poller, ProgressObserver, RetryPolicy, StopReason,
};
use marketplace_order_poller::{Credentials, Marketplace};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug)]
struct TestClient;

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
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TestClient)
    }
}

/// Per-item fetcher replaying a scripted response queue per parent id and
/// recording which items were touched, in order.
struct PerItemScript {
    responses: Mutex<HashMap<String, VecDeque<ApiResult<Page<String>>>>>,
    touched: Mutex<Vec<String>>,
}

impl PerItemScript {
    fn new(scripts: Vec<(&str, Vec<ApiResult<Page<String>>>)>) -> Self {
        let responses = scripts
            .into_iter()
            .map(|(id, script)| (id.to_string(), script.into()))
            .collect();
        Self {
            responses: Mutex::new(responses),
            touched: Mutex::new(Vec::new()),
        }
    }

    fn touched(&self) -> Vec<String> {
        self.touched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PerItemFetcher<TestClient> for PerItemScript {
    type Record = String;

    async fn fetch_page(
        &self,
        item_id: &str,
        _client: &TestClient,
        _token: Option<&PageToken>,
    ) -> ApiResult<Page<String>> {
        self.touched.lock().unwrap().push(item_id.to_string());
        self.responses
            .lock()
            .unwrap()
            .get_mut(item_id)
            .unwrap_or_else(|| panic!("no script for item {item_id}"))
            .pop_front()
            .unwrap_or_else(|| panic!("script exhausted for item {item_id}"))
    }
}

/// Observer capturing every notification as a plain string.
#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_item_complete(&self, completed: usize, total: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("complete {completed}/{total}"));
    }

    fn on_abort(&self, completed: usize, total: usize, reason: StopReason) {
        self.events
            .lock()
            .unwrap()
            .push(format!("abort {completed}/{total}: {reason}"));
    }
}

fn page(records: &[&str], token: Option<&str>) -> ApiResult<Page<String>> {
    Ok(Page::new(
        records.iter().map(|r| r.to_string()).collect(),
        token.map(PageToken::new),
    ))
}

fn rate_limited() -> ApiResult<Page<String>> {
    Err(ApiError::new(429, "Request rate exceeded"))
}

fn expired() -> ApiResult<Page<String>> {
    Err(ApiError::new(403, "security token expired"))
}

fn fast_policy(max_attempts: u32, max_refreshes: u32) -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(1), max_attempts, 2.0, max_refreshes).unwrap()
}

fn credentials() -> Credentials {
    Credentials::new("client-id", "client-secret", "refresh-token")
}

fn items(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn stop_aborts_run_and_keeps_completed_items_only() {
    // X succeeds, Y exhausts its retries, Z must never be attempted.
    let fetcher = PerItemScript::new(vec![
        ("X", vec![page(&["x1", "x2"], None)]),
        ("Y", vec![rate_limited(), rate_limited(), rate_limited()]),
        ("Z", vec![page(&["z1"], None)]),
    ]);
    let refresher = CountingRefresher::default();
    let observer = RecordingObserver::default();
    let creds = credentials();
    let poller = Poller::new(&creds, Marketplace::UnitedStates, &refresher)
        .with_policy(fast_policy(2, 3))
        .with_observer(&observer);

    let mut records = Vec::new();
    let completion = poller
        .fetch_all_for_items(&items(&["X", "Y", "Z"]), TestClient, &fetcher, &mut records)
        .await
        .unwrap();

    assert_eq!(
        completion,
        Completion::PartialFailure {
            completed_items: 1,
            total_items: 3,
            reason: StopReason::RetriesExhausted,
        }
    );
    assert_eq!(records, vec!["x1", "x2"]);
    assert!(
        !fetcher.touched().iter().any(|id| id == "Z"),
        "Z must not be attempted after the abort"
    );
    assert_eq!(
        observer.events(),
        vec![
            "complete 1/3".to_string(),
            "abort 1/3: retries exhausted".to_string()
        ]
    );
}

#[tokio::test]
async fn fatal_error_propagates_but_preserves_the_aggregate() {
    // Y fails fatally on its second page; X's records must survive in the
    // caller-owned buffer, Y's first page must not.
    let fetcher = PerItemScript::new(vec![
        ("X", vec![page(&["x1"], None)]),
        (
            "Y",
            vec![
                page(&["y1"], Some("tok")),
                Err(ApiError::new(500, "internal error")),
            ],
        ),
    ]);
    let refresher = CountingRefresher::default();
    let creds = credentials();
    let poller = Poller::new(&creds, Marketplace::UnitedStates, &refresher)
        .with_policy(fast_policy(2, 3));

    let mut records = Vec::new();
    let result = poller
        .fetch_all_for_items(&items(&["X", "Y"]), TestClient, &fetcher, &mut records)
        .await;

    assert!(matches!(
        result,
        Err(PollError::Unexpected { status: 500, .. })
    ));
    assert_eq!(records, vec!["x1"], "committed records must survive a fatal");
}

#[tokio::test]
async fn refresh_budget_is_shared_across_items() {
    // X consumes the single refresh; Y's expiry then stops the whole run.
    let fetcher = PerItemScript::new(vec![
        ("X", vec![expired(), page(&["x1"], None)]),
        ("Y", vec![expired()]),
    ]);
    let refresher = CountingRefresher::default();
    let creds = credentials();
    let poller = Poller::new(&creds, Marketplace::UnitedStates, &refresher)
        .with_policy(fast_policy(5, 1));

    let mut records = Vec::new();
    let completion = poller
        .fetch_all_for_items(&items(&["X", "Y"]), TestClient, &fetcher, &mut records)
        .await
        .unwrap();

    assert_eq!(
        completion,
        Completion::PartialFailure {
            completed_items: 1,
            total_items: 2,
            reason: StopReason::RefreshBudgetExhausted,
        }
    );
    assert_eq!(records, vec!["x1"]);
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn attempt_counter_resets_for_each_item() {
    // One retry allowed per item; both items need exactly one, so the run
    // only completes if the counter resets between items.
    let fetcher = PerItemScript::new(vec![
        ("X", vec![rate_limited(), page(&["x1"], None)]),
        ("Y", vec![rate_limited(), page(&["y1"], None)]),
    ]);
    let refresher = CountingRefresher::default();
    let creds = credentials();
    let poller = Poller::new(&creds, Marketplace::UnitedStates, &refresher)
        .with_policy(fast_policy(1, 3));

    let mut records = Vec::new();
    let completion = poller
        .fetch_all_for_items(&items(&["X", "Y"]), TestClient, &fetcher, &mut records)
        .await
        .unwrap();

    assert_eq!(completion, Completion::Complete);
    assert_eq!(records, vec!["x1", "y1"]);
}

#[tokio::test]
async fn multi_page_items_aggregate_in_order() {
    let fetcher = PerItemScript::new(vec![
        ("X", vec![page(&["x1"], Some("next")), page(&["x2"], None)]),
        ("Y", vec![page(&[], None)]),
        ("Z", vec![page(&["z1"], None)]),
    ]);
    let refresher = CountingRefresher::default();
    let observer = RecordingObserver::default();
    let creds = credentials();
    let poller = Poller::new(&creds, Marketplace::UnitedStates, &refresher)
        .with_policy(fast_policy(2, 3))
        .with_observer(&observer);

    let mut records = Vec::new();
    let completion = poller
        .fetch_all_for_items(&items(&["X", "Y", "Z"]), TestClient, &fetcher, &mut records)
        .await
        .unwrap();

    assert_eq!(completion, Completion::Complete);
    assert!(completion.is_complete());
    assert_eq!(records, vec!["x1", "x2", "z1"]);
    assert_eq!(
        observer.events(),
        vec![
            "complete 1/3".to_string(),
            "complete 2/3".to_string(),
            "complete 3/3".to_string()
        ]
    );
}
