//! Shared fakes for the integration tests: a scripted rate source, a
//! hand-cranked scheduler, a key-value store that can be told to fail, and a
//! local axum stand-in for the forex proxy and provider.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use fx_common::core::{ScheduleHandle, Scheduler, Tick, TickFuture};
use fx_common::markets::forex::WireRate;
use fx_common::watchlist::{KeyValueStore, MemoryKeyValueStore, StorageError};
use fx_common::{CurrencyPair, FetchError, RateSnapshot, RateSource};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A valid snapshot for `pair` around `price`.
pub fn sample_snapshot(pair: &CurrencyPair, price: f64) -> RateSnapshot {
    let wire = WireRate {
        from: Some(pair.base().to_string()),
        to: Some(pair.quote().to_string()),
        bid: Some(price - 0.0002),
        ask: Some(price + 0.0002),
        price: Some(price),
        time_stamp: Some("2024-05-01T12:00:00Z".to_string()),
    };
    match RateSnapshot::from_wire(pair, &wire) {
        Ok(snapshot) => snapshot,
        Err(e) => panic!("sample snapshot for {} is invalid: {}", pair, e),
    }
}

/// Parses a pair literal.
pub fn pair(raw: &str) -> CurrencyPair {
    match raw.parse() {
        Ok(pair) => pair,
        Err(e) => panic!("bad pair literal {}: {}", raw, e),
    }
}

#[derive(Default)]
struct ScriptState {
    queued: HashMap<CurrencyPair, VecDeque<Result<RateSnapshot, FetchError>>>,
    calls: HashMap<CurrencyPair, Vec<Instant>>,
}

/// `RateSource` answering from per-pair scripts. Once a script runs dry it
/// answers with a valid snapshot.
#[derive(Default)]
pub struct ScriptedRateSource {
    state: Mutex<ScriptState>,
    delay: Mutex<Duration>,
}

impl ScriptedRateSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the next answer for `pair`.
    pub fn push(&self, pair: &CurrencyPair, outcome: Result<RateSnapshot, FetchError>) {
        let mut state = self.state.lock().unwrap();
        state.queued.entry(pair.clone()).or_default().push_back(outcome);
    }

    /// Makes every fetch take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Number of fetches started for `pair`.
    pub fn calls(&self, pair: &CurrencyPair) -> usize {
        self.call_times(pair).len()
    }

    /// When each fetch for `pair` started.
    pub fn call_times(&self, pair: &CurrencyPair) -> Vec<Instant> {
        self.state.lock().unwrap().calls.get(pair).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RateSource for ScriptedRateSource {
    async fn fetch(&self, pair: &CurrencyPair) -> Result<RateSnapshot, FetchError> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.calls.entry(pair.clone()).or_default().push(Instant::now());
            state.queued.get_mut(pair).and_then(|queue| queue.pop_front())
        };
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome.unwrap_or_else(|| Ok(sample_snapshot(pair, 1.2345)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ManualSchedule {
    pair: CurrencyPair,
    interval: Duration,
    tick: Tick,
    token: CancellationToken,
}

/// `Scheduler` that never runs anything by itself; tests fire ticks.
#[derive(Default)]
pub struct ManualScheduler {
    schedules: Mutex<Vec<ManualSchedule>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Schedules ever started.
    pub fn started(&self) -> usize {
        self.schedules.lock().unwrap().len()
    }

    /// Schedules for `pair` that are not cancelled.
    pub fn live(&self, pair: &CurrencyPair) -> usize {
        self.schedules
            .lock()
            .unwrap()
            .iter()
            .filter(|s| &s.pair == pair && !s.token.is_cancelled())
            .count()
    }

    /// Interval of the latest schedule for `pair`.
    pub fn interval(&self, pair: &CurrencyPair) -> Option<Duration> {
        self.schedules
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| &s.pair == pair)
            .map(|s| s.interval)
    }

    /// Tick future of the latest schedule for `pair`, cancelled or not.
    pub fn fire(&self, pair: &CurrencyPair) -> Option<TickFuture> {
        let schedules = self.schedules.lock().unwrap();
        schedules.iter().rev().find(|s| &s.pair == pair).map(|s| (s.tick)())
    }
}

impl Scheduler for ManualScheduler {
    fn start(&self, pair: &CurrencyPair, interval: Duration, tick: Tick) -> ScheduleHandle {
        let token = CancellationToken::new();
        self.schedules.lock().unwrap().push(ManualSchedule {
            pair: pair.clone(),
            interval,
            tick,
            token: token.clone(),
        });
        ScheduleHandle::new(pair.clone(), token)
    }
}

/// In-memory store whose reads and writes can be made to fail.
#[derive(Default)]
pub struct FailingKeyValueStore {
    inner: MemoryKeyValueStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingKeyValueStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.peek(key)
    }
}

#[async_trait]
impl KeyValueStore for FailingKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("reads disabled".into()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".into()));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }
}

/// One scripted answer of the mock server.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Status and JSON body.
    Json(u16, String),
    /// `text/event-stream` body with one `data:` event per payload, then close.
    Events(Vec<String>),
    /// Never answers within any sensible timeout.
    Hang,
}

/// A request the mock server received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Option<String>,
    pub token: Option<String>,
}

#[derive(Clone, Default)]
struct MockState {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    fallback: Arc<Mutex<Option<MockReply>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Local HTTP server answering every path from a reply script.
pub struct MockForexServer {
    base_url: String,
    state: MockState,
    shutdown: CancellationToken,
}

impl MockForexServer {
    pub async fn start() -> anyhow::Result<Self> {
        let state = MockState::default();
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await;
        });

        Ok(Self {
            base_url: format!("http://{}", addr),
            state,
            shutdown,
        })
    }

    /// `http://127.0.0.1:<port>` followed by `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Queues the next answer.
    pub fn reply(&self, reply: MockReply) {
        self.state.replies.lock().unwrap().push_back(reply);
    }

    /// Answer used once the queue is empty.
    pub fn reply_always(&self, reply: MockReply) {
        *self.state.fallback.lock().unwrap() = Some(reply);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for MockForexServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(
    axum::extract::State(state): axum::extract::State<MockState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.requests.lock().unwrap().push(RecordedRequest {
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        token: headers
            .get("token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let reply = {
        let queued = state.replies.lock().unwrap().pop_front();
        queued.or_else(|| state.fallback.lock().unwrap().clone())
    };

    match reply {
        Some(MockReply::Json(status, body)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Some(MockReply::Events(events)) => {
            let body: String = events.iter().map(|e| format!("data: {}\n\n", e)).collect();
            (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
        Some(MockReply::Hang) => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
        None => (StatusCode::NOT_FOUND, "no scripted reply").into_response(),
    }
}

/// Proxy envelope for a successful rate.
pub fn envelope_ok(pair: &CurrencyPair, bid: f64, ask: f64, price: f64) -> String {
    serde_json::json!({
        "success": true,
        "data": {
            "from": pair.base(),
            "to": pair.quote(),
            "bid": bid,
            "ask": ask,
            "price": price,
            "time_stamp": "2024-05-01T12:00:00Z",
        }
    })
    .to_string()
}

/// Proxy envelope for a failure.
pub fn envelope_err(message: &str) -> String {
    serde_json::json!({ "success": false, "error": message }).to_string()
}
