//! # Subscription Registry
//!
//! The rate cache and reference-counted subscription table. Consumers call
//! `subscribe`/`unsubscribe` in pairs; the first reference to a pair starts a
//! polling schedule and the last one tears it down together with the cached
//! data. Reads go through `snapshot`, or through the `RateEvent` broadcast
//! for consumers that prefer to be notified.
//!
//! Pausing is tracked per reason. `pause_all`/`resume_all` drive the global
//! flag used by the lifecycle controller; `pause`/`resume` drive a per-pair
//! manual flag. A pair polls iff it has references, the manager is not
//! globally paused and the pair is not manually paused.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::scheduler::{NextTick, ScheduleHandle, Scheduler, Tick, TickFuture};
use crate::ingestors::{Cadence, FetchError, FetchErrorKind, PollTarget, PollTicket, PollingDriver};
use crate::markets::forex::{ConnectionState, CurrencyPair, RateSnapshot};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What a consumer sees for one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateView {
    /// Latest snapshot, kept across failures until the pair is unsubscribed.
    pub data: Option<RateSnapshot>,
    /// True while no snapshot has arrived since the last (re)connect.
    pub loading: bool,
    /// User-facing message of the latest failure.
    pub error: Option<String>,
    /// Classification of the latest failure.
    pub error_kind: Option<FetchErrorKind>,
    /// Connection indicator.
    pub connection_state: ConnectionState,
}

impl RateView {
    fn unsubscribed() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            error_kind: None,
            connection_state: ConnectionState::Disconnected,
        }
    }
}

/// Published whenever the observable state of a pair changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateEvent {
    /// Pair that changed.
    pub pair: CurrencyPair,
    /// Its state after the change.
    pub view: RateView,
}

struct SubscriptionEntry {
    ref_count: u32,
    connection_state: ConnectionState,
    last_error: Option<FetchError>,
    last_snapshot: Option<RateSnapshot>,
    received_since_connect: bool,
    cadence: Cadence,
    manual_pause: bool,
    generation: u64,
    handle: Option<ScheduleHandle>,
}

impl SubscriptionEntry {
    fn new() -> Self {
        Self {
            ref_count: 0,
            connection_state: ConnectionState::Disconnected,
            last_error: None,
            last_snapshot: None,
            received_since_connect: false,
            cadence: Cadence::Normal,
            manual_pause: false,
            generation: 0,
            handle: None,
        }
    }

    fn view(&self) -> RateView {
        RateView {
            data: self.last_snapshot.clone(),
            loading: !self.received_since_connect,
            error: self.last_error.as_ref().map(|e| e.message.clone()),
            error_kind: self.last_error.as_ref().map(|e| e.kind),
            connection_state: self.connection_state,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<CurrencyPair, SubscriptionEntry>,
    global_paused: bool,
}

struct Shared {
    state: Mutex<RegistryState>,
    generations: AtomicU64,
    scheduler: Arc<dyn Scheduler>,
    driver: PollingDriver,
    events: broadcast::Sender<RateEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callers hold the state lock, so events go out in the order the
    /// changes were made.
    fn publish(&self, pair: &CurrencyPair, view: RateView) {
        // No receivers is fine.
        let _ = self.events.send(RateEvent {
            pair: pair.clone(),
            view,
        });
    }
}

impl PollTarget for Shared {
    fn is_live(&self, ticket: &PollTicket) -> bool {
        let state = self.lock();
        state
            .entries
            .get(&ticket.pair)
            .map(|e| e.handle.is_some() && e.generation == ticket.generation)
            .unwrap_or(false)
    }

    fn apply(&self, ticket: &PollTicket, outcome: Result<RateSnapshot, FetchError>) -> Option<Cadence> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(&ticket.pair)?;
        if entry.handle.is_none() || entry.generation != ticket.generation {
            return None;
        }

        match outcome {
            Ok(snapshot) => {
                entry.last_snapshot = Some(snapshot);
                entry.received_since_connect = true;
                entry.last_error = None;
                entry.connection_state = ConnectionState::Connected;
            }
            Err(e) => {
                if e.is_quota() && entry.cadence != Cadence::QuotaBackoff {
                    warn!(pair = %ticket.pair, "Quota exceeded, backing off");
                    entry.cadence = Cadence::QuotaBackoff;
                }
                entry.last_error = Some(e);
                entry.connection_state = ConnectionState::Disconnected;
            }
        }

        let cadence = entry.cadence;
        self.publish(&ticket.pair, entry.view());
        Some(cadence)
    }
}

/// Reference-counted rate subscriptions over a `PollingDriver`.
///
/// Cloning is cheap and every clone shares the same table.
#[derive(Clone)]
pub struct SubscriptionManager {
    shared: Arc<Shared>,
}

impl SubscriptionManager {
    /// Creates an empty manager. Polling schedules go through `scheduler`.
    pub fn new(driver: PollingDriver, scheduler: Arc<dyn Scheduler>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState::default()),
                generations: AtomicU64::new(0),
                scheduler,
                driver,
                events,
            }),
        }
    }

    /// Adds one reference to `pair`. The first reference starts polling.
    pub fn subscribe(&self, pair: &CurrencyPair) {
        let mut state = self.shared.lock();
        let global_paused = state.global_paused;
        let entry = state.entries.entry(pair.clone()).or_insert_with(SubscriptionEntry::new);
        entry.ref_count += 1;
        debug!(pair = %pair, ref_count = entry.ref_count, "Subscribed");

        if entry.ref_count > 1 {
            return;
        }

        if global_paused {
            debug!(pair = %pair, "Subscribed while paused, polling deferred");
            entry.connection_state = ConnectionState::Disconnected;
        } else {
            self.start_polling(pair, entry);
        }
        self.shared.publish(pair, entry.view());
    }

    /// Drops one reference to `pair`. Clamped at zero. The last reference
    /// stops polling and discards the cached state.
    pub fn unsubscribe(&self, pair: &CurrencyPair) {
        let mut state = self.shared.lock();
        let Some(entry) = state.entries.get_mut(pair) else {
            debug!(pair = %pair, "Unsubscribe without subscription ignored");
            return;
        };

        entry.ref_count = entry.ref_count.saturating_sub(1);
        debug!(pair = %pair, ref_count = entry.ref_count, "Unsubscribed");
        if entry.ref_count > 0 {
            return;
        }

        if let Some(mut entry) = state.entries.remove(pair) {
            self.stop_polling(&mut entry);
        }
        info!(pair = %pair, "Stopped polling, no subscribers left");
        self.shared.publish(pair, RateView::unsubscribed());
    }

    /// Current state of `pair`. Never mutates anything.
    pub fn snapshot(&self, pair: &CurrencyPair) -> RateView {
        let state = self.shared.lock();
        state
            .entries
            .get(pair)
            .map(SubscriptionEntry::view)
            .unwrap_or_else(RateView::unsubscribed)
    }

    /// Clears the error and any quota backoff for `pair` and, unless it is
    /// paused, restarts polling with an immediate fetch.
    pub fn reconnect(&self, pair: &CurrencyPair) {
        let mut state = self.shared.lock();
        let global_paused = state.global_paused;
        let Some(entry) = state.entries.get_mut(pair) else {
            debug!(pair = %pair, "Reconnect without subscription ignored");
            return;
        };

        entry.last_error = None;
        entry.cadence = Cadence::Normal;
        if global_paused || entry.manual_pause {
            debug!(pair = %pair, "Reconnect while paused, fetch deferred until resume");
        } else {
            info!(pair = %pair, "Reconnecting");
            self.stop_polling(entry);
            self.start_polling(pair, entry);
        }
        self.shared.publish(pair, entry.view());
    }

    /// Halts polling for every subscribed pair. References are kept.
    pub fn pause_all(&self) {
        let mut state = self.shared.lock();
        if state.global_paused {
            return;
        }
        state.global_paused = true;
        info!(pairs = state.entries.len(), "Pausing all subscriptions");

        for (pair, entry) in state.entries.iter_mut() {
            self.stop_polling(entry);
            entry.connection_state = ConnectionState::Disconnected;
            self.shared.publish(pair, entry.view());
        }
    }

    /// Lifts the global pause and restarts every pair that is not manually
    /// paused, each with an immediate fetch.
    pub fn resume_all(&self) {
        let mut state = self.shared.lock();
        if !state.global_paused {
            return;
        }
        state.global_paused = false;
        info!(pairs = state.entries.len(), "Resuming subscriptions");

        for (pair, entry) in state.entries.iter_mut() {
            if entry.manual_pause {
                debug!(pair = %pair, "Left manually paused");
                continue;
            }
            self.start_polling(pair, entry);
            self.shared.publish(pair, entry.view());
        }
    }

    /// Manually pauses one subscribed pair. Only `resume` lifts it.
    pub fn pause(&self, pair: &CurrencyPair) {
        let mut state = self.shared.lock();
        let Some(entry) = state.entries.get_mut(pair) else {
            debug!(pair = %pair, "Pause without subscription ignored");
            return;
        };
        if entry.manual_pause {
            return;
        }
        entry.manual_pause = true;
        self.stop_polling(entry);
        entry.connection_state = ConnectionState::Disconnected;
        info!(pair = %pair, "Paused");
        self.shared.publish(pair, entry.view());
    }

    /// Lifts a manual pause. Polling restarts unless the manager is globally
    /// paused.
    pub fn resume(&self, pair: &CurrencyPair) {
        let mut state = self.shared.lock();
        let global_paused = state.global_paused;
        let Some(entry) = state.entries.get_mut(pair) else {
            debug!(pair = %pair, "Resume without subscription ignored");
            return;
        };
        if !entry.manual_pause {
            return;
        }
        entry.manual_pause = false;
        if global_paused {
            debug!(pair = %pair, "Manual pause lifted, still globally paused");
        } else {
            info!(pair = %pair, "Resumed");
            self.start_polling(pair, entry);
        }
        self.shared.publish(pair, entry.view());
    }

    /// Live reference count of `pair`.
    pub fn ref_count(&self, pair: &CurrencyPair) -> u32 {
        self.shared.lock().entries.get(pair).map(|e| e.ref_count).unwrap_or(0)
    }

    /// True while `pair` has a running polling schedule.
    pub fn is_polling(&self, pair: &CurrencyPair) -> bool {
        self.shared
            .lock()
            .entries
            .get(pair)
            .map(|e| e.handle.is_some())
            .unwrap_or(false)
    }

    /// Global pause flag.
    pub fn is_paused(&self) -> bool {
        self.shared.lock().global_paused
    }

    /// True if `pair` carries a manual pause.
    pub fn is_manually_paused(&self, pair: &CurrencyPair) -> bool {
        self.shared
            .lock()
            .entries
            .get(pair)
            .map(|e| e.manual_pause)
            .unwrap_or(false)
    }

    /// Pairs with at least one reference, sorted.
    pub fn active_pairs(&self) -> Vec<CurrencyPair> {
        let mut pairs: Vec<CurrencyPair> = self.shared.lock().entries.keys().cloned().collect();
        pairs.sort();
        pairs
    }

    /// New receiver for state change notifications.
    pub fn events(&self) -> broadcast::Receiver<RateEvent> {
        self.shared.events.subscribe()
    }

    fn start_polling(&self, pair: &CurrencyPair, entry: &mut SubscriptionEntry) {
        let generation = self.shared.generations.fetch_add(1, Ordering::Relaxed) + 1;
        entry.generation = generation;
        entry.connection_state = ConnectionState::Connecting;
        entry.received_since_connect = false;

        let ticket = PollTicket {
            pair: pair.clone(),
            generation,
        };
        let weak = Arc::downgrade(&self.shared);
        let tick: Tick = Arc::new(move || -> TickFuture {
            let weak = weak.clone();
            let ticket = ticket.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(shared) => shared.driver.run_cycle(&*shared, &ticket).await,
                    None => NextTick::Stop,
                }
            })
        });

        let interval = self.shared.driver.interval_for(Cadence::Normal);
        debug!(pair = %pair, generation, interval_ms = interval.as_millis() as u64, "Starting polling");
        entry.handle = Some(self.shared.scheduler.start(pair, interval, tick));
    }

    fn stop_polling(&self, entry: &mut SubscriptionEntry) {
        if let Some(handle) = entry.handle.take() {
            self.shared.scheduler.cancel(handle);
        }
    }
}
