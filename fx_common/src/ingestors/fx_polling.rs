//! # Forex Polling Driver
//!
//! A self-scheduling poller for pairs whose rate source has no push channel.
//! Each cycle performs one bounded fetch, classifies the outcome and tells
//! the scheduler how long to wait before the next cycle.
//!
//! ## Key Design Principles:
//! - **One fetch in flight per pair**: a cycle awaits its fetch before the
//!   scheduler arms the next delay, so fetches for a pair never overlap.
//! - **Dynamic intervals**: the driver picks the next delay after each cycle.
//!   A quota failure switches the pair to the long backoff cadence, which
//!   sticks until the owner restarts polling (reconnect or resubscribe).
//! - **No stale writes**: results are handed to a `PollTarget` together with
//!   the `PollTicket` the cycle was started under. The target refuses tickets
//!   that no longer match a live subscription and the driver stops the loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use super::fetch_error::FetchError;
use crate::core::scheduler::NextTick;
use crate::markets::forex::{CurrencyPair, RateSnapshot};

/// Default delay between polls of one pair.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Delay used after a quota failure.
pub const DEFAULT_QUOTA_BACKOFF: Duration = Duration::from_secs(5 * 60);
/// Upper bound on one fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);

/// Something that can produce the current rate for a pair.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Performs one fetch. Implementations must not retry internally.
    async fn fetch(&self, pair: &CurrencyPair) -> Result<RateSnapshot, FetchError>;

    /// Short label used in logs.
    fn name(&self) -> &str {
        "rate-source"
    }
}

/// Timing knobs for the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingSettings {
    /// Delay between polls under normal operation.
    pub interval: Duration,
    /// Delay between polls after a quota failure.
    pub quota_backoff: Duration,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            quota_backoff: DEFAULT_QUOTA_BACKOFF,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Which interval a pair is polled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cadence {
    /// `PollingSettings::interval`.
    #[default]
    Normal,
    /// `PollingSettings::quota_backoff`.
    QuotaBackoff,
}

/// Identifies the subscription a cycle was started for.
///
/// `generation` changes every time the owner (re)starts polling a pair, so a
/// result from an older polling run can be told apart from a current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    /// Pair being polled.
    pub pair: CurrencyPair,
    /// Polling run this cycle belongs to.
    pub generation: u64,
}

/// The owner of per-pair state that cycle results are written into.
pub trait PollTarget: Send + Sync {
    /// True while `ticket` still matches an active, unpaused subscription.
    fn is_live(&self, ticket: &PollTicket) -> bool;

    /// Records the outcome of a cycle. Returns the cadence to continue at, or
    /// `None` when the ticket is stale and the outcome was discarded.
    fn apply(&self, ticket: &PollTicket, outcome: Result<RateSnapshot, FetchError>) -> Option<Cadence>;
}

/// Performs fetch-and-classify cycles against a `RateSource`.
pub struct PollingDriver {
    source: Arc<dyn RateSource>,
    settings: PollingSettings,
}

impl PollingDriver {
    /// Creates a driver over `source`.
    pub fn new(source: Arc<dyn RateSource>, settings: PollingSettings) -> Self {
        Self { source, settings }
    }

    /// The driver's timing knobs.
    pub fn settings(&self) -> &PollingSettings {
        &self.settings
    }

    /// Delay between cycles for `cadence`.
    pub fn interval_for(&self, cadence: Cadence) -> Duration {
        match cadence {
            Cadence::Normal => self.settings.interval,
            Cadence::QuotaBackoff => self.settings.quota_backoff,
        }
    }

    /// One fetch bounded by the configured timeout. Expiry drops the request
    /// and is reported as a connection failure.
    pub async fn fetch(&self, pair: &CurrencyPair) -> Result<RateSnapshot, FetchError> {
        match tokio::time::timeout(self.settings.fetch_timeout, self.source.fetch(pair)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::timeout()),
        }
    }

    /// Runs one polling cycle for `ticket` and decides when the next one runs.
    pub async fn run_cycle(&self, target: &dyn PollTarget, ticket: &PollTicket) -> NextTick {
        if !target.is_live(ticket) {
            trace!(pair = %ticket.pair, generation = ticket.generation, "Skipping cycle for inactive subscription");
            return NextTick::Stop;
        }

        let started = Instant::now();
        let outcome = self.fetch(&ticket.pair).await;
        match &outcome {
            Ok(snapshot) => debug!(
                pair = %ticket.pair,
                source = self.source.name(),
                price = %snapshot.price,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Fetched rate"
            ),
            Err(e) => warn!(
                pair = %ticket.pair,
                source = self.source.name(),
                kind = ?e.kind,
                status = ?e.status,
                "Rate fetch failed: {}",
                e
            ),
        }

        match target.apply(ticket, outcome) {
            None => {
                debug!(pair = %ticket.pair, generation = ticket.generation, "Discarded result for stale subscription");
                NextTick::Stop
            }
            Some(Cadence::Normal) => NextTick::Scheduled,
            Some(cadence @ Cadence::QuotaBackoff) => NextTick::After(self.interval_for(cadence)),
        }
    }
}
