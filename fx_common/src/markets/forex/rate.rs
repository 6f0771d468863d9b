//! # Rate Snapshots and Wire Formats
//!
//! A `RateSnapshot` is one immutable reading for a pair. It is produced from
//! a raw `WireRate` after validation and rounding, and is replaced wholesale
//! by the next snapshot; there are no partial updates.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pair::CurrencyPair;

/// Per-pair indicator of whether the most recent fetch succeeded, is pending,
/// or failed / is inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// A fetch has been requested and has not resolved yet.
    Connecting,
    /// The latest fetch produced a snapshot.
    Connected,
    /// The latest fetch failed, or the pair is paused or not subscribed.
    #[default]
    Disconnected,
}

/// A rate exactly as the upstream or proxy reports it.
///
/// Every field is optional so that a structurally incomplete payload still
/// deserializes and can be rejected with a precise reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRate {
    /// Base currency code.
    pub from: Option<String>,
    /// Quote currency code.
    pub to: Option<String>,
    /// Bid price.
    pub bid: Option<f64>,
    /// Ask price.
    pub ask: Option<f64>,
    /// Mid price.
    pub price: Option<f64>,
    /// Upstream observation time; some deployments name it `timestamp`.
    #[serde(alias = "timestamp")]
    pub time_stamp: Option<String>,
}

/// The `{success, data, error}` envelope returned by the forex proxy, both
/// for single responses and for each server-sent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Whether the proxy considered the request successful.
    #[serde(default)]
    pub success: bool,
    /// Payload on success.
    pub data: Option<T>,
    /// Human-readable failure reason.
    pub error: Option<String>,
}

/// Why a wire rate could not become a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRate {
    /// A required field is absent or empty.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    /// A numeric field is NaN, infinite or out of decimal range.
    #[error("field `{0}` is not a finite number")]
    NotFinite(&'static str),
    /// The payload describes a different pair than the one requested.
    #[error("rate is for {received}, expected {expected}")]
    PairMismatch {
        /// Pair that was requested.
        expected: String,
        /// Pair found in the payload.
        received: String,
    },
}

/// One immutable rate reading for a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// The pair this reading belongs to.
    pub pair: CurrencyPair,
    /// Bid, rounded to the pair's precision.
    pub bid: Decimal,
    /// Ask, rounded to the pair's precision.
    pub ask: Decimal,
    /// Mid price, rounded to the pair's precision.
    pub price: Decimal,
    /// Upstream observation time when it parses as RFC 3339, otherwise the
    /// time the payload was received.
    pub observed_at: DateTime<Utc>,
}

impl RateSnapshot {
    /// Validates a wire rate for `pair` and rounds its prices.
    pub fn from_wire(pair: &CurrencyPair, wire: &WireRate) -> Result<Self, InvalidRate> {
        let from = non_empty(wire.from.as_deref(), "from")?;
        let to = non_empty(wire.to.as_deref(), "to")?;
        let time_stamp = non_empty(wire.time_stamp.as_deref(), "time_stamp")?;

        if from != pair.base() || to != pair.quote() {
            return Err(InvalidRate::PairMismatch {
                expected: pair.to_string(),
                received: format!("{}/{}", from, to),
            });
        }

        let precision = pair.precision();
        let bid = to_decimal(wire.bid, "bid", precision)?;
        let ask = to_decimal(wire.ask, "ask", precision)?;
        let price = to_decimal(wire.price, "price", precision)?;

        let observed_at = DateTime::parse_from_rfc3339(time_stamp)
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            pair: pair.clone(),
            bid,
            ask,
            price,
            observed_at,
        })
    }

    /// Ask minus bid.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Bid formatted at the pair's precision.
    pub fn formatted_bid(&self) -> String {
        format_price(self.bid, self.pair.precision())
    }

    /// Ask formatted at the pair's precision.
    pub fn formatted_ask(&self) -> String {
        format_price(self.ask, self.pair.precision())
    }

    /// Mid price formatted at the pair's precision.
    pub fn formatted_price(&self) -> String {
        format_price(self.price, self.pair.precision())
    }
}

/// Formats `value` with exactly `precision` decimal places, rounding half
/// away from zero. Formatting an already formatted value is a no-op.
pub fn format_price(value: Decimal, precision: u32) -> String {
    let rounded = value.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", precision as usize, rounded)
}

fn non_empty<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, InvalidRate> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(InvalidRate::MissingField(field)),
    }
}

fn to_decimal(value: Option<f64>, field: &'static str, precision: u32) -> Result<Decimal, InvalidRate> {
    let raw = value.ok_or(InvalidRate::MissingField(field))?;
    if !raw.is_finite() {
        return Err(InvalidRate::NotFinite(field));
    }
    let decimal = Decimal::from_f64(raw).ok_or(InvalidRate::NotFinite(field))?;
    Ok(decimal.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero))
}
