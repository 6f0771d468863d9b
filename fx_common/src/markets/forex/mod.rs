//! # Forex Market Models
//!
//! Types shared by every component that touches a currency pair:
//!
//! - **`pair`**: `CurrencyPair` ("BASE/QUOTE") and the `SupportedPairs`
//!   allow-list fixed at startup.
//! - **`rate`**: `RateSnapshot`, `ConnectionState`, the raw wire rate and the
//!   `{success, data, error}` envelope, plus precision-aware formatting.
//! - **`currency`**: display names and symbols for currency codes.

/// Display names and symbols for currency codes.
pub mod currency;
/// Currency pairs and the supported pair allow-list.
pub mod pair;
/// Rate snapshots, connection state and wire formats.
pub mod rate;

pub use currency::{currency_name, currency_symbol};
pub use pair::{
    CurrencyPair, PairParseError, SupportedPairs, DEFAULT_WATCHLIST_PAIRS, SUPPORTED_PAIRS,
};
pub use rate::{format_price, ApiEnvelope, ConnectionState, InvalidRate, RateSnapshot, WireRate};
