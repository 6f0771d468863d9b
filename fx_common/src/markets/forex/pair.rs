//! # Currency Pairs
//!
//! A `CurrencyPair` is an ordered (base, quote) combination such as USD/JPY.
//! Its canonical string form is `BASE/QUOTE`; persisted watchlist entries
//! carry it both as that string and as a `{base, quote}` object.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between base and quote in the canonical string form.
pub const PAIR_SEPARATOR: char = '/';

/// Number of decimal places used for ordinary pairs.
pub const DEFAULT_PRECISION: u32 = 5;

/// Currencies quoted without minor units.
const ZERO_MINOR_UNIT_CURRENCIES: [&str; 1] = ["JPY"];

/// Pairs the forex service is known to support, in display order.
pub const SUPPORTED_PAIRS: [&str; 9] = [
    "USD/JPY", "EUR/USD", "GBP/USD", "AUD/USD", "USD/CAD", "USD/CHF", "USD/CNY", "EUR/JPY",
    "GBP/JPY",
];

/// Pairs seeded into an empty watchlist on first run.
pub const DEFAULT_WATCHLIST_PAIRS: [&str; 5] = ["USD/JPY", "EUR/USD", "GBP/USD", "AUD/USD", "USD/CAD"];

/// Errors produced while parsing a `BASE/QUOTE` string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairParseError {
    /// The string is not two non-empty codes joined by a single `/`.
    #[error("Invalid currency pair format: {0}. Use format like USD/JPY")]
    Format(String),
}

/// An ordered pair of currency codes.
///
/// Fields are private so a constructed pair can't be edited into an
/// inconsistent state; build a new one instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    base: String,
    quote: String,
}

impl CurrencyPair {
    /// Builds a pair from its two codes.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Result<Self, PairParseError> {
        let base = base.into();
        let quote = quote.into();
        if !is_code(&base) || !is_code(&quote) {
            return Err(PairParseError::Format(format!("{}{}{}", base, PAIR_SEPARATOR, quote)));
        }
        Ok(Self { base, quote })
    }

    /// The base currency code.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The quote currency code.
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// The pair with the separator removed (`USD/JPY` -> `USDJPY`), as the
    /// upstream provider expects it.
    pub fn api_symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Decimal places used when rounding and formatting rates of this pair.
    pub fn precision(&self) -> u32 {
        let no_minor_units = ZERO_MINOR_UNIT_CURRENCIES
            .iter()
            .any(|code| *code == self.base || *code == self.quote);
        if no_minor_units {
            0
        } else {
            DEFAULT_PRECISION
        }
    }
}

fn is_code(code: &str) -> bool {
    !code.is_empty() && !code.contains(PAIR_SEPARATOR) && !code.chars().any(char::is_whitespace)
}

impl FromStr for CurrencyPair {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once(PAIR_SEPARATOR)
            .ok_or_else(|| PairParseError::Format(s.to_string()))?;
        Self::new(base, quote).map_err(|_| PairParseError::Format(s.to_string()))
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base, PAIR_SEPARATOR, self.quote)
    }
}

/// The process-wide allow-list of pairs rates may be fetched for.
///
/// Built once at startup and shared read-only afterwards. Iteration order is
/// the order the pairs were supplied in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedPairs {
    pairs: Vec<CurrencyPair>,
}

impl SupportedPairs {
    /// Builds the allow-list, dropping repeated pairs but keeping first-seen order.
    pub fn new<I, S>(pairs: I) -> Result<Self, PairParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed: Vec<CurrencyPair> = Vec::new();
        for raw in pairs {
            let pair: CurrencyPair = raw.as_ref().parse()?;
            if !parsed.contains(&pair) {
                parsed.push(pair);
            }
        }
        Ok(Self { pairs: parsed })
    }

    /// True when `pair_string` parses to a pair on the allow-list.
    pub fn contains(&self, pair_string: &str) -> bool {
        pair_string
            .parse::<CurrencyPair>()
            .map(|pair| self.contains_pair(&pair))
            .unwrap_or(false)
    }

    /// True when `pair` is on the allow-list.
    pub fn contains_pair(&self, pair: &CurrencyPair) -> bool {
        self.pairs.contains(pair)
    }

    /// Iterates the allow-list in its defined order.
    pub fn iter(&self) -> impl Iterator<Item = &CurrencyPair> {
        self.pairs.iter()
    }

    /// Number of supported pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when nothing is supported.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl Default for SupportedPairs {
    fn default() -> Self {
        Self {
            pairs: SUPPORTED_PAIRS.iter().filter_map(|p| p.parse().ok()).collect(),
        }
    }
}
