//! # Persisted Watchlist Schema
//!
//! The stored value is a JSON array of entries. Current entries carry the
//! structured `pair` next to `pairString`; legacy entries only have
//! `pairString` (and may lack `isActive`). Both shapes are decoded at the
//! storage boundary into `PersistedEntry` and turned into `WatchlistEntry`
//! by `migrate`, which is pure. Decoding already migrated data changes
//! nothing and reports `migrated == false`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::markets::forex::{CurrencyPair, PairParseError};

/// One watchlist row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    /// Unique identifier.
    pub id: String,
    /// Structured pair.
    pub pair: CurrencyPair,
    /// `pair` in `BASE/QUOTE` form.
    pub pair_string: String,
    /// Whether the pair is shown and polled.
    pub is_active: bool,
}

impl WatchlistEntry {
    /// New active entry with a fresh v4 id.
    pub fn new(pair: CurrencyPair) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pair_string: pair.to_string(),
            pair,
            is_active: true,
        }
    }
}

/// Entry written before `pair` was stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyEntry {
    /// Unique identifier.
    pub id: String,
    /// Pair in `BASE/QUOTE` form.
    pub pair_string: String,
    /// Absent in the oldest data; those entries were always active.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Either shape of a stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PersistedEntry {
    /// Has `pair`, `pairString` and `isActive`.
    Current(WatchlistEntry),
    /// Anything else that still has `id` and `pairString`.
    Legacy(LegacyEntry),
}

/// Why stored data was rejected as a whole.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Not a JSON array of entries with `id` and `pairString`.
    #[error("persisted watchlist is malformed: {0}")]
    Json(#[from] serde_json::Error),

    /// An entry has an empty id.
    #[error("persisted entry {index} has an empty id")]
    EmptyId {
        /// Position in the stored array.
        index: usize,
    },

    /// An entry's `pairString` is not `BASE/QUOTE`.
    #[error("persisted entry {index}: {source}")]
    BadPair {
        /// Position in the stored array.
        index: usize,
        /// Parse failure.
        #[source]
        source: PairParseError,
    },
}

/// Result of decoding a stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Entries in stored order.
    pub entries: Vec<WatchlistEntry>,
    /// True when anything had to be rewritten, so the caller should persist.
    pub migrated: bool,
}

/// Converts one stored entry to the current shape.
///
/// The returned flag is true when the output differs from what was stored.
/// `pair` is always rebuilt from `pairString`, so a current entry whose two
/// fields disagree is repaired too.
pub fn migrate(entry: PersistedEntry) -> Result<(WatchlistEntry, bool), PairParseError> {
    match entry {
        PersistedEntry::Current(current) => {
            let pair: CurrencyPair = current.pair_string.parse()?;
            if pair == current.pair {
                Ok((current, false))
            } else {
                Ok((
                    WatchlistEntry {
                        pair,
                        ..current
                    },
                    true,
                ))
            }
        }
        PersistedEntry::Legacy(legacy) => {
            let pair: CurrencyPair = legacy.pair_string.parse()?;
            Ok((
                WatchlistEntry {
                    id: legacy.id,
                    pair,
                    pair_string: legacy.pair_string,
                    is_active: legacy.is_active,
                },
                true,
            ))
        }
    }
}

/// Parses and migrates a stored value.
///
/// Entries repeating an earlier id or pair are dropped with a warning and
/// count as a migration.
pub fn decode(raw: &str) -> Result<Decoded, SchemaError> {
    let stored: Vec<PersistedEntry> = serde_json::from_str(raw)?;

    let mut entries = Vec::with_capacity(stored.len());
    let mut migrated = false;
    let mut seen_ids = HashSet::new();
    let mut seen_pairs = HashSet::new();

    for (index, item) in stored.into_iter().enumerate() {
        let (entry, changed) = migrate(item).map_err(|source| SchemaError::BadPair { index, source })?;
        if entry.id.trim().is_empty() {
            return Err(SchemaError::EmptyId { index });
        }
        migrated |= changed;

        if !seen_ids.insert(entry.id.clone()) || !seen_pairs.insert(entry.pair.clone()) {
            warn!(index, id = %entry.id, pair = %entry.pair_string, "Dropping duplicate watchlist entry");
            migrated = true;
            continue;
        }
        entries.push(entry);
    }

    Ok(Decoded { entries, migrated })
}

/// Serializes entries in the current shape.
pub fn encode(entries: &[WatchlistEntry]) -> Result<String, serde_json::Error> {
    serde_json::to_string(entries)
}
