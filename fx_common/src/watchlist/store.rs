//! # Watchlist Store
//!
//! The ordered, persisted list of pairs the user watches.
//!
//! Every mutation is write-then-commit: the updated list is built aside,
//! persisted in full, and only then swapped in. A failed write leaves the
//! in-memory list equal to what is on storage and surfaces the error.
//! Mutations are serialized by the list's async mutex.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::errors::WatchlistError;
use super::schema::{self, WatchlistEntry};
use super::storage::KeyValueStore;
use crate::markets::forex::{CurrencyPair, SupportedPairs, DEFAULT_WATCHLIST_PAIRS};

/// Storage key of the watchlist value.
pub const DEFAULT_STORAGE_KEY: &str = "forex_watchlist_v2";

/// Startup configuration of a `WatchlistStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchlistSettings {
    /// Key the list is stored under.
    pub storage_key: String,
    /// Pairs that may be added.
    pub supported: SupportedPairs,
    /// Pairs seeded into an empty or unreadable watchlist.
    pub default_pairs: Vec<CurrencyPair>,
}

impl Default for WatchlistSettings {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            supported: SupportedPairs::default(),
            default_pairs: DEFAULT_WATCHLIST_PAIRS
                .iter()
                .filter_map(|p| p.parse().ok())
                .collect(),
        }
    }
}

/// Persisted, user-ordered watchlist.
pub struct WatchlistStore {
    storage: Arc<dyn KeyValueStore>,
    settings: WatchlistSettings,
    entries: Mutex<Vec<WatchlistEntry>>,
}

impl WatchlistStore {
    /// Creates an empty store. Call `load` before use.
    pub fn new(storage: Arc<dyn KeyValueStore>, settings: WatchlistSettings) -> Self {
        Self {
            storage,
            settings,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Startup configuration.
    pub fn settings(&self) -> &WatchlistSettings {
        &self.settings
    }

    /// Reads the persisted list, migrating legacy entries and seeding the
    /// defaults when nothing usable is stored, including an empty list. Never fails: unreadable or
    /// malformed data falls back to the defaults.
    pub async fn load(&self) -> Vec<WatchlistEntry> {
        let mut entries = self.entries.lock().await;
        let key = &self.settings.storage_key;

        let loaded = match self.storage.get(key).await {
            Ok(Some(raw)) => match schema::decode(&raw) {
                Ok(decoded) if decoded.entries.is_empty() => {
                    info!("Persisted watchlist is empty, seeding defaults");
                    self.seed_defaults().await
                }
                Ok(decoded) => {
                    if decoded.migrated {
                        info!(entries = decoded.entries.len(), "Migrated persisted watchlist");
                        self.persist_best_effort(&decoded.entries).await;
                    }
                    decoded.entries
                }
                Err(e) => {
                    warn!("Discarding persisted watchlist: {}", e);
                    self.seed_defaults().await
                }
            },
            Ok(None) => {
                info!("No persisted watchlist, seeding defaults");
                self.seed_defaults().await
            }
            Err(e) => {
                warn!("Failed to read persisted watchlist, using defaults: {}", e);
                self.default_entries()
            }
        };

        *entries = loaded.clone();
        loaded
    }

    /// Appends `pair_string`.
    pub async fn add_pair(&self, pair_string: &str) -> Result<WatchlistEntry, WatchlistError> {
        let pair = self.supported_pair(pair_string).ok_or_else(|| {
            warn!(pair = pair_string, "Rejected unsupported pair");
            WatchlistError::InvalidPair {
                pairs: vec![pair_string.to_string()],
            }
        })?;

        let mut entries = self.entries.lock().await;
        if entries.iter().any(|e| e.pair == pair) {
            warn!(pair = %pair, "Rejected duplicate pair");
            return Err(WatchlistError::DuplicatePair(pair.to_string()));
        }

        let entry = WatchlistEntry::new(pair);
        let mut next = entries.clone();
        next.push(entry.clone());
        self.commit(&mut entries, next).await?;
        info!(pair = %entry.pair_string, id = %entry.id, "Added pair");
        Ok(entry)
    }

    /// Appends every pair not already present, in input order, with one
    /// write. Returns the entries actually added, which may be none.
    pub async fn add_multiple_pairs<I, S>(&self, pair_strings: I) -> Result<Vec<WatchlistEntry>, WatchlistError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: Vec<String> = pair_strings.into_iter().map(|s| s.as_ref().to_string()).collect();
        if requested.is_empty() {
            return Err(WatchlistError::EmptyPairs);
        }

        let mut pairs = Vec::with_capacity(requested.len());
        let mut invalid = Vec::new();
        for raw in &requested {
            match self.supported_pair(raw) {
                Some(pair) => pairs.push(pair),
                None => invalid.push(raw.clone()),
            }
        }
        if !invalid.is_empty() {
            warn!(pairs = ?invalid, "Rejected unsupported pairs");
            return Err(WatchlistError::InvalidPair { pairs: invalid });
        }

        let mut entries = self.entries.lock().await;
        let mut present: HashSet<CurrencyPair> = entries.iter().map(|e| e.pair.clone()).collect();
        let added: Vec<WatchlistEntry> = pairs
            .into_iter()
            .filter(|pair| present.insert(pair.clone()))
            .map(WatchlistEntry::new)
            .collect();

        if added.is_empty() {
            info!("All requested pairs already in watchlist");
            return Ok(added);
        }

        let mut next = entries.clone();
        next.extend(added.iter().cloned());
        self.commit(&mut entries, next).await?;
        info!(count = added.len(), "Added pairs");
        Ok(added)
    }

    /// Removes the entry with `id`. Returns false when there is none.
    pub async fn remove_pair(&self, id: &str) -> Result<bool, WatchlistError> {
        let mut entries = self.entries.lock().await;
        let Some(index) = entries.iter().position(|e| e.id == id) else {
            return Ok(false);
        };

        let mut next = entries.clone();
        let removed = next.remove(index);
        self.commit(&mut entries, next).await?;
        info!(pair = %removed.pair_string, id, "Removed pair");
        Ok(true)
    }

    /// Reorders the list to follow `ids`, which must name every current entry
    /// exactly once.
    pub async fn reorder_pairs<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), WatchlistError> {
        let mut entries = self.entries.lock().await;

        let mut seen = HashSet::with_capacity(ids.len());
        let mut next = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            let found = entries.iter().find(|e| e.id == id);
            match found {
                Some(entry) if seen.insert(id) => next.push(entry.clone()),
                _ => {
                    warn!(id, "Rejected reorder with unknown or repeated id");
                    return Err(WatchlistError::InvalidReorder);
                }
            }
        }
        if next.len() != entries.len() {
            warn!(expected = entries.len(), received = next.len(), "Rejected reorder missing ids");
            return Err(WatchlistError::InvalidReorder);
        }

        self.commit(&mut entries, next).await?;
        info!(count = ids.len(), "Reordered watchlist");
        Ok(())
    }

    /// Flips `is_active` of the entry with `id`. Returns the new flag, or
    /// `None` when there is no such entry.
    pub async fn toggle_pair_active(&self, id: &str) -> Result<Option<bool>, WatchlistError> {
        let mut entries = self.entries.lock().await;
        let Some(index) = entries.iter().position(|e| e.id == id) else {
            return Ok(None);
        };

        let mut next = entries.clone();
        next[index].is_active = !next[index].is_active;
        let is_active = next[index].is_active;
        self.commit(&mut entries, next).await?;
        info!(id, is_active, "Toggled pair");
        Ok(Some(is_active))
    }

    /// Supported pairs not yet on the list, in supported-set order.
    pub async fn get_available_to_add(&self) -> Vec<CurrencyPair> {
        let entries = self.entries.lock().await;
        self.settings
            .supported
            .iter()
            .filter(|pair| !entries.iter().any(|e| &e.pair == *pair))
            .cloned()
            .collect()
    }

    /// Current list, in order.
    pub async fn entries(&self) -> Vec<WatchlistEntry> {
        self.entries.lock().await.clone()
    }

    /// Pairs of active entries, in order.
    pub async fn active_pairs(&self) -> Vec<CurrencyPair> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.is_active)
            .map(|e| e.pair.clone())
            .collect()
    }

    fn supported_pair(&self, pair_string: &str) -> Option<CurrencyPair> {
        pair_string
            .parse::<CurrencyPair>()
            .ok()
            .filter(|pair| self.settings.supported.contains_pair(pair))
    }

    fn default_entries(&self) -> Vec<WatchlistEntry> {
        self.settings
            .default_pairs
            .iter()
            .cloned()
            .map(WatchlistEntry::new)
            .collect()
    }

    async fn seed_defaults(&self) -> Vec<WatchlistEntry> {
        let defaults = self.default_entries();
        self.persist_best_effort(&defaults).await;
        defaults
    }

    async fn persist(&self, entries: &[WatchlistEntry]) -> Result<(), WatchlistError> {
        let raw = schema::encode(entries)?;
        self.storage.set(&self.settings.storage_key, &raw).await?;
        Ok(())
    }

    async fn persist_best_effort(&self, entries: &[WatchlistEntry]) {
        if let Err(e) = self.persist(entries).await {
            error!("Failed to persist watchlist: {}", e);
        }
    }

    async fn commit(&self, current: &mut Vec<WatchlistEntry>, next: Vec<WatchlistEntry>) -> Result<(), WatchlistError> {
        if let Err(e) = self.persist(&next).await {
            error!("Failed to persist watchlist, keeping previous state: {}", e);
            return Err(e);
        }
        *current = next;
        Ok(())
    }
}
