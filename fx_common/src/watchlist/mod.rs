//! # Watchlist Module
//!
//! The persisted, ordered list of watched pairs.
//!
//! ## Contained Modules:
//! - **`storage`**: the async `KeyValueStore` seam with file and in-memory
//!   backends.
//! - **`schema`**: `WatchlistEntry`, the legacy/current stored shapes and the
//!   pure migration between them.
//! - **`store`**: `WatchlistStore` with validated add, remove, reorder and
//!   toggle, each persisted before it takes effect.
//! - **`errors`**: `WatchlistError` and `StorageError`.

/// Watchlist and storage errors.
pub mod errors;
/// Stored entry shapes and migration.
pub mod schema;
/// Key-value persistence backends.
pub mod storage;
/// The watchlist itself.
pub mod store;

// --- Public API Re-exports ---
pub use errors::{StorageError, WatchlistError};
pub use schema::{LegacyEntry, PersistedEntry, SchemaError, WatchlistEntry};
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use store::{WatchlistSettings, WatchlistStore, DEFAULT_STORAGE_KEY};
