//! Error types for watchlist persistence and mutation.

use thiserror::Error;

/// Failures of the key-value persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading, writing or deleting the backing value failed.
    #[error("storage I/O failed for key `{key}`: {source}")]
    Io {
        /// Key being accessed.
        key: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The key can't be mapped onto the backend.
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),

    /// The backend refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Rejected watchlist operations.
///
/// Validation variants are returned before anything is changed. `Storage`
/// and `Encode` mean the new list could not be written; the in-memory list
/// then still equals the last persisted one.
#[derive(Debug, Error)]
pub enum WatchlistError {
    /// One or more pairs are outside the supported set.
    #[error("Invalid currency pairs: {}", .pairs.join(", "))]
    InvalidPair {
        /// Every rejected pair string, in input order.
        pairs: Vec<String>,
    },

    /// Single add of a pair already on the list.
    #[error("Pair already exists in watchlist: {0}")]
    DuplicatePair(String),

    /// Bulk add with no input.
    #[error("No currency pairs provided")]
    EmptyPairs,

    /// The proposed order is not a permutation of the current ids.
    #[error("New order must contain exactly the current watchlist ids")]
    InvalidReorder,

    /// Persisting the updated list failed.
    #[error("Failed to persist watchlist: {0}")]
    Storage(#[from] StorageError),

    /// Serializing the updated list failed.
    #[error("Failed to encode watchlist: {0}")]
    Encode(#[from] serde_json::Error),
}
