//! # Fetch Error Taxonomy
//!
//! Every failed rate fetch is classified into one `FetchErrorKind` and carries
//! a user-facing message. None of them is fatal: the polling driver records
//! the error against the pair and keeps scheduling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::markets::forex::InvalidRate;

/// Message shown when the upstream quota is exhausted.
pub const QUOTA_EXCEEDED_MESSAGE: &str = "API quota exceeded. Please try again later.";
/// Message shown when the forex service answers with a 5xx.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "Forex service is temporarily unavailable. Please try again later.";
/// Message shown when the service cannot be reached.
pub const CONNECTION_FAILED_MESSAGE: &str =
    "Unable to connect to forex service. Please check your internet connection.";
/// Message shown when a request runs past its timeout.
pub const TIMEOUT_MESSAGE: &str = "Request timeout. Please try again.";
/// Message shown when the payload is malformed or incomplete.
pub const INVALID_RESPONSE_MESSAGE: &str = "Invalid response format from forex service";

/// Classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// HTTP 429 or an explicit quota marker in the body.
    QuotaExceeded,
    /// HTTP 5xx.
    ServiceUnavailable,
    /// Transport failure, including timeouts.
    ConnectionFailed,
    /// Malformed or incomplete payload.
    InvalidResponse,
    /// Anything else.
    Unknown,
}

/// A classified fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
    /// Classification.
    pub kind: FetchErrorKind,
    /// User-facing message.
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
}

impl FetchError {
    fn with(kind: FetchErrorKind, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
        }
    }

    /// Quota exhausted upstream.
    pub fn quota_exceeded(status: Option<u16>) -> Self {
        Self::with(FetchErrorKind::QuotaExceeded, QUOTA_EXCEEDED_MESSAGE, status)
    }

    /// The service answered with a 5xx.
    pub fn service_unavailable(status: u16) -> Self {
        Self::with(FetchErrorKind::ServiceUnavailable, SERVICE_UNAVAILABLE_MESSAGE, Some(status))
    }

    /// The service could not be reached.
    pub fn connection_failed() -> Self {
        Self::with(FetchErrorKind::ConnectionFailed, CONNECTION_FAILED_MESSAGE, None)
    }

    /// The request exceeded its timeout.
    pub fn timeout() -> Self {
        Self::with(FetchErrorKind::ConnectionFailed, TIMEOUT_MESSAGE, None)
    }

    /// The payload was unusable.
    pub fn invalid_response() -> Self {
        Self::with(FetchErrorKind::InvalidResponse, INVALID_RESPONSE_MESSAGE, None)
    }

    /// Unclassified failure with its own message.
    pub fn unknown(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::with(FetchErrorKind::Unknown, message, status)
    }

    /// Classifies a non-success HTTP status. `detail` is the server's own
    /// explanation, used only for unclassified statuses.
    pub fn from_status(status: u16, detail: Option<&str>) -> Self {
        match status {
            429 => Self::quota_exceeded(Some(status)),
            500..=599 => Self::service_unavailable(status),
            _ => {
                let detail = detail.filter(|d| !d.trim().is_empty()).unwrap_or("Unknown error");
                Self::unknown(format!("Forex service error: {} - {}", status, detail), Some(status))
            }
        }
    }

    /// True for quota failures, which switch polling to the backoff cadence.
    pub fn is_quota(&self) -> bool {
        self.kind == FetchErrorKind::QuotaExceeded
    }
}

impl From<InvalidRate> for FetchError {
    fn from(_: InvalidRate) -> Self {
        Self::invalid_response()
    }
}
