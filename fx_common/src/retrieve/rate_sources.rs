//! # HTTP Rate Sources
//!
//! Two `RateSource` implementations over `ApiClient`:
//!
//! - **`ProxyRateSource`**: the forex proxy endpoint,
//!   `GET <endpoint>?pair=USD%2FJPY`, answering with the
//!   `{success, data, error}` envelope.
//! - **`ProviderRateSource`**: the upstream provider,
//!   `GET <base>/rates?pair=USDJPY` with a `token` header, answering with a
//!   bare array of rates.
//!
//! Both classify failures into `FetchError` and never retry.

use async_trait::async_trait;
use tracing::debug;

use super::ky_http::{ApiClient, ClientError};
use crate::ingestors::{FetchError, RateSource};
use crate::markets::forex::{ApiEnvelope, CurrencyPair, RateSnapshot, WireRate};

/// Body markers the provider uses to signal an exhausted quota.
pub const QUOTA_MARKERS: [&str; 2] = ["Quota reached", "QuotaReached"];

/// True when `text` carries a quota marker.
pub fn mentions_quota(text: &str) -> bool {
    QUOTA_MARKERS.iter().any(|marker| text.contains(marker))
}

impl From<ClientError> for FetchError {
    fn from(err: ClientError) -> Self {
        match err {
            e if e.is_timeout() => FetchError::timeout(),
            ClientError::Transport(_) => FetchError::connection_failed(),
            other => FetchError::unknown(other.to_string(), None),
        }
    }
}

/// Reads rates from the forex proxy.
#[derive(Debug, Clone)]
pub struct ProxyRateSource {
    client: ApiClient,
}

impl ProxyRateSource {
    /// Source over a client whose base URL is the proxy endpoint.
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// The underlying client, shared with the stream reader.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl RateSource for ProxyRateSource {
    async fn fetch(&self, pair: &CurrencyPair) -> Result<RateSnapshot, FetchError> {
        let pair_string = pair.to_string();
        let response = self.client.get_text("", &[("pair", pair_string.as_str())]).await?;
        parse_envelope(pair, response.status, response.body())
    }

    fn name(&self) -> &str {
        "proxy"
    }
}

/// Classifies a proxy response.
pub fn parse_envelope(pair: &CurrencyPair, status: u16, body: &str) -> Result<RateSnapshot, FetchError> {
    let envelope: Option<ApiEnvelope<WireRate>> = serde_json::from_str(body).ok();

    if !(200..300).contains(&status) {
        let detail = envelope.as_ref().and_then(|e| e.error.as_deref()).unwrap_or(body);
        if status != 429 && mentions_quota(detail) {
            return Err(FetchError::quota_exceeded(Some(status)));
        }
        return Err(FetchError::from_status(status, Some(detail)));
    }

    let Some(envelope) = envelope else {
        debug!(pair = %pair, "Proxy body is not an envelope");
        return Err(FetchError::invalid_response());
    };
    envelope_to_snapshot(pair, envelope, Some(status))
}

/// Turns one decoded envelope into a snapshot or a classified error. Shared
/// by single responses and stream events.
pub fn envelope_to_snapshot(
    pair: &CurrencyPair,
    envelope: ApiEnvelope<WireRate>,
    status: Option<u16>,
) -> Result<RateSnapshot, FetchError> {
    if !envelope.success {
        let message = envelope.error.unwrap_or_else(|| "Unknown error".to_string());
        if mentions_quota(&message) {
            return Err(FetchError::quota_exceeded(status));
        }
        return Err(FetchError::unknown(message, status));
    }
    let wire = envelope.data.ok_or_else(FetchError::invalid_response)?;
    Ok(RateSnapshot::from_wire(pair, &wire)?)
}

/// Reads rates straight from the upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderRateSource {
    client: ApiClient,
}

impl ProviderRateSource {
    /// Source over a client whose base URL is the provider API root and
    /// which carries the provider token.
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RateSource for ProviderRateSource {
    async fn fetch(&self, pair: &CurrencyPair) -> Result<RateSnapshot, FetchError> {
        let symbol = pair.api_symbol();
        let response = self.client.get_text("rates", &[("pair", symbol.as_str())]).await?;
        parse_provider(pair, response.status, response.body())
    }

    fn name(&self) -> &str {
        "provider"
    }
}

/// Classifies a provider response.
pub fn parse_provider(pair: &CurrencyPair, status: u16, body: &str) -> Result<RateSnapshot, FetchError> {
    if mentions_quota(body) {
        return Err(FetchError::quota_exceeded(Some(status)));
    }
    if !(200..300).contains(&status) {
        return Err(FetchError::from_status(status, Some(body)));
    }

    let rates: Vec<WireRate> = serde_json::from_str(body).map_err(|e| {
        debug!(pair = %pair, "Provider body is not a rate array: {}", e);
        FetchError::invalid_response()
    })?;
    let first = rates.first().ok_or_else(FetchError::invalid_response)?;
    Ok(RateSnapshot::from_wire(pair, first)?)
}
