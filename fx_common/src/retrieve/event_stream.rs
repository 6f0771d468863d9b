//! # Rate Event Stream
//!
//! Client for the streaming variant of the proxy endpoint,
//! `GET <endpoint>?pair=...&stream=true`, which answers with server-sent
//! events whose `data:` lines carry the same `{success, data, error}`
//! envelope as a single fetch. Every event becomes one
//! `Result<RateSnapshot, FetchError>`.
//!
//! The stream ends when the server closes it, when the caller drops it, or
//! once `max_duration` has elapsed since it was opened.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use super::ky_http::ApiClient;
use super::rate_sources::{envelope_to_snapshot, mentions_quota};
use crate::ingestors::FetchError;
use crate::markets::forex::{ApiEnvelope, CurrencyPair, RateSnapshot, WireRate};

/// Incremental `text/event-stream` decoder that yields the `data` payload
/// of each complete event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the payloads of the events it completed.
    /// Multiple `data:` lines of one event are joined with `\n`; comments and
    /// other fields are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = find_event_end(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&event[..end]);

            let data: Vec<&str> = text
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|value| value.strip_prefix(' ').unwrap_or(value))
                .collect();
            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }
        payloads
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Decodes one event payload for `pair`.
pub fn decode_event(pair: &CurrencyPair, payload: &str) -> Result<RateSnapshot, FetchError> {
    let envelope: ApiEnvelope<WireRate> = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(pair = %pair, "Undecodable stream event: {}", e);
            return Err(FetchError::invalid_response());
        }
    };
    envelope_to_snapshot(pair, envelope, None)
}

struct StreamState {
    pair: CurrencyPair,
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    deadline: tokio::time::Instant,
    finished: bool,
}

/// Opens the rate stream for `pair`.
///
/// A non-2xx answer is classified like a single fetch and returned as the
/// error of this call. Transport failures while streaming are yielded once
/// and end the stream.
pub async fn open_rate_stream(
    client: &ApiClient,
    pair: &CurrencyPair,
    max_duration: Duration,
) -> Result<impl Stream<Item = Result<RateSnapshot, FetchError>> + Send + 'static, FetchError> {
    let deadline = tokio::time::Instant::now() + max_duration;
    let pair_string = pair.to_string();
    let query = [("pair", pair_string.as_str()), ("stream", "true")];

    let response = match tokio::time::timeout_at(deadline, client.open_stream("", &query)).await {
        Ok(response) => response?,
        Err(_) => return Err(FetchError::timeout()),
    };

    let status = response.status().as_u16();
    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        if status != 429 && mentions_quota(&body) {
            return Err(FetchError::quota_exceeded(Some(status)));
        }
        return Err(FetchError::from_status(status, Some(&body)));
    }
    debug!(pair = %pair, max_secs = max_duration.as_secs(), "Rate stream opened");

    let state = StreamState {
        pair: pair.clone(),
        body: response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        deadline,
        finished: false,
    };

    Ok(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.pending.pop_front() {
                let item = decode_event(&state.pair, &payload);
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match tokio::time::timeout_at(state.deadline, state.body.next()).await {
                Err(_) => {
                    debug!(pair = %state.pair, "Rate stream reached its maximum duration");
                    return None;
                }
                Ok(None) => {
                    debug!(pair = %state.pair, "Rate stream closed by server");
                    return None;
                }
                Ok(Some(Err(e))) => {
                    warn!(pair = %state.pair, "Rate stream failed: {}", e);
                    state.finished = true;
                    let err = if e.is_timeout() {
                        FetchError::timeout()
                    } else {
                        FetchError::connection_failed()
                    };
                    return Some((Err(err), state));
                }
                Ok(Some(Ok(chunk))) => {
                    let payloads = state.decoder.push(&chunk);
                    state.pending.extend(payloads);
                }
            }
        }
    }))
}
