//! # HTTP Retrieval Utilities
//!
//! A thin asynchronous client around `reqwest` used by the forex rate
//! sources. It joins paths onto a base URL, injects the provider token
//! header, bounds every request with a timeout and hands back the status and
//! raw body so the caller can classify failures itself.
//!
//! There is deliberately no retry layer: a failed fetch is reported once and
//! the polling driver decides when to try again.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Url;
use thiserror::Error;
use tracing::trace;

/// Header carrying the provider access token.
pub const TOKEN_HEADER: &str = "token";

/// Failures below the HTTP status level.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The base URL or a joined path is not a valid absolute URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The token contains bytes not allowed in a header.
    #[error("invalid token header value")]
    InvalidToken,

    /// The underlying client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// Connecting, sending or reading the body failed.
    #[error("HTTP transport error: {0}")]
    Transport(#[source] reqwest::Error),
}

impl ClientError {
    /// True when the failure was a request or connect timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) | Self::Build(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// A standardized container for API responses.
///
/// This struct wraps the response body along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The response body when the status was 2xx.
    pub data: Option<T>,
    /// The raw body returned by the server when the status was not 2xx.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl ApiResponse<String> {
    /// The body regardless of status.
    pub fn body(&self) -> &str {
        self.data
            .as_deref()
            .or(self.error_body.as_deref())
            .unwrap_or_default()
    }
}

/// An asynchronous HTTP client bound to one base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// The underlying client.
    inner: reqwest::Client,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// Headers added to every request.
    default_headers: HeaderMap,
    /// Upper bound on a single non-streaming request.
    timeout: Duration,
}

impl ApiClient {
    /// Creates a client for `base_url`.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL (e.g. "http://localhost:8081/api/forex").
    /// * `token` - Optional provider token, sent in the `token` header.
    /// * `timeout` - Bound on each request; also used as the connect timeout.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)?;

        let mut default_headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(token).map_err(|_| ClientError::InvalidToken)?;
            default_headers.insert(TOKEN_HEADER, value);
        }

        let inner = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            inner,
            base_url,
            default_headers,
            timeout,
        })
    }

    /// The base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL. An empty path is the base URL
    /// itself; otherwise the base is treated as a directory.
    pub fn url_for(&self, path: &str) -> Result<Url, ClientError> {
        if path.is_empty() {
            return Ok(self.base_url.clone());
        }
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        Ok(base.join(path.trim_start_matches('/'))?)
    }

    /// GETs `path` with `query` and returns the body as text, whatever the
    /// status.
    pub async fn get_text(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse<String>, ClientError> {
        let url = self.url_for(path)?;
        trace!(url = %url, "GET");

        let response = self
            .inner
            .get(url)
            .headers(self.default_headers.clone())
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(ClientError::Transport)?;

        let success = status.is_success();
        Ok(ApiResponse {
            data: success.then(|| body.clone()),
            error_body: (!success).then_some(body),
            status: status.as_u16(),
            success,
            headers,
        })
    }

    /// GETs `path` with `query` and returns the response without reading the
    /// body and without a total timeout, for long-lived streams.
    pub async fn open_stream(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, ClientError> {
        let url = self.url_for(path)?;
        trace!(url = %url, "GET (stream)");

        self.inner
            .get(url)
            .headers(self.default_headers.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .query(query)
            .send()
            .await
            .map_err(ClientError::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_relative_paths_under_the_base() {
        let client = ApiClient::new("https://fx.example.com/1.0.3", None, Duration::from_secs(1)).unwrap();
        assert_eq!(client.url_for("rates").unwrap().as_str(), "https://fx.example.com/1.0.3/rates");
        assert_eq!(client.url_for("").unwrap().as_str(), "https://fx.example.com/1.0.3");
    }

    #[test]
    fn rejects_relative_base_and_bad_token() {
        assert!(matches!(
            ApiClient::new("not a url", None, Duration::from_secs(1)),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            ApiClient::new("http://localhost", Some("bad\ntoken"), Duration::from_secs(1)),
            Err(ClientError::InvalidToken)
        ));
    }
}
