//! HTTP client wrapper used by the direct backend.
//!
//! Bodies are streamed into memory so that progress can be reported while
//! the response arrives and nothing touches the disk until the transfer
//! succeeded.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::download::{CONNECT_TIMEOUT_SECS, DownloadError, READ_TIMEOUT_SECS, RequestHeaders};

/// User-Agent sent with every direct download.
const USER_AGENT: &str = concat!("bgdl/", env!("CARGO_PKG_VERSION"));

/// Largest body size pre-allocated from `Content-Length` (64 MiB).
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// HTTP client for direct downloads.
///
/// Create once and clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default timeouts (30s connect, 5min read).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches `url` with every header value attached as its own entry and
    /// returns the full body.
    ///
    /// `on_progress` receives the received fraction whenever the server sent
    /// a `Content-Length`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Timeout`] or [`DownloadError::Network`] for
    /// transport failures and [`DownloadError::HttpStatus`] for non-2xx
    /// responses.
    #[allow(clippy::cast_precision_loss)]
    #[instrument(skip(self, headers, on_progress), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &Url,
        headers: &RequestHeaders,
        on_progress: impl Fn(f32) + Send,
    ) -> Result<Vec<u8>, DownloadError> {
        let mut request = self.client.get(url.clone());
        for (name, value) in headers.iter() {
            // `header` appends, so repeated names become repeated entries.
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url.as_str())
            } else {
                DownloadError::network(url.as_str(), e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }

        let total = response.content_length().filter(|len| *len > 0);
        let capacity = total
            .map(|len| len.min(MAX_PREALLOCATION))
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0);
        let mut body = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(url.as_str())
                } else {
                    DownloadError::network(url.as_str(), e)
                }
            })?;
            body.extend_from_slice(&chunk);
            if let Some(total) = total {
                on_progress(body.len() as f32 / total as f32);
            }
        }

        debug!(bytes = body.len(), "response body received");
        Ok(body)
    }
}
