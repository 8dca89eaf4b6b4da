use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{HeaderMap, LAST_MODIFIED};
use std::time::Duration;
use thiserror::Error;

use super::episode::Episode;
use super::parser::{parse_feed, ParseResult};
use super::FeedSource;

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while retrieving a feed.
///
/// Any of these aborts the pass for that one feed; the pipeline moves on to
/// the next configured feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Feed source backed by plain HTTP.
///
/// Freshness is probed with a `HEAD` request and the `Last-Modified`
/// header; episodes come from a full `GET` parsed with `feed-rs`.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    /// Build a source whose requests carry the given `User-Agent`.
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool, custom settings).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_bytes(&self, feed_url: &str) -> Result<Vec<u8>, FetchError> {
        let mut retry_count = 0;

        loop {
            let response = tokio::time::timeout(REQUEST_TIMEOUT, self.client.get(feed_url).send())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(FetchError::Network)?;

            let status = response.status();

            // Rate limiting and server errors back off: 1s, 2s, 4s
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        FetchError::RateLimited(MAX_RETRIES)
                    } else {
                        FetchError::HttpStatus(status.as_u16())
                    });
                }

                let delay_secs = 1u64 << retry_count;
                tracing::warn!(
                    feed = %feed_url,
                    status = %status,
                    retry = retry_count,
                    delay_secs = delay_secs,
                    "Feed request failed, retrying after delay"
                );

                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                retry_count += 1;
                continue;
            }

            // 4xx errors fail immediately
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            match read_limited_bytes(response, MAX_FEED_SIZE).await {
                Ok(bytes) => return Ok(bytes),
                Err(FetchError::IncompleteResponse { expected, received })
                    if retry_count < MAX_RETRIES =>
                {
                    let delay_secs = 1u64 << retry_count;
                    tracing::debug!(
                        feed = %feed_url,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        delay_secs = delay_secs,
                        "Retrying incomplete download"
                    );

                    tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn freshness_marker(&self, feed_url: &str) -> Option<DateTime<Utc>> {
        let response = match tokio::time::timeout(REQUEST_TIMEOUT, self.client.head(feed_url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(feed = %feed_url, error = %e, "Freshness probe failed");
                return None;
            }
            Err(_) => {
                tracing::warn!(feed = %feed_url, "Freshness probe timed out");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(feed = %feed_url, status = %response.status(), "Freshness probe returned non-success status");
            return None;
        }

        let marker = last_modified(response.headers());
        if marker.is_none() {
            tracing::debug!(feed = %feed_url, "Feed did not supply a usable Last-Modified header");
        }
        marker
    }

    async fn fetch(&self, feed_url: &str, limit: usize) -> Result<Vec<Episode>, FetchError> {
        let bytes = self.fetch_bytes(feed_url).await?;

        let ParseResult { episodes, skipped } =
            parse_feed(&bytes, limit).map_err(|e| FetchError::Parse(e.to_string()))?;

        if skipped > 0 {
            tracing::warn!(
                feed = %feed_url,
                skipped = skipped,
                "Feed entries without a publish date skipped"
            );
        }

        Ok(episodes)
    }
}

/// Parse the `Last-Modified` header (HTTP-date, RFC 2822 compatible).
fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let value = headers.get(LAST_MODIFIED)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
