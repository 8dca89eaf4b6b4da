//! Social-media destinations and per-episode dispatch.
//!
//! Every platform implements [`Destination`]; the [`dispatcher`] walks a
//! feed's destinations in order and isolates failures so one broken account
//! never blocks the others.

mod bluesky;
pub mod dispatcher;
mod mastodon;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::render::TemplateSettings;

pub use bluesky::BlueskyDestination;
pub use dispatcher::{dispatch, DestinationOutcome, DestinationResult, DispatchReport};
pub use mastodon::MastodonDestination;

/// Timeout applied to every request a destination makes.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    /// Non-2xx response; `message` is the server's error text when it sent one
    #[error("HTTP error: status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Reading or writing a stored session failed
    #[error("Session file error: {0}")]
    Session(String),
}

/// A place announcements are posted to.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Short label for logs and reports (e.g. "bluesky")
    fn name(&self) -> &str;

    /// Disabled destinations are skipped without an outcome.
    fn enabled(&self) -> bool {
        true
    }

    fn template(&self) -> &TemplateSettings;

    /// Whether the destination holds a renewable session worth persisting
    /// after a successful publish.
    fn uses_session(&self) -> bool {
        false
    }

    async fn publish(&self, body: &str, enclosure_url: Option<&str>) -> Result<(), PublishError>;

    async fn persist_session(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Pull a readable message out of an error response body.
///
/// Both AT Protocol and Mastodon send JSON with `error` and sometimes
/// `message`; anything else is passed through, shortened.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let error = value.get("error").and_then(|v| v.as_str());
        let message = value.get("message").and_then(|v| v.as_str());
        match (error, message) {
            (Some(e), Some(m)) => return format!("{e}: {m}"),
            (Some(e), None) => return e.to_string(),
            (None, Some(m)) => return m.to_string(),
            (None, None) => {}
        }
    }
    crate::util::truncate_description(body, 200)
}
