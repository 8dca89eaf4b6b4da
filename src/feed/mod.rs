//! Podcast feed retrieval and parsing.
//!
//! - [`parser`] turns an RSS or Atom document into [`Episode`] records
//! - [`fetcher`] implements [`FeedSource`] over HTTP with retries and a
//!   `Last-Modified` freshness probe
//!
//! The pipeline only ever talks to the [`FeedSource`] trait, so tests can
//! drive it from an in-memory list of episodes.

mod episode;
mod fetcher;
mod parser;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use episode::Episode;
pub use fetcher::{FetchError, HttpFeedSource};
pub use parser::{parse_feed, ParseResult};

/// Where episodes come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Cheap probe of when the feed last changed.
    ///
    /// `None` means the source could not tell; callers treat that as
    /// "possibly changed".
    async fn freshness_marker(&self, feed_url: &str) -> Option<DateTime<Utc>>;

    /// Fetch up to `limit` episodes, newest first.
    async fn fetch(&self, feed_url: &str, limit: usize) -> Result<Vec<Episode>, FetchError>;
}
