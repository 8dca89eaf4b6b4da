use chrono::{DateTime, Utc};
use std::time::Duration;

/// One episode as published in a podcast feed.
///
/// Produced by the feed parser for a single pass and never mutated after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    /// The feed's globally unique id for the episode (RSS `<guid>`, Atom `<id>`)
    pub identifier: String,
    /// Downloadable media URL (RSS `<enclosure url>`)
    pub enclosure_url: Option<String>,
    pub title: String,
    /// HTML or plain text, as found in the feed
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub duration: Option<Duration>,
}
