use chrono::Duration;

use crate::clock::Clock;
use crate::feed::Episode;
use crate::storage::{Database, DatabaseError};

/// Pick the episodes that still need announcing, oldest first.
///
/// `episodes` arrive newest first. An episode is kept when it was published
/// within `recency_window_days` (inclusive), its identifier contains
/// `identifier_filter` (case-insensitive, empty matches all), and neither its
/// identifier nor its enclosure URL has been recorded for `feed_key`.
///
/// Unless `dry_run`, every kept episode is recorded immediately, before any
/// announcement goes out. A crash or failed publish later in the pass
/// therefore never causes a repeat post on the next run.
pub async fn select_new(
    store: &Database,
    episodes: &[Episode],
    feed_key: &str,
    recency_window_days: u32,
    identifier_filter: &str,
    dry_run: bool,
    clock: &dyn Clock,
) -> Result<Vec<Episode>, DatabaseError> {
    let window = Duration::days(i64::from(recency_window_days));
    let filter = identifier_filter.to_lowercase();
    let mut selected = Vec::new();

    for episode in episodes {
        let age = clock.now() - episode.published_at;
        if age > window {
            tracing::debug!(feed = %feed_key, episode = %episode.identifier, "Outside recency window");
            continue;
        }

        if !filter.is_empty() && !episode.identifier.to_lowercase().contains(&filter) {
            tracing::debug!(feed = %feed_key, episode = %episode.identifier, "Identifier filtered out");
            continue;
        }

        let enclosure = episode.enclosure_url.as_deref();
        if store.has_seen(feed_key, &episode.identifier, enclosure).await? {
            continue;
        }

        if !dry_run {
            store
                .record(feed_key, &episode.identifier, enclosure, clock.now())
                .await?;
        }
        selected.push(episode.clone());
    }

    selected.reverse();
    Ok(selected)
}
