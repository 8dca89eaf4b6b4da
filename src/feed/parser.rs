use anyhow::Result;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use sha2::{Digest, Sha256};

use super::episode::Episode;

/// Outcome of parsing one feed document.
#[derive(Debug)]
pub struct ParseResult {
    /// Episodes, newest first, at most `limit` of them
    pub episodes: Vec<Episode>,
    /// Entries dropped because they carried no publish or update date
    pub skipped: usize,
}

/// Parses an RSS or Atom document into episodes.
///
/// Entries are sorted newest first and the list is cut to `limit` after
/// sorting, so a feed that lists its back catalogue oldest-first still
/// yields its latest episodes.
pub fn parse_feed(bytes: &[u8], limit: usize) -> Result<ParseResult> {
    let feed = parser::parse(bytes)?;

    let mut skipped = 0;
    let mut episodes: Vec<Episode> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let episode = episode_from_entry(entry);
            if episode.is_none() {
                skipped += 1;
            }
            episode
        })
        .collect();

    episodes.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    episodes.truncate(limit);

    Ok(ParseResult { episodes, skipped })
}

fn episode_from_entry(entry: Entry) -> Option<Episode> {
    let published_at = entry.published.or(entry.updated)?;

    let enclosure_url = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
        .or_else(|| {
            entry
                .links
                .iter()
                .find(|l| l.rel.as_deref() == Some("enclosure"))
                .map(|l| l.href.clone())
        })
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    let duration = entry.media.iter().find_map(|m| {
        m.duration
            .or_else(|| m.content.iter().find_map(|c| c.duration))
    });

    let title = entry
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    // Prefer the full HTML body (content:encoded) over the short summary
    let description = entry
        .content
        .and_then(|c| c.body)
        .filter(|b| !b.trim().is_empty())
        .or_else(|| entry.summary.map(|s| s.content))
        .map(|d| d.trim().to_string())
        .unwrap_or_default();

    let existing_id = if entry.id.trim().is_empty() {
        None
    } else {
        Some(entry.id.as_str())
    };
    let identifier = generate_identifier(
        existing_id,
        enclosure_url.as_deref(),
        &title,
        published_at,
    );

    Some(Episode {
        identifier,
        enclosure_url,
        title,
        description,
        published_at,
        duration,
    })
}

/// Use the feed's own id when it has one, otherwise derive a stable one.
fn generate_identifier(
    existing: Option<&str>,
    enclosure_url: Option<&str>,
    title: &str,
    published_at: DateTime<Utc>,
) -> String {
    if let Some(id) = existing {
        return id.trim().to_string();
    }

    let input = format!(
        "{}|{}|{}",
        enclosure_url.unwrap_or(""),
        title,
        published_at.timestamp()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
