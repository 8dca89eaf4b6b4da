use std::sync::Arc;
use thiserror::Error;

use super::gate::should_process;
use super::selector::select_new;
use crate::clock::Clock;
use crate::config::FeedSettings;
use crate::feed::{FeedSource, FetchError};
use crate::publish::{dispatch, Destination};
use crate::render::Renderer;
use crate::storage::{Database, DatabaseError};

/// Per-run switches shared by every stage.
#[derive(Clone)]
pub struct RunContext {
    /// Render and log announcements without publishing or touching the store
    pub dry_run: bool,
    pub clock: Arc<dyn Clock>,
}

/// A feed together with the destinations built for it.
pub struct FeedPlan {
    pub settings: FeedSettings,
    pub destinations: Vec<Box<dyn Destination>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    Processed {
        /// Episodes selected for announcement
        episodes: usize,
        /// Successful (destination, episode) publishes
        published: usize,
        /// Failed (destination, episode) attempts
        failed: usize,
    },
    SkippedDisabled,
    SkippedStale,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSummary {
    pub feed_key: String,
    pub outcome: FeedOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub feeds: Vec<FeedSummary>,
}

impl RunSummary {
    /// True when at least one feed was attempted and every attempt errored.
    ///
    /// Disabled feeds are not attempts; stale feeds are successful ones.
    pub fn all_errored(&self) -> bool {
        let mut attempted = self
            .feeds
            .iter()
            .filter(|f| f.outcome != FeedOutcome::SkippedDisabled)
            .peekable();
        attempted.peek().is_some() && attempted.all(|f| matches!(f.outcome, FeedOutcome::Error(_)))
    }

    pub fn log(&self) {
        for feed in &self.feeds {
            match &feed.outcome {
                FeedOutcome::Processed {
                    episodes,
                    published,
                    failed,
                } => tracing::info!(
                    feed = %feed.feed_key,
                    episodes,
                    published,
                    failed,
                    "Feed processed"
                ),
                FeedOutcome::SkippedDisabled => {
                    tracing::info!(feed = %feed.feed_key, "Feed disabled")
                }
                FeedOutcome::SkippedStale => {
                    tracing::info!(feed = %feed.feed_key, "Feed unchanged")
                }
                FeedOutcome::Error(error) => {
                    tracing::error!(feed = %feed.feed_key, error = %error, "Feed failed")
                }
            }
        }
    }
}

#[derive(Debug, Error)]
enum FeedPassError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Run one pass over every configured feed, strictly in order.
///
/// A failing feed is logged and reported; the remaining feeds still run.
pub async fn run_pipeline(
    ctx: &RunContext,
    store: &Database,
    source: &dyn FeedSource,
    renderer: &dyn Renderer,
    feeds: &[FeedPlan],
) -> RunSummary {
    let mut summary = RunSummary::default();

    for plan in feeds {
        let feed_key = plan.settings.short_name.clone();
        let outcome = match process_feed(ctx, store, source, renderer, plan).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(feed = %feed_key, error = %e, "Feed pass aborted");
                FeedOutcome::Error(e.to_string())
            }
        };
        summary.feeds.push(FeedSummary { feed_key, outcome });
    }

    summary
}

async fn process_feed(
    ctx: &RunContext,
    store: &Database,
    source: &dyn FeedSource,
    renderer: &dyn Renderer,
    plan: &FeedPlan,
) -> Result<FeedOutcome, FeedPassError> {
    let feed = &plan.settings;
    let key = feed.short_name.as_str();

    if !feed.enabled {
        tracing::debug!(feed = %key, "Feed disabled, skipping");
        return Ok(FeedOutcome::SkippedDisabled);
    }

    let current = source.freshness_marker(&feed.feed_url).await;
    let stored = store.get_freshness(key).await?;
    if !should_process(key, stored, current) {
        return Ok(FeedOutcome::SkippedStale);
    }

    let episodes = source.fetch(&feed.feed_url, feed.max_episodes).await?;
    tracing::debug!(feed = %key, fetched = episodes.len(), "Fetched feed");

    let selected = select_new(
        store,
        &episodes,
        key,
        feed.recent_days,
        &feed.guid_filter,
        ctx.dry_run,
        ctx.clock.as_ref(),
    )
    .await?;

    if selected.is_empty() {
        tracing::info!(feed = %key, "No new episodes");
    }

    let mut published = 0;
    let mut failed = 0;
    for episode in &selected {
        let report = dispatch(episode, feed, &plan.destinations, renderer, ctx.dry_run).await;
        published += report.published();
        failed += report.failed();
    }

    if !ctx.dry_run {
        if let Some(marker) = current {
            store.set_freshness(key, marker).await?;
        }
    }

    Ok(FeedOutcome::Processed {
        episodes: selected.len(),
        published,
        failed,
    })
}
