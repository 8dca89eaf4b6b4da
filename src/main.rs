use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use podcast_bot::clock::{Clock, SystemClock};
use podcast_bot::config::{AppSettings, FeedSettings};
use podcast_bot::feed::HttpFeedSource;
use podcast_bot::logging;
use podcast_bot::pipeline::{run_pipeline, FeedPlan, RunContext};
use podcast_bot::publish::{BlueskyDestination, Destination, MastodonDestination};
use podcast_bot::render::TemplateRenderer;
use podcast_bot::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(
    name = "podcast-bot",
    version,
    about = "Announce new podcast episodes on Bluesky and Mastodon"
)]
struct Args {
    /// Settings file
    #[arg(short, long, value_name = "FILE", default_value = "settings.toml")]
    settings: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Render posts without publishing or recording anything
    #[arg(long)]
    dry_run: bool,

    /// Skip purging old entries from the database after the run
    #[arg(long)]
    skip_clean: bool,
}

fn build_destinations(
    feed: &FeedSettings,
    client: &reqwest::Client,
    clock: &Arc<dyn Clock>,
) -> Vec<Box<dyn Destination>> {
    let mut destinations: Vec<Box<dyn Destination>> = Vec::new();
    if let Some(bluesky) = &feed.bluesky {
        destinations.push(Box::new(
            BlueskyDestination::new(bluesky, client.clone()).with_clock(clock.clone()),
        ));
    }
    if let Some(mastodon) = &feed.mastodon {
        destinations.push(Box::new(MastodonDestination::new(mastodon, client.clone())));
    }
    destinations
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = logging::with_console(args.debug, || AppSettings::load(&args.settings))
        .with_context(|| format!("Failed to load settings from '{}'", args.settings.display()))?;

    logging::init(args.debug, settings.log_file.as_deref()).context("Failed to open log file")?;

    let db_path = settings
        .database_file
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path).await {
        Ok(db) => db,
        Err(DatabaseError::Locked) => {
            eprintln!("Error: {}", DatabaseError::Locked);
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let client = reqwest::Client::builder()
        .user_agent(&settings.user_agent)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create HTTP client")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let plans: Vec<FeedPlan> = settings
        .feeds
        .into_iter()
        .map(|feed| FeedPlan {
            destinations: build_destinations(&feed, &client, &clock),
            settings: feed,
        })
        .collect();

    let ctx = RunContext {
        dry_run: args.dry_run,
        clock: clock.clone(),
    };
    if ctx.dry_run {
        tracing::info!("Dry run: nothing will be published or recorded");
    }

    let source = HttpFeedSource::with_client(client);
    let summary = run_pipeline(&ctx, &db, &source, &TemplateRenderer::new(), &plans).await;
    summary.log();

    if !args.dry_run && !args.skip_clean {
        if let Err(e) = db
            .purge_older_than(settings.database_clean_days, clock.now())
            .await
        {
            tracing::warn!(error = %e, "Failed to purge old database entries");
        }
    }

    db.close().await;

    if summary.all_errored() {
        tracing::error!("Every feed failed");
        std::process::exit(1);
    }

    Ok(())
}
