//! Announces new podcast episodes on Bluesky and Mastodon.
//!
//! One invocation makes one pass over the configured feeds: probe each feed
//! for changes, pick the episodes not announced before, post them, and
//! remember what was posted in a SQLite database so the next run (usually
//! from cron) never repeats itself.

pub mod clock;
pub mod config;
pub mod feed;
pub mod logging;
pub mod pipeline;
pub mod publish;
pub mod render;
pub mod storage;
pub mod util;
