//! The feed-to-publish pass.
//!
//! For each feed: the [`gate`] decides whether anything could have changed,
//! the [`selector`] picks the unseen recent episodes and records them, and
//! the [`orchestrator`] hands each one to the publish dispatcher before
//! storing the feed's new freshness marker.

pub mod gate;
pub mod orchestrator;
pub mod selector;

pub use gate::should_process;
pub use orchestrator::{run_pipeline, FeedOutcome, FeedPlan, FeedSummary, RunContext, RunSummary};
pub use selector::select_new;
