//! SQLite store for announced episodes and per-feed freshness markers.

mod episodes;
mod freshness;
mod schema;
mod types;

pub use schema::Database;
pub use types::{DatabaseError, SeenEpisode};
