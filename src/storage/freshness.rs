use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::DatabaseError;

impl Database {
    // ========================================================================
    // Freshness Marker Operations
    // ========================================================================

    /// Get the stored freshness marker (last seen `Last-Modified`) for a feed.
    ///
    /// Returns `None` when the feed has never been marked or the stored value
    /// is out of range.
    pub async fn get_freshness(&self, feed_key: &str) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT last_modified FROM feeds WHERE feed_key = ?")
            .bind(feed_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|(secs,)| {
            let parsed = DateTime::from_timestamp(secs, 0);
            if parsed.is_none() {
                tracing::warn!(feed = %feed_key, value = secs, "Stored freshness marker out of range, ignoring");
            }
            parsed
        }))
    }

    /// Store the freshness marker for a feed, replacing any previous value.
    pub async fn set_freshness(
        &self,
        feed_key: &str,
        marker: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO feeds (feed_key, last_modified)
            VALUES (?, ?)
            ON CONFLICT(feed_key) DO UPDATE SET
                last_modified = excluded.last_modified
        "#,
        )
        .bind(feed_key)
        .bind(marker.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
