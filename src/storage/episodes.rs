use chrono::{DateTime, Duration, Utc};

use super::schema::Database;
use super::types::{DatabaseError, SeenEpisode};

impl Database {
    // ========================================================================
    // Seen-Episode Operations
    // ========================================================================

    /// Check whether an episode has already been recorded for a feed.
    ///
    /// An episode counts as seen when EITHER its identifier OR its enclosure
    /// URL matches an earlier entry for the same feed. Some publishers rotate
    /// GUIDs while keeping the media URL stable (and the other way around), so
    /// a match on either key suppresses the announcement.
    pub async fn has_seen(
        &self,
        feed_key: &str,
        guid: &str,
        enclosure_url: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM episodes
                WHERE feed_key = ?
                  AND (guid = ? OR (? IS NOT NULL AND enclosure_url = ?))
            )
        "#,
        )
        .bind(feed_key)
        .bind(guid)
        .bind(enclosure_url)
        .bind(enclosure_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 != 0)
    }

    /// Append a seen-episode entry.
    ///
    /// Recording the same episode twice inserts a second row rather than
    /// failing; dedup reads only ask whether any row matches.
    pub async fn record(
        &self,
        feed_key: &str,
        guid: &str,
        enclosure_url: Option<&str>,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO episodes (feed_key, guid, enclosure_url, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(feed_key)
        .bind(guid)
        .bind(enclosure_url)
        .bind(recorded_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete seen-episode entries recorded more than `age_days` before `now`.
    ///
    /// Freshness markers are left alone. Returns the number of rows removed.
    pub async fn purge_older_than(
        &self,
        age_days: u32,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let Some(cutoff) = now.checked_sub_signed(Duration::days(i64::from(age_days))) else {
            tracing::debug!(age_days, "Retention cutoff out of range, nothing to purge");
            return Ok(0);
        };
        let result = sqlx::query("DELETE FROM episodes WHERE recorded_at < ?")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(removed, age_days, "Purged old seen-episode entries");
        }
        Ok(removed)
    }

    /// Number of seen-episode rows recorded for a feed.
    pub async fn seen_count(&self, feed_key: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM episodes WHERE feed_key = ?")
            .bind(feed_key)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// All seen-episode rows for a feed, oldest first.
    pub async fn seen_episodes(&self, feed_key: &str) -> Result<Vec<SeenEpisode>, DatabaseError> {
        let rows = sqlx::query_as::<_, SeenEpisode>(
            r#"
            SELECT feed_key, guid, enclosure_url, recorded_at
            FROM episodes
            WHERE feed_key = ?
            ORDER BY recorded_at, id
        "#,
        )
        .bind(feed_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;
    use chrono::{Duration, TimeZone, Utc};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_episode_not_seen() {
        let db = test_db().await;
        assert!(!db
            .has_seen("show", "guid-1", Some("https://cdn.example.com/1.mp3"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_seen_by_guid_with_new_enclosure() {
        let db = test_db().await;
        db.record("show", "guid-1", Some("https://cdn.example.com/1.mp3"), now())
            .await
            .unwrap();

        assert!(db
            .has_seen("show", "guid-1", Some("https://cdn.example.com/rotated.mp3"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_seen_by_enclosure_with_new_guid() {
        let db = test_db().await;
        db.record("show", "guid-1", Some("https://cdn.example.com/1.mp3"), now())
            .await
            .unwrap();

        assert!(db
            .has_seen("show", "guid-corrupted", Some("https://cdn.example.com/1.mp3"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_missing_enclosure_only_matches_guid() {
        let db = test_db().await;
        db.record("show", "guid-1", None, now()).await.unwrap();

        assert!(db.has_seen("show", "guid-1", None).await.unwrap());
        assert!(!db.has_seen("show", "guid-2", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_seen_is_scoped_per_feed() {
        let db = test_db().await;
        db.record("show-a", "guid-1", Some("https://cdn.example.com/1.mp3"), now())
            .await
            .unwrap();

        assert!(!db
            .has_seen("show-b", "guid-1", Some("https://cdn.example.com/1.mp3"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_record_twice_keeps_both_rows() {
        let db = test_db().await;
        db.record("show", "guid-1", None, now()).await.unwrap();
        db.record("show", "guid-1", None, now()).await.unwrap();

        assert_eq!(db.seen_count("show").await.unwrap(), 2);
        assert!(db.has_seen("show", "guid-1", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_stores_given_timestamp() {
        let db = test_db().await;
        let first = now();
        let second = now() + Duration::minutes(5);
        db.record("show", "guid-1", None, first).await.unwrap();
        db.record("show", "guid-2", Some("https://cdn.example.com/2.mp3"), second)
            .await
            .unwrap();

        let rows = db.seen_episodes("show").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].recorded_at, first.timestamp());
        assert_eq!(rows[1].recorded_at, second.timestamp());
        assert_eq!(
            rows[1].enclosure_url.as_deref(),
            Some("https://cdn.example.com/2.mp3")
        );
    }

    #[tokio::test]
    async fn test_purge_respects_retention_window() {
        let db = test_db().await;
        db.record("show", "old", None, now() - Duration::days(91))
            .await
            .unwrap();
        db.record("show", "recent", None, now() - Duration::days(89))
            .await
            .unwrap();

        let removed = db.purge_older_than(90, now()).await.unwrap();
        assert_eq!(removed, 1);

        assert!(!db.has_seen("show", "old", None).await.unwrap());
        assert!(db.has_seen("show", "recent", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_leaves_freshness_markers() {
        let db = test_db().await;
        let marker = now() - Duration::days(365);
        db.set_freshness("show", marker).await.unwrap();
        db.record("show", "old", None, now() - Duration::days(365))
            .await
            .unwrap();

        db.purge_older_than(90, now()).await.unwrap();

        assert_eq!(db.seen_count("show").await.unwrap(), 0);
        assert_eq!(db.get_freshness("show").await.unwrap(), Some(marker));
    }

    #[tokio::test]
    async fn test_purge_with_out_of_range_cutoff_keeps_everything() {
        let db = test_db().await;
        db.record("show", "old", None, now() - Duration::days(3650))
            .await
            .unwrap();

        assert_eq!(db.purge_older_than(u32::MAX, now()).await.unwrap(), 0);
        assert_eq!(db.seen_count("show").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_empty_table() {
        let db = test_db().await;
        assert_eq!(db.purge_older_than(90, now()).await.unwrap(), 0);
    }
}
