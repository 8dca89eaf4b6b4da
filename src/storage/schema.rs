use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqliteConnection, SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

/// Columns the `episodes` table must carry after migration.
const REQUIRED_EPISODE_COLUMNS: [&str; 4] = ["feed_key", "guid", "enclosure_url", "recorded_at"];

// ============================================================================
// Database
// ============================================================================

/// True when `table` exists in the older layout keyed by `podcast_name`.
async fn is_legacy_table(conn: &mut SqliteConnection, table: &str) -> Result<bool> {
    let columns: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;
    let has = |wanted: &str| columns.iter().any(|(name,)| name == wanted);
    Ok(has("podcast_name") && !has("feed_key"))
}

/// Handle to the feed state database.
///
/// Owns the two persisted tables: `episodes` (seen-episode entries) and
/// `feeds` (one freshness marker per feed key). Cloning is cheap; clones
/// share the same pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `path` may be `:memory:` for a throwaway database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Locked` if another run holds the database lock.
    /// Returns `DatabaseError::Migration` if the schema cannot be brought into
    /// the required shape, and `DatabaseError::Other` for anything else.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DatabaseError::Migration(format!(
                            "cannot create database directory '{}': {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        // busy_timeout=5000: wait up to 5 seconds for a lock before SQLITE_BUSY.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // Single-threaded pass; one writer is all we ever need.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::Locked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        db.verify_schema().await?;
        Ok(db)
    }

    /// Close the pool, waiting for in-flight statements to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements are idempotent, so re-running on an existing database
    /// is a no-op. Tables in the older `podcast_name`-keyed layout are moved
    /// aside, copied into the current tables and dropped.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let legacy_episodes = is_legacy_table(&mut *tx, "episodes").await?;
        if legacy_episodes {
            sqlx::query("ALTER TABLE episodes RENAME TO legacy_episodes")
                .execute(&mut *tx)
                .await?;
        }
        let legacy_feeds = is_legacy_table(&mut *tx, "feeds").await?;
        if legacy_feeds {
            sqlx::query("ALTER TABLE feeds RENAME TO legacy_feeds")
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                id INTEGER PRIMARY KEY,
                feed_key TEXT NOT NULL,
                guid TEXT NOT NULL,
                enclosure_url TEXT,
                recorded_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                feed_key TEXT PRIMARY KEY,
                last_modified INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Dedup lookups filter by feed key and one of the two episode keys
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_episodes_feed_guid ON episodes(feed_key, guid)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_episodes_feed_enclosure ON episodes(feed_key, enclosure_url)",
        )
        .execute(&mut *tx)
        .await?;
        // Retention purge scans by age
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_episodes_recorded ON episodes(recorded_at)")
            .execute(&mut *tx)
            .await?;

        // Legacy timestamps are naive "YYYY-MM-DD HH:MM:SS[.ffffff]" text, read as UTC
        if legacy_episodes {
            let copied = sqlx::query(
                r#"
                INSERT INTO episodes (feed_key, guid, enclosure_url, recorded_at)
                SELECT COALESCE(podcast_name, ''), guid, enclosure_url,
                       COALESCE(CAST(strftime('%s', processed) AS INTEGER),
                                CAST(strftime('%s', 'now') AS INTEGER))
                FROM legacy_episodes
                WHERE guid IS NOT NULL
                ORDER BY rowid
            "#,
            )
            .execute(&mut *tx)
            .await?
            .rows_affected();
            sqlx::query("DROP TABLE legacy_episodes")
                .execute(&mut *tx)
                .await?;
            tracing::info!(rows = copied, "Imported seen episodes from legacy table");
        }

        if legacy_feeds {
            sqlx::query(
                r#"
                INSERT INTO feeds (feed_key, last_modified)
                SELECT podcast_name, CAST(strftime('%s', last_modified) AS INTEGER)
                FROM legacy_feeds
                WHERE podcast_name IS NOT NULL
                  AND strftime('%s', last_modified) IS NOT NULL
            "#,
            )
            .execute(&mut *tx)
            .await?;
            sqlx::query("DROP TABLE legacy_feeds")
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Confirm the `episodes` table has every column the store relies on.
    async fn verify_schema(&self) -> Result<(), DatabaseError> {
        let columns: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info('episodes')")
            .fetch_all(&self.pool)
            .await?;

        for required in REQUIRED_EPISODE_COLUMNS {
            if !columns.iter().any(|(name,)| name == required) {
                return Err(DatabaseError::Migration(format!(
                    "episodes table is missing column '{}'",
                    required
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_creates_tables() {
        let db = Database::open(":memory:").await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('episodes', 'feeds') ORDER BY name",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].0, "episodes");
        assert_eq!(tables[1].0, "feeds");
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db.verify_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("feed_info.sqlite3");

        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.pool.close().await;

        assert!(path.exists());
    }

    async fn seed(path: &str, statements: &[&str]) {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path)).unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        for statement in statements {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        pool.close().await;
    }

    #[tokio::test]
    async fn test_legacy_layout_is_imported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.sqlite3");
        let path_str = path.to_str().unwrap();

        seed(
            path_str,
            &[
                "CREATE TABLE episodes(podcast_name str, guid str, enclosure_url str, processed str)",
                "CREATE TABLE feeds(podcast_name str PRIMARY KEY, last_modified str)",
                "INSERT INTO episodes VALUES ('show', 'guid-1', 'https://cdn.example.com/1.mp3', '2024-06-01 12:00:00.250000')",
                "INSERT INTO episodes VALUES ('show', 'guid-2', NULL, '2024-06-02 08:30:00')",
                "INSERT INTO episodes VALUES ('show', NULL, NULL, '2024-06-02 08:30:00')",
                "INSERT INTO feeds VALUES ('show', '2024-06-01 10:00:00+00:00')",
                "INSERT INTO feeds VALUES ('other', 'not a date')",
            ],
        )
        .await;

        let db = Database::open(path_str).await.unwrap();

        let rows = db.seen_episodes("show").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].guid, "guid-1");
        assert_eq!(
            rows[0].enclosure_url.as_deref(),
            Some("https://cdn.example.com/1.mp3")
        );
        assert_eq!(rows[0].recorded_at, 1_717_243_200);
        assert_eq!(rows[1].guid, "guid-2");
        assert_eq!(rows[1].recorded_at, 1_717_317_000);

        let marker = db.get_freshness("show").await.unwrap().unwrap();
        assert_eq!(marker.timestamp(), 1_717_236_000);
        assert!(db.get_freshness("other").await.unwrap().is_none());

        let leftovers: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE name LIKE 'legacy_%'")
                .fetch_all(&db.pool)
                .await
                .unwrap();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_incompatible_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.sqlite3");
        let path_str = path.to_str().unwrap();

        // Neither the current nor the legacy layout
        seed(path_str, &["CREATE TABLE episodes (title TEXT, processed TEXT)"]).await;

        let result = Database::open(path_str).await;
        assert!(matches!(result, Err(DatabaseError::Migration(_))));
    }
}
