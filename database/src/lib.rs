use chrono::{DateTime, Utc};
use crossposter_core::{CoreError, DatabaseError, MediaKind, PostRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info, warn};


const CREATE_POST_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS post (
    id TEXT PRIMARY KEY NOT NULL,
    sub_name TEXT NOT NULL,
    title TEXT NOT NULL,
    instagram_media_id TEXT NOT NULL,
    caption TEXT NOT NULL,
    media_kind TEXT NOT NULL,
    upvote INTEGER NOT NULL DEFAULT 0,
    upvote_ratio REAL NOT NULL DEFAULT 0,
    posted_at TEXT NOT NULL
)
"#;

/// Record of everything that has been published, keyed by Reddit post id.
pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl Database {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: format!("invalid database url {}: {}", self.connection_string, e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to database {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::query(CREATE_POST_TABLE)
            .execute(self.pool()?)
            .await
            .map_err(|e| {
                warn!("Creating post table failed: {}", e);
                DatabaseError::MigrationFailed {
                    migration: "create post table".to_string(),
                }
            })?;
        debug!("Post table ready");
        Ok(())
    }

    pub async fn is_posted(&self, reddit_post_id: &str) -> Result<bool, CoreError> {
        let row = sqlx::query("SELECT 1 FROM post WHERE id = ?")
            .bind(reddit_post_id)
            .fetch_optional(self.pool()?)
            .await
            .map_err(DatabaseError::from)?;
        Ok(row.is_some())
    }

    pub async fn posted_ids(&self) -> Result<HashSet<String>, CoreError> {
        let rows = sqlx::query("SELECT id FROM post")
            .fetch_all(self.pool()?)
            .await
            .map_err(DatabaseError::from)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<HashSet<_>, _>>()
            .map_err(|e| DatabaseError::from(e).into())
    }

    /// Inserts a record. A second record for the same Reddit post fails with
    /// `DatabaseError::DuplicatePost`.
    pub async fn record_post(&self, record: &PostRecord) -> Result<(), CoreError> {
        let result = sqlx::query(
            "INSERT INTO post (id, sub_name, title, instagram_media_id, caption, media_kind, upvote, upvote_ratio, posted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.reddit_post_id)
        .bind(&record.subreddit)
        .bind(&record.title)
        .bind(&record.instagram_media_id)
        .bind(&record.caption)
        .bind(record.media_kind.as_str())
        .bind(record.score)
        .bind(record.upvote_ratio)
        .bind(record.posted_at)
        .execute(self.pool()?)
        .await;

        match result {
            Ok(_) => {
                info!(
                    "Recorded {} post {} as Instagram media {}",
                    record.media_kind, record.reddit_post_id, record.instagram_media_id
                );
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(DatabaseError::DuplicatePost {
                    reddit_post_id: record.reddit_post_id.clone(),
                }
                .into())
            }
            Err(e) => Err(DatabaseError::from(e).into()),
        }
    }

    pub async fn get_post(&self, reddit_post_id: &str) -> Result<Option<PostRecord>, CoreError> {
        let row = sqlx::query("SELECT * FROM post WHERE id = ?")
            .bind(reddit_post_id)
            .fetch_optional(self.pool()?)
            .await
            .map_err(DatabaseError::from)?;

        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn recent_posts(&self, limit: u32) -> Result<Vec<PostRecord>, CoreError> {
        let rows = sqlx::query("SELECT * FROM post ORDER BY posted_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(self.pool()?)
            .await
            .map_err(DatabaseError::from)?;

        rows.iter().map(row_to_record).collect()
    }

    /// Deletes every record and returns how many were removed.
    pub async fn clear_posts(&self) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM post")
            .execute(self.pool()?)
            .await
            .map_err(DatabaseError::from)?;
        info!("Deleted {} post records", result.rows_affected());
        Ok(result.rows_affected())
    }

    fn pool(&self) -> Result<&SqlitePool, CoreError> {
        self.pool.as_ref().ok_or_else(|| {
            DatabaseError::ConnectionFailed {
                reason: "database not connected".to_string(),
            }
            .into()
        })
    }
}

fn row_to_record(row: &SqliteRow) -> Result<PostRecord, CoreError> {
    let media_kind: String = row.try_get("media_kind").map_err(DatabaseError::from)?;
    let media_kind = MediaKind::from_str(&media_kind).map_err(|e| DatabaseError::QueryFailed {
        query: format!("decoding media_kind: {}", e),
    })?;
    let posted_at: DateTime<Utc> = row.try_get("posted_at").map_err(DatabaseError::from)?;

    Ok(PostRecord {
        reddit_post_id: row.try_get("id").map_err(DatabaseError::from)?,
        subreddit: row.try_get("sub_name").map_err(DatabaseError::from)?,
        title: row.try_get("title").map_err(DatabaseError::from)?,
        instagram_media_id: row
            .try_get("instagram_media_id")
            .map_err(DatabaseError::from)?,
        caption: row.try_get("caption").map_err(DatabaseError::from)?,
        media_kind,
        score: row.try_get("upvote").map_err(DatabaseError::from)?,
        upvote_ratio: row.try_get("upvote_ratio").map_err(DatabaseError::from)?,
        posted_at,
    })
}
