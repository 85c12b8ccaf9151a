use chrono::{Local, NaiveDateTime};
use sqlx::{QueryBuilder, SqliteConnection};

use super::schema::Database;
use super::types::{DatabaseError, FeedSource, NewFeedSource};

impl Database {
    // ========================================================================
    // Source Registration
    // ========================================================================

    /// Register a feed source with an initial checkpoint of "now".
    ///
    /// Registering a URL that already exists updates its name and returns the
    /// existing row; its checkpoint is left alone.
    pub async fn add_source(&self, name: &str, url: &str) -> Result<FeedSource, DatabaseError> {
        let now = Local::now().naive_local();
        let source = sqlx::query_as::<_, FeedSource>(
            r#"
            INSERT INTO feed_sources (name, url, last_checked)
            VALUES (?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET name = excluded.name
            RETURNING id, name, url, last_checked
        "#,
        )
        .bind(name)
        .bind(url)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(source_id = source.id, name = %source.name, url = %source.url, "Feed source registered");
        Ok(source)
    }

    /// Register many sources in one transaction (OPML import).
    ///
    /// Batches of 100 rows keep each statement well under SQLite's bound
    /// parameter limit. Returns the number of rows inserted or renamed.
    pub async fn add_sources(&self, sources: &[NewFeedSource]) -> Result<usize, DatabaseError> {
        if sources.is_empty() {
            return Ok(0);
        }

        const BATCH_SIZE: usize = 100;
        let now = Local::now().naive_local();
        let mut affected = 0usize;
        let mut tx = self.pool.begin().await?;

        for chunk in sources.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO feed_sources (name, url, last_checked) ");

            builder.push_values(chunk, |mut b, source| {
                b.push_bind(&source.name)
                    .push_bind(&source.url)
                    .push_bind(now);
            });

            builder.push(" ON CONFLICT(url) DO UPDATE SET name = excluded.name");

            let result = builder.build().execute(&mut *tx).await?;
            affected += result.rows_affected() as usize;
        }

        tx.commit().await?;
        tracing::info!(count = affected, "Feed sources registered");
        Ok(affected)
    }

    // ========================================================================
    // Source Queries
    // ========================================================================

    /// All configured sources, in registration order
    pub async fn list_sources(&self) -> Result<Vec<FeedSource>, DatabaseError> {
        let sources = sqlx::query_as::<_, FeedSource>(
            "SELECT id, name, url, last_checked FROM feed_sources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    /// Look up a single source by id
    pub async fn get_source(&self, source_id: i64) -> Result<Option<FeedSource>, DatabaseError> {
        let source = sqlx::query_as::<_, FeedSource>(
            "SELECT id, name, url, last_checked FROM feed_sources WHERE id = ?",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    // ========================================================================
    // Checkpoint
    // ========================================================================

    /// Move a source's checkpoint, on the caller's connection or transaction.
    ///
    /// Fails with [`DatabaseError::SourceNotFound`] when no row matched, so a
    /// transaction that inserted items for a vanished source rolls back.
    pub(crate) async fn update_source_checkpoint(
        conn: &mut SqliteConnection,
        source_id: i64,
        checked_at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE feed_sources SET last_checked = ? WHERE id = ?")
            .bind(checked_at)
            .bind(source_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::SourceNotFound(source_id));
        }
        Ok(())
    }
}
