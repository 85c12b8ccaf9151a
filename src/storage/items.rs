use chrono::NaiveDateTime;
use sqlx::{QueryBuilder, SqliteConnection};
use std::collections::HashSet;

use super::schema::Database;
use super::types::{DatabaseError, FeedItem, ItemPage, NewFeedItem};

/// Upper bound for a listing page
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: u32 = 10;

impl Database {
    // ========================================================================
    // Deduplication Lookup
    // ========================================================================

    /// Return the subset of `links` already present in the store.
    ///
    /// One query for the whole batch, whatever its size. An empty input never
    /// touches the database.
    pub async fn existing_links(&self, links: &[String]) -> Result<HashSet<String>, DatabaseError> {
        #[cfg(test)]
        self.link_lookups
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if links.is_empty() {
            return Ok(HashSet::new());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT link FROM feed_items WHERE link IN (");
        let mut separated = builder.separated(", ");
        for link in links {
            separated.push_bind(link);
        }
        separated.push_unseparated(")");

        let rows: Vec<(String,)> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(link,)| link).collect())
    }

    // ========================================================================
    // Write Boundary
    // ========================================================================

    /// Persist a cycle's new items and move the source checkpoint, atomically.
    ///
    /// Both writes share one transaction. Any failure rolls the transaction
    /// back before the error is returned, so either every item and the new
    /// checkpoint are visible afterwards or nothing changed.
    ///
    /// Returns the number of items inserted.
    pub async fn commit_new_items(
        &self,
        source_id: i64,
        items: &[NewFeedItem],
        checked_at: NaiveDateTime,
    ) -> Result<usize, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let written = async {
            let inserted = Self::insert_items(&mut *tx, items).await?;
            Self::update_source_checkpoint(&mut *tx, source_id, checked_at).await?;
            Ok::<_, DatabaseError>(inserted)
        }
        .await;

        match written {
            Ok(inserted) => {
                tx.commit().await?;
                Ok(inserted)
            }
            Err(e) => {
                // Roll back now, not on drop: other pooled connections must
                // never observe the partial insert.
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(source_id, error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Bulk insert on the caller's connection or transaction.
    ///
    /// Batches of 100 rows (5 columns each) stay under SQLite's bound
    /// parameter limit. A link that already exists violates the UNIQUE
    /// constraint and fails the whole statement.
    pub(crate) async fn insert_items(
        conn: &mut SqliteConnection,
        items: &[NewFeedItem],
    ) -> Result<usize, DatabaseError> {
        const BATCH_SIZE: usize = 100;
        let mut inserted = 0usize;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO feed_items (source_id, title, description, link, pub_date) ",
            );

            builder.push_values(chunk, |mut b, item| {
                b.push_bind(item.source_id)
                    .push_bind(&item.title)
                    .push_bind(&item.description)
                    .push_bind(&item.link)
                    .push_bind(item.pub_date);
            });

            let result = builder.build().execute(&mut *conn).await?;
            inserted += result.rows_affected() as usize;
        }

        Ok(inserted)
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// One page of items, newest publish date first.
    ///
    /// `page` is zero-based. `size` is clamped to `1..=MAX_PAGE_SIZE`. Items
    /// sharing a publish date come back newest insert first.
    pub async fn list_items_paged(&self, page: u32, size: u32) -> Result<ItemPage, DatabaseError> {
        let size = size.clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page) * i64::from(size);

        let (total_items,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feed_items")
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, FeedItem>(
            r#"
            SELECT id, source_id, title, description, link, pub_date
            FROM feed_items
            ORDER BY pub_date DESC, id DESC
            LIMIT ? OFFSET ?
        "#,
        )
        .bind(i64::from(size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let size_i64 = i64::from(size);
        Ok(ItemPage {
            page,
            size,
            total_items,
            total_pages: (total_items + size_i64 - 1) / size_i64,
            items,
        })
    }

    /// All items owned by one source, newest first
    pub async fn items_for_source(&self, source_id: i64) -> Result<Vec<FeedItem>, DatabaseError> {
        let items = sqlx::query_as::<_, FeedItem>(
            r#"
            SELECT id, source_id, title, description, link, pub_date
            FROM feed_items
            WHERE source_id = ?
            ORDER BY pub_date DESC, id DESC
        "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}
