use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("Database is locked by another process. Is another newswire instance running?")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The source row the operation targets does not exist
    #[error("Feed source {0} not found")]
    SourceNotFound(i64),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Map a sqlx error, recognising SQLite lock contention
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::Locked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface
/// as one of these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("database is locked")
        || lower.contains("database table is locked")
        || lower.contains("sqlite_busy")
        || lower.contains("sqlite_locked")
        || lower.contains("unable to open database file")
}

// ============================================================================
// Input Types
// ============================================================================

/// A source to register, before it has an id or checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedSource {
    pub name: String,
    pub url: String,
}

/// An item ready to be written: normalized, sanitized, and owned by a source.
///
/// Produced by the entry normalizer and filtered by the deduplication step
/// before it ever reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedItem {
    pub source_id: i64,
    pub title: String,
    pub description: String,
    /// Literal link from the feed; the global deduplication key
    pub link: String,
    /// Local civil time, no zone
    pub pub_date: NaiveDateTime,
}

// ============================================================================
// Data Structures
// ============================================================================

/// A configured feed and its ingestion checkpoint.
///
/// `last_checked` marks the last cycle that actually added items, not the
/// last attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FeedSource {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub last_checked: NaiveDateTime,
}

/// A stored feed item. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FeedItem {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: NaiveDateTime,
}

/// One page of items, newest first
#[derive(Debug, Clone, Serialize)]
pub struct ItemPage {
    /// Zero-based page number
    pub page: u32,
    pub size: u32,
    pub total_items: i64,
    pub total_pages: i64,
    pub items: Vec<FeedItem>,
}
