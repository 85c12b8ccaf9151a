//! SQLite item store.
//!
//! Holds the configured feed sources with their checkpoints and every item
//! ever ingested. Item links are unique across the whole store. The only
//! multi-statement write is [`Database::commit_new_items`], which inserts a
//! cycle's items and moves the source checkpoint in one transaction.

mod items;
mod schema;
mod sources;
mod types;

pub use items::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use schema::Database;
pub use types::{DatabaseError, FeedItem, FeedSource, ItemPage, NewFeedItem, NewFeedSource};
