//! Headless feed ingestion.
//!
//! Polls RSS/Atom sources on a wall-clock calendar, normalizes their entries
//! to plain text, drops anything already stored, and commits the rest to
//! SQLite together with the source's checkpoint.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
pub mod util;
