//! Feed retrieval for RSS/Atom sources.
//!
//! - [`parser`] - Document parsing using the `feed-rs` crate
//! - [`fetcher`] - Single-attempt HTTP retrieval with timeout and size limit
//! - [`opml`] - OPML subscription list import
//!
//! # Example
//!
//! ```ignore
//! use newswire::feed::{FeedPoller, FetchOptions};
//!
//! let poller = FeedPoller::new(&FetchOptions::default())?;
//! let entries = poller.fetch("https://example.com/rss").await?;
//! ```

mod fetcher;
mod opml;
mod parser;

pub use fetcher::{
    FeedPoller, FetchError, FetchOptions, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FEED_BYTES,
};
pub use opml::{import_opml, parse_opml_content, OpmlError};
pub use parser::{parse_feed, RawEntry};
