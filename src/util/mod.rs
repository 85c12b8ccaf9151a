//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **Text processing**: HTML-to-text extraction, title trimming, and
//!   character-bounded truncation for stored feed items
//! - **URL validation**: Security-focused validation to prevent SSRF attacks
//!   when new feed sources are registered
//!
//! # Examples
//!
//! ```
//! use newswire::util::{normalize_title, sanitize_html, validate_url};
//!
//! assert_eq!(sanitize_html("<p>Hello <b>World</b></p>"), "Hello World");
//! assert_eq!(normalize_title(Some("  Title  ")), "Title");
//! assert!(validate_url("https://example.com/feed.xml").is_ok());
//! ```

mod text;
mod url_validator;

pub use text::{normalize_title, sanitize_html, strip_control_chars, truncate_chars};
pub use url_validator::{validate_url, UrlValidationError};
