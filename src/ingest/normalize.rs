use chrono::{Local, NaiveDateTime};

use crate::feed::RawEntry;
use crate::storage::{FeedSource, NewFeedItem};
use crate::util::{normalize_title, sanitize_html, truncate_chars};

/// A normalized entry that has not yet been checked against the store.
pub type CandidateItem = NewFeedItem;

/// Longest description kept, in characters
pub const DEFAULT_MAX_DESCRIPTION_CHARS: usize = 5000;

/// Turns raw feed entries into storable items.
#[derive(Debug, Clone, Copy)]
pub struct EntryNormalizer {
    max_description_chars: usize,
}

impl Default for EntryNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DESCRIPTION_CHARS)
    }
}

impl EntryNormalizer {
    pub fn new(max_description_chars: usize) -> Self {
        Self {
            max_description_chars,
        }
    }

    /// Normalize one entry for `source`.
    ///
    /// - title: trimmed, empty when absent
    /// - description: body with markup stripped, bounded in length
    /// - link: copied verbatim, empty when absent
    /// - publish date: the entry's own timestamp in local time, or the time of
    ///   this call when the feed gives none
    ///
    /// Never fails. An entirely empty entry yields an item of empty strings.
    pub fn normalize(&self, entry: RawEntry, source: &FeedSource) -> CandidateItem {
        self.normalize_at(entry, source.id, Local::now().naive_local())
    }

    fn normalize_at(&self, entry: RawEntry, source_id: i64, now: NaiveDateTime) -> CandidateItem {
        let description = entry.body.as_deref().map(sanitize_html).unwrap_or_default();
        let description = truncate_chars(&description, self.max_description_chars).into_owned();

        let pub_date = entry
            .published
            .map(|published| published.with_timezone(&Local).naive_local())
            .unwrap_or(now);

        CandidateItem {
            source_id,
            title: normalize_title(entry.title.as_deref()),
            description,
            link: entry.link.unwrap_or_default(),
            pub_date,
        }
    }
}
