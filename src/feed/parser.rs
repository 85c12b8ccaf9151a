use chrono::{DateTime, Utc};
use feed_rs::model::Link;
use feed_rs::parser;

/// One entry as the feed document declares it, before any cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    /// The entry's alternate link (or first link if none is marked), as written
    pub link: Option<String>,
    /// Summary or content body, possibly HTML
    pub body: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// Parse an RSS, Atom, or JSON Feed document into its entries, in document order.
///
/// All-or-nothing: a document that does not parse yields an error and no
/// entries.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<RawEntry>, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry_link(entry.links);
            let body = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));

            RawEntry {
                title: entry.title.map(|t| t.content),
                link,
                body,
                published: entry.published,
            }
        })
        .collect();

    Ok(entries)
}

/// Atom entries may list `replies`, `edit` or `self` links ahead of the
/// page itself. Prefer an unmarked or `alternate` link.
fn entry_link(links: Vec<Link>) -> Option<String> {
    let index = links
        .iter()
        .position(|l| {
            l.rel
                .as_deref()
                .map_or(true, |rel| rel.eq_ignore_ascii_case("alternate"))
        })
        .unwrap_or(0);
    links.into_iter().nth(index).map(|l| l.href)
}
