use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::storage::NewFeedSource;
use crate::util::validate_url;

/// Maximum allowed nesting depth for OPML outline elements.
/// Deeper documents are rejected rather than walked.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur during OPML import.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// OPML nesting depth exceeds the safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// File I/O error.
    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads an OPML subscription list and returns the feed sources it names.
///
/// Every `<outline>` carrying an `xmlUrl` becomes one source, at any nesting
/// depth. The source name comes from `title`, then `text`, then the URL
/// itself. Outlines whose URL fails validation (non-HTTP schemes, localhost,
/// private networks) are skipped with a warning, and a URL listed twice is
/// kept at its first occurrence.
///
/// # Security
///
/// `quick-xml` (0.37) does not parse `<!ENTITY>` declarations, so custom
/// entities in a DOCTYPE are never expanded; references to them fail with an
/// unrecognized-entity error.
pub async fn import_opml(path: &Path) -> Result<Vec<NewFeedSource>, OpmlError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_opml_content(&content)
}

/// Parses OPML content into feed sources. See [`import_opml`].
pub fn parse_opml_content(content: &str) -> Result<Vec<NewFeedSource>, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut sources = Vec::new();
    let mut seen = HashSet::new();
    let mut buf = Vec::new();
    let mut depth: usize = 0;

    loop {
        let outline = match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                depth += 1;
                if depth > MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }
                parse_outline(&e, &reader)?
            }
            // Self-closing outline doesn't affect depth
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => parse_outline(&e, &reader)?,
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                depth = depth.saturating_sub(1);
                None
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => None,
        };

        if let Some(source) = outline {
            if seen.insert(source.url.clone()) {
                sources.push(source);
            } else {
                tracing::debug!(url = %source.url, "Duplicate feed URL in OPML");
            }
        }
        buf.clear();
    }

    Ok(sources)
}

/// `Some` for an outline with a valid `xmlUrl`, `None` for folders and
/// rejected URLs.
fn parse_outline(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Option<NewFeedSource>, OpmlError> {
    let mut xml_url = None;
    let mut title = None;
    let mut text = None;
    let decoder = reader.decoder();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let slot = match attr.key.as_ref() {
            b"xmlUrl" => &mut xml_url,
            b"title" => &mut title,
            b"text" => &mut text,
            _ => continue,
        };
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| OpmlError::XmlParse(e.to_string()))?;
        *slot = Some(value.trim().to_string());
    }

    let Some(url) = xml_url else {
        return Ok(None);
    };

    if let Err(e) = validate_url(&url) {
        tracing::warn!(url = %url, error = %e, "Skipping invalid feed URL");
        return Ok(None);
    }

    let name = title
        .filter(|t| !t.is_empty())
        .or_else(|| text.filter(|t| !t.is_empty()))
        .unwrap_or_else(|| url.clone());

    Ok(Some(NewFeedSource { name, url }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_opml_content() {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Test Feeds</title></head>
  <body>
    <outline text="News" title="News">
      <outline type="rss" text="Example Wire" title="Example Wire" xmlUrl="https://example.com/feed.xml" htmlUrl="https://example.com"/>
      <outline type="rss" text="Second" title="Second" xmlUrl="https://second.example.org/rss"/>
    </outline>
  </body>
</opml>"#;

        let sources = parse_opml_content(content).unwrap();
        assert_eq!(
            sources,
            vec![
                NewFeedSource {
                    name: "Example Wire".to_string(),
                    url: "https://example.com/feed.xml".to_string(),
                },
                NewFeedSource {
                    name: "Second".to_string(),
                    url: "https://second.example.org/rss".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_name_fallbacks() {
        let content = r#"<?xml version="1.0"?>
<opml version="2.0">
  <body>
    <outline type="rss" text="Text Only" xmlUrl="https://textonly.com/feed"/>
    <outline type="rss" title="" text="Blank Title" xmlUrl="https://blank.com/feed"/>
    <outline type="rss" xmlUrl="https://notitle.com/feed"/>
  </body>
</opml>"#;

        let sources = parse_opml_content(content).unwrap();
        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Text Only", "Blank Title", "https://notitle.com/feed"]
        );
    }

    #[test]
    fn test_duplicate_urls_keep_first() {
        let content = r#"<?xml version="1.0"?>
    <opml version="2.0"><body>
        <outline text="First" xmlUrl="https://dup.example.com/feed"/>
        <outline text="Second" xmlUrl="https://dup.example.com/feed"/>
    </body></opml>"#;

        let sources = parse_opml_content(content).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "First");
    }

    #[test]
    fn test_skip_rejected_urls() {
        let content = r#"<?xml version="1.0"?>
    <opml version="2.0"><body>
        <outline xmlUrl="https://valid.com/feed"/>
        <outline xmlUrl="http://192.168.1.1/feed"/>
        <outline xmlUrl="http://localhost/feed"/>
        <outline xmlUrl="file:///etc/passwd"/>
        <outline xmlUrl="not a url"/>
    </body></opml>"#;

        let sources = parse_opml_content(content).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].url, "https://valid.com/feed");
    }

    #[test]
    fn test_empty_opml() {
        let content = r#"<?xml version="1.0"?>
    <opml version="2.0"><body></body></opml>"#;

        assert!(parse_opml_content(content).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_xml_error() {
        let result = parse_opml_content("<not valid xml");
        assert!(matches!(result, Err(OpmlError::XmlParse(_))));
    }

    #[test]
    fn test_entity_declarations_not_expanded() {
        let opml = r#"<?xml version="1.0"?>
<!DOCTYPE opml [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<opml version="2.0">
    <body>
        <outline text="&xxe;" xmlUrl="https://example.com/feed.xml"/>
    </body>
</opml>"#;

        // Rejection is the expected outcome; a literal title is also acceptable
        if let Ok(sources) = parse_opml_content(opml) {
            for source in &sources {
                assert!(!source.name.contains("root:"), "Entity expanded: {}", source.name);
            }
        }
    }

    #[test]
    fn test_deeply_nested_opml_rejected() {
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        for _ in 0..100 {
            opml.push_str(r#"<outline text="level">"#);
        }
        for _ in 0..100 {
            opml.push_str("</outline>");
        }
        opml.push_str("</body></opml>");

        let result = parse_opml_content(&opml);
        assert!(matches!(result, Err(OpmlError::MaxDepthExceeded(50))));
    }

    #[test]
    fn test_nesting_at_depth_limit_allowed() {
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        for _ in 0..50 {
            opml.push_str(r#"<outline text="level">"#);
        }
        opml.push_str(r#"<outline text="Deep Feed" xmlUrl="https://deep.example.com/feed"/>"#);
        for _ in 0..50 {
            opml.push_str("</outline>");
        }
        opml.push_str("</body></opml>");

        let sources = parse_opml_content(&opml).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "Deep Feed");
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let result = import_opml(Path::new("/nonexistent/newswire/subscriptions.opml")).await;
        assert!(matches!(result, Err(OpmlError::Io(_))));
    }
}
