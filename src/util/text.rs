use std::borrow::Cow;

use scraper::{ElementRef, Html, Node};

/// Elements whose text content is never shown to a reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "template", "noscript", "head", "title"];

/// Elements that break the flow of text. Their boundaries become word
/// separators so `<p>one</p><p>two</p>` reads as "one two", not "onetwo".
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Strips all markup from an HTML fragment and returns its visible text.
///
/// Text nodes are concatenated in document order, entities are decoded, and
/// terminal control characters are dropped, and then runs of whitespace
/// collapse to a single space with the ends trimmed.
///
/// Malformed markup never fails: the HTML5 parser recovers the same way a
/// browser would and whatever text it finds is returned.
///
/// # Examples
///
/// ```
/// use newswire::util::sanitize_html;
///
/// assert_eq!(sanitize_html("<p>Hello <b>World</b></p>"), "Hello World");
/// assert_eq!(sanitize_html(""), "");
/// assert_eq!(sanitize_html("Fish &amp; Chips"), "Fish & Chips");
/// ```
pub fn sanitize_html(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(raw);
    let mut text = String::with_capacity(raw.len());
    push_visible_text(fragment.root_element(), &mut text);

    strip_control_chars(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if HIDDEN_ELEMENTS.contains(&name) {
                    continue;
                }
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                let is_block = BLOCK_ELEMENTS.contains(&name);
                if is_block {
                    out.push(' ');
                }
                push_visible_text(child_ref, out);
                if is_block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Trims leading and trailing whitespace from an entry title.
///
/// A missing title becomes an empty string. Interior whitespace is left
/// as-is.
pub fn normalize_title(raw: Option<&str>) -> String {
    raw.map(|t| t.trim().to_string()).unwrap_or_default()
}

/// Cuts `s` to at most `max_chars` characters, always on a char boundary.
/// The kept prefix is returned unchanged, trailing whitespace included.
///
/// Returns `Cow::Borrowed` when the string already fits.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(s[..byte_idx].to_string()),
        None => Cow::Borrowed(s),
    }
}

/// Strip terminal control characters and ANSI escape sequences from text.
///
/// Feed bodies occasionally carry raw escape sequences; stored descriptions
/// are plain text and must be safe to print.
///
/// Strips:
/// - ASCII control chars: 0x00-0x08, 0x0B-0x0C, 0x0E-0x1F, 0x7F
/// - ANSI CSI sequences: `\x1b[` ... (terminal byte 0x40-0x7E)
/// - ANSI OSC sequences: `\x1b]` ... (until BEL 0x07 or ST `\x1b\\`)
/// - Bare ESC (0x1b) not followed by `[` or `]`
///
/// Preserves: tab (0x09), newline (0x0A), carriage return (0x0D).
///
/// Returns `Cow::Borrowed` when the input contains no control characters (common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let len = bytes.len();

    let needs_strip = bytes.iter().any(|&b| is_stripped_byte(b));
    if !needs_strip {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];

        if b == 0x1b {
            if i + 1 < len && bytes[i + 1] == b'[' {
                // CSI: parameter bytes up to and including the final byte
                i += 2;
                while i < len {
                    let c = bytes[i];
                    i += 1;
                    if (0x40..=0x7e).contains(&c) {
                        break;
                    }
                }
            } else if i + 1 < len && bytes[i + 1] == b']' {
                // OSC: everything until BEL or ST
                i += 2;
                while i < len {
                    if bytes[i] == 0x07 {
                        i += 1;
                        break;
                    }
                    if bytes[i] == 0x1b && i + 1 < len && bytes[i + 1] == b'\\' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            } else {
                i += 1;
            }
        } else if is_stripped_byte(b) {
            i += 1;
        } else {
            let start = i;
            i += 1;
            while i < len && !is_stripped_byte(bytes[i]) {
                i += 1;
            }
            // SAFETY: we only stop on ASCII control bytes, which cannot appear
            // mid-codepoint in valid UTF-8, so s[start..i] is valid UTF-8.
            out.push_str(&s[start..i]);
        }
    }

    Cow::Owned(out)
}

#[inline]
fn is_stripped_byte(b: u8) -> bool {
    b == 0x1b || b == 0x7f || (b < 0x20 && b != 0x09 && b != 0x0a && b != 0x0d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ========================================================================
    // sanitize_html
    // ========================================================================

    #[test]
    fn test_sanitize_nested_markup() {
        assert_eq!(sanitize_html("<p>Hello <b>World</b></p>"), "Hello World");
    }

    #[test]
    fn test_sanitize_empty_and_blank() {
        assert_eq!(sanitize_html(""), "");
        assert_eq!(sanitize_html("   \n\t "), "");
    }

    #[test]
    fn test_sanitize_plain_text_untouched() {
        assert_eq!(sanitize_html("Just some text."), "Just some text.");
    }

    #[test]
    fn test_sanitize_inline_tags_do_not_split_words() {
        assert_eq!(sanitize_html("Wor<b>ld</b>wide"), "Worldwide");
    }

    #[test]
    fn test_sanitize_block_tags_separate_words() {
        assert_eq!(sanitize_html("<p>one</p><p>two</p>"), "one two");
        assert_eq!(sanitize_html("first<br>second"), "first second");
        assert_eq!(
            sanitize_html("<ul><li>a</li><li>b</li></ul>"),
            "a b"
        );
    }

    #[test]
    fn test_sanitize_decodes_entities() {
        assert_eq!(sanitize_html("Fish &amp; Chips &lt;3"), "Fish & Chips <3");
    }

    #[test]
    fn test_sanitize_drops_images_and_scripts() {
        let html = r#"<img src="x.png" alt="pic"><script>alert('x')</script><style>p{}</style>Caption"#;
        assert_eq!(sanitize_html(html), "Caption");
    }

    #[test]
    fn test_sanitize_malformed_markup_best_effort() {
        assert_eq!(sanitize_html("<p>unclosed <b>bold"), "unclosed bold");
        assert_eq!(sanitize_html("text</div></span>"), "text");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(
            sanitize_html("  <div>\n  spaced \t  out\n</div>  "),
            "spaced out"
        );
    }

    #[test]
    fn test_sanitize_strips_escape_sequences() {
        assert_eq!(sanitize_html("<p>\x1b[31mred\x1b[0m</p>"), "red");
    }

    #[test]
    fn test_sanitize_control_char_between_spaces_leaves_one_space() {
        assert_eq!(sanitize_html("a \x1b b"), "a b");
        assert_eq!(sanitize_html("<p>one \x07\x7f two</p>"), "one two");
    }

    // ========================================================================
    // normalize_title
    // ========================================================================

    #[test]
    fn test_normalize_title_trims() {
        assert_eq!(normalize_title(Some("  Title  ")), "Title");
        assert_eq!(normalize_title(Some("\n\tBreaking news \n")), "Breaking news");
    }

    #[test]
    fn test_normalize_title_absent() {
        assert_eq!(normalize_title(None), "");
    }

    #[test]
    fn test_normalize_title_keeps_interior_whitespace() {
        assert_eq!(normalize_title(Some(" a  b ")), "a  b");
    }

    // ========================================================================
    // truncate_chars
    // ========================================================================

    #[test]
    fn test_truncate_chars_fits() {
        let result = truncate_chars("short", 10);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, "short");
    }

    #[test]
    fn test_truncate_chars_exact_fit() {
        assert_eq!(truncate_chars("12345", 5), "12345");
    }

    #[test]
    fn test_truncate_chars_cuts_on_char_boundary() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn test_truncate_chars_keeps_trailing_whitespace_at_cut() {
        assert_eq!(truncate_chars("ab cd", 3), "ab ");
    }

    #[test]
    fn test_truncate_chars_zero() {
        assert_eq!(truncate_chars("anything", 0), "");
    }

    // ========================================================================
    // strip_control_chars
    // ========================================================================

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "Hello, world! This is clean text.";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_preserves_tabs_newlines_cr() {
        let input = "line1\nline2\ttabbed\r\nwindows";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_control_chars_removes_controls() {
        let input = "he\x00ll\x07o\x08 w\x0bor\x0cld\x01!";
        assert_eq!(strip_control_chars(input), "hello world!");
    }

    #[test]
    fn test_strip_ansi_and_osc() {
        assert_eq!(strip_control_chars("\x1b[31mRed text\x1b[0m"), "Red text");
        assert_eq!(
            strip_control_chars("\x1b]0;malicious title\x07safe text"),
            "safe text"
        );
        assert_eq!(
            strip_control_chars("\x1b]0;malicious title\x1b\\safe text"),
            "safe text"
        );
    }

    #[test]
    fn test_strip_bare_esc_and_del() {
        assert_eq!(strip_control_chars("before\x1bafter"), "beforeafter");
        assert_eq!(strip_control_chars("delete\x7fme"), "deleteme");
    }
}
