use std::borrow::Cow;

/// Ellipsis appended when text is cut short
const ELLIPSIS: &str = "...";

/// Truncates a string to at most `max_chars` Unicode scalar values.
///
/// If truncation is necessary the result ends in "..." and the ellipsis counts
/// toward the limit. Counting is by `char`, not bytes, so multi-byte text is
/// never split mid-codepoint.
///
/// - `max_chars == 0` returns `""`
/// - `max_chars <= 3` returns the first `max_chars` characters without ellipsis
/// - A string that already fits is returned borrowed
///
/// # Examples
///
/// ```
/// use feedcast::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 8), "Hello...");
/// assert_eq!(truncate_chars("你好世界你好", 5), "你好...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    // Byte offset of the (max_chars + 1)th char, if the string is that long
    let Some((overflow_at, _)) = s.char_indices().nth(max_chars) else {
        return Cow::Borrowed(s);
    };

    if max_chars <= ELLIPSIS.len() {
        return Cow::Owned(s[..overflow_at].to_string());
    }

    let keep = max_chars - ELLIPSIS.len();
    let cut = s.char_indices().nth(keep).map_or(s.len(), |(idx, _)| idx);
    Cow::Owned(format!("{}{}", s[..cut].trim_end(), ELLIPSIS))
}

/// Collapses every run of whitespace (including newlines) into a single space
/// and trims both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tags whose boundaries separate words.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "img", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Removes HTML/XML tags, leaving only text content.
///
/// This is a lexical pass, not a parser: anything between `<` and the next `>`
/// is dropped. Block-level tags become a space so words on either side of
/// `<br>` or `</p>` do not run together; inline tags vanish, so `H<sub>2</sub>O`
/// stays `H2O`. Entities are left untouched; decode them afterwards with
/// `html_escape::decode_html_entities`.
pub fn strip_html_tags(s: &str) -> Cow<'_, str> {
    if !s.contains('<') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut tag = String::new();
    let mut in_tag = false;

    for c in s.chars() {
        match (in_tag, c) {
            (false, '<') => {
                in_tag = true;
                tag.clear();
            }
            (false, c) => out.push(c),
            (true, '>') => {
                in_tag = false;
                if is_block_tag(&tag) {
                    out.push(' ');
                }
            }
            (true, c) => tag.push(c),
        }
    }

    Cow::Owned(out)
}

fn is_block_tag(tag: &str) -> bool {
    let name: String = tag
        .trim_start_matches('/')
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    BLOCK_TAGS.contains(&name.as_str())
}

/// Strips control characters and ANSI escape sequences from feed-supplied text.
///
/// Chat APIs reject or mangle messages containing raw C0 control bytes, which
/// occasionally leak through from badly encoded feeds.
///
/// Strips ASCII control chars (except tab, newline, carriage return), DEL,
/// CSI sequences (`ESC [` ... final byte 0x40-0x7E) and bare ESC.
///
/// Returns `Cow::Borrowed` when the input is already clean.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_stripped = |c: char| c == '\u{7f}' || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'));

    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                chars.next();
                // Skip parameter bytes through the final byte
                for next in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&next) {
                        break;
                    }
                }
            }
            continue;
        }
        if is_stripped(c) {
            continue;
        }
        out.push(c);
    }

    Cow::Owned(out)
}

/// Turns a feed summary (often an HTML fragment) into single-line plain text.
///
/// Order: strip tags, decode entities, strip control characters, collapse
/// whitespace. The result is unescaped plain text.
pub fn summary_to_plain_text(summary: &str) -> String {
    let without_tags = strip_html_tags(summary);
    let decoded = html_escape::decode_html_entities(&without_tags);
    let clean = strip_control_chars(&decoded);
    collapse_whitespace(&clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_fits_is_borrowed() {
        let result = truncate_chars("Short", 5);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, "Short");
    }

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate_chars("Hello World", 8), "Hello...");
        assert_eq!(truncate_chars("Hello World", 8).chars().count(), 8);
    }

    #[test]
    fn test_truncate_multibyte() {
        let s = "日本語のテキストです";
        let result = truncate_chars(s, 6);
        assert_eq!(result, "日本語...");
        assert_eq!(result.chars().count(), 6);
    }

    #[test]
    fn test_truncate_trims_trailing_space_before_ellipsis() {
        assert_eq!(truncate_chars("abcd efgh ijkl", 8), "abcd...");
    }

    #[test]
    fn test_truncate_narrow_widths() {
        assert_eq!(truncate_chars("Test", 0), "");
        assert_eq!(truncate_chars("Testing", 2), "Te");
        assert_eq!(truncate_chars("Testing", 3), "Tes");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a\n\n b\t c  "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_strip_html_tags() {
        assert_eq!(strip_html_tags("plain"), "plain");
        assert_eq!(
            collapse_whitespace(&strip_html_tags("<p>Hello<br/>world</p>")),
            "Hello world"
        );
        assert_eq!(
            collapse_whitespace(&strip_html_tags(r#"<a href="x">link</a> text"#)),
            "link text"
        );
    }

    #[test]
    fn test_strip_html_tags_inline_tags_do_not_split_words() {
        assert_eq!(strip_html_tags("H<sub>2</sub>O"), "H2O");
        assert_eq!(strip_html_tags("<b>bold</b>face"), "boldface");
        assert_eq!(strip_html_tags("one<BR>two"), "one two");
        assert_eq!(strip_html_tags("a</LI><li>b"), "a  b");
    }

    #[test]
    fn test_strip_control_chars() {
        assert!(matches!(strip_control_chars("clean\ttext\n"), Cow::Borrowed(_)));
        assert_eq!(strip_control_chars("a\u{0}b\u{8}c"), "abc");
        assert_eq!(strip_control_chars("\u{1b}[31mred\u{1b}[0m"), "red");
        assert_eq!(strip_control_chars("del\u{7f}eted"), "deleted");
    }

    #[test]
    fn test_summary_to_plain_text() {
        let html = "<p>Tom &amp; Jerry</p>\n<p>  are &lt;back&gt;  </p>";
        assert_eq!(summary_to_plain_text(html), "Tom & Jerry are <back>");
    }
}
