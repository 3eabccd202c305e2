use feed_rs::model::{Entry as FeedEntry, Link};
use feed_rs::parser;
use serde::Serialize;

/// One item from a feed.
///
/// Created per fetch and never persisted; only its identity is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub title: String,
    pub link: Option<String>,
    pub summary: Option<String>,
    /// Unix seconds, from `published` falling back to `updated`
    pub published: Option<i64>,
    /// Feed title, falling back to its description, then its URL
    pub source_label: String,
}

/// Parses RSS, Atom or JSON Feed bytes into entries.
///
/// Entry order is preserved exactly as the document lists it. Entries with no
/// link and neither a title nor a summary carry nothing to identify them by and
/// are dropped; the count is returned alongside.
pub fn parse_feed(bytes: &[u8], feed_url: &str) -> Result<ParseResult, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let source_label = [feed.title.as_ref(), feed.description.as_ref()]
        .into_iter()
        .flatten()
        .map(|t| t.content.trim())
        .find(|s| !s.is_empty())
        .unwrap_or(feed_url)
        .to_string();

    let mut entries = Vec::with_capacity(feed.entries.len());
    let mut skipped = 0;

    for item in feed.entries {
        match convert_entry(item, &source_label) {
            Some(entry) => entries.push(entry),
            None => skipped += 1,
        }
    }

    Ok(ParseResult { entries, skipped })
}

/// Entries parsed from one document plus the number discarded as unidentifiable.
#[derive(Debug)]
pub struct ParseResult {
    pub entries: Vec<Entry>,
    pub skipped: usize,
}

fn convert_entry(item: FeedEntry, source_label: &str) -> Option<Entry> {
    let link = pick_link(&item.links);
    let published = item.published.or(item.updated).map(|dt| dt.timestamp());
    let summary = item
        .summary
        .map(|s| s.content)
        .or_else(|| item.content.and_then(|c| c.body))
        .filter(|s| !s.trim().is_empty());
    let title = item
        .title
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default();

    if link.is_none() && title.is_empty() && summary.is_none() {
        return None;
    }

    Some(Entry {
        title,
        link,
        summary,
        published,
        source_label: source_label.to_string(),
    })
}

/// Prefers the `alternate` (or untyped) link, the article itself, over
/// `self`/`enclosure`/`related` links.
fn pick_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
}
