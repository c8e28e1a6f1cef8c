//! Feed retrieval and normalization into loosely-typed raw items.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

pub mod fetch;
pub mod parser;
pub mod sanitize;

pub use fetch::{FeedSource, HttpFeedConfig, HttpFeedSource};

/// Key under which an element's own text lives once it also carries
/// attributes or children.
pub const TEXT_KEY: &str = "_";

/// One value inside a raw feed item.
///
/// Child elements always land in a `List` (fields may legitimately repeat),
/// elements with attributes or children become a `Map`, and plain leaf
/// elements are `Text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Text(String),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

/// A raw `<item>` keyed by lower-cased child element name.
pub type RawItem = BTreeMap<String, RawValue>;

impl RawValue {
    /// First textual value reachable through single-element wrapping.
    ///
    /// `List` yields its first element's text, `Map` yields its `_` text.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(text) => Some(text.as_str()),
            RawValue::List(values) => values.first().and_then(RawValue::first_text),
            RawValue::Map(map) => map.get(TEXT_KEY).and_then(RawValue::first_text),
        }
    }

    pub fn as_list(&self) -> Option<&[RawValue]> {
        match self {
            RawValue::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, RawValue>> {
        match self {
            RawValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

/// Sanitize and leniently parse feed text, returning the channel's items.
///
/// Documents without an `rss → channel → item` path yield no items.
///
/// # Errors
///
/// Returns [`FeedError::Malformed`] when the cleaned text still cannot be
/// read as XML.
pub fn normalize(text: &str) -> Result<Vec<RawItem>, FeedError> {
    let cleaned = sanitize::sanitize(text);
    let (root_name, root) = parser::parse_document(&cleaned)?;
    if root_name != "rss" {
        return Ok(Vec::new());
    }
    Ok(channel_items(&root))
}

fn channel_items(root: &RawValue) -> Vec<RawItem> {
    let items = root
        .as_map()
        .and_then(|rss| rss.get("channel"))
        .and_then(RawValue::as_list)
        .and_then(|channels| channels.first())
        .and_then(RawValue::as_map)
        .and_then(|channel| channel.get("item"))
        .and_then(RawValue::as_list);

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| match item {
            RawValue::Map(map) => map.clone(),
            _ => RawItem::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Remote jobs</title>
    <item>
      <title>Senior Data Scientist</title>
      <link>https://jobs.example.com/123</link>
      <guid isPermaLink="false">job-123</guid>
      <dc:creator>Acme & Sons</dc:creator>
      <description>Python<br/>SQL & more</description>
      <pubDate>Tue, 07 Oct 2025 10:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Designer</title>
      <link>https://jobs.example.com/456</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn extracts_channel_items() {
        let items = normalize(FEED).expect("feed should parse");
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].get("title").and_then(RawValue::first_text),
            Some("Senior Data Scientist")
        );
        assert_eq!(
            items[1].get("link").and_then(RawValue::first_text),
            Some("https://jobs.example.com/456")
        );
    }

    #[test]
    fn bare_ampersand_survives_as_literal_text() {
        let items = normalize(FEED).expect("feed should parse");
        assert_eq!(
            items[0].get("dc:creator").and_then(RawValue::first_text),
            Some("Acme & Sons")
        );
        assert_eq!(
            items[0].get("description").and_then(RawValue::first_text),
            Some("Python SQL & more")
        );
    }

    #[test]
    fn guid_attributes_are_merged_with_text_under_underscore() {
        let items = normalize(FEED).expect("feed should parse");
        let guid = items[0].get("guid").expect("guid present");
        let first = guid.as_list().and_then(|l| l.first()).expect("list");
        let map = first.as_map().expect("guid with attribute is a map");
        assert_eq!(map.get(TEXT_KEY).and_then(RawValue::first_text), Some("job-123"));
        assert_eq!(map.get("isPermaLink").and_then(RawValue::first_text), Some("false"));
        assert_eq!(guid.first_text(), Some("job-123"));
    }

    #[test]
    fn bare_angle_in_text_keeps_sibling_fields() {
        let xml = "<rss><channel><item><title>Salary < 50k</title>\
                   <link>https://jobs.test/42</link><guid>job-42</guid></item></channel></rss>";
        let items = normalize(xml).expect("feed should parse");
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].get("title").and_then(RawValue::first_text),
            Some("Salary < 50k")
        );
        assert_eq!(
            items[0].get("link").and_then(RawValue::first_text),
            Some("https://jobs.test/42")
        );
        assert_eq!(items[0].get("guid").and_then(RawValue::first_text), Some("job-42"));
    }

    #[test]
    fn non_rss_document_yields_no_items() {
        let xml = r#"<feed><entry><title>Atom</title></entry></feed>"#;
        assert!(normalize(xml).expect("parses").is_empty());
    }

    #[test]
    fn channel_without_items_yields_no_items() {
        let xml = r#"<rss><channel><title>Empty</title></channel></rss>"#;
        assert!(normalize(xml).expect("parses").is_empty());
    }

    #[test]
    fn text_without_markup_is_malformed() {
        let err = normalize("this is not a feed").expect_err("no root element");
        assert!(matches!(err, FeedError::Malformed(_)));
    }

    #[test]
    fn raw_items_round_trip_through_json() {
        let items = normalize(FEED).expect("feed should parse");
        let json = serde_json::to_string(&items).expect("serialize");
        let back: Vec<RawItem> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(items, back);
    }
}
