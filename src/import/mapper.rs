//! Raw feed item → canonical [`JobRecord`].
//!
//! All unwrapping of the loosely-typed [`RawValue`] tree happens here; the
//! record that comes out is strictly typed and every optional field has a
//! default.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::models::JobRecord;
use crate::error::ItemError;
use crate::feed::{RawItem, RawValue};

pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_COMPANY: &str = "Unknown Company";
pub const DEFAULT_LOCATION: &str = "Remote";
pub const DEFAULT_DESCRIPTION: &str = "No description provided";

const FALLBACK_SLUG: &str = "job";
const RANDOM_SUFFIX_LEN: usize = 6;

const COMPANY_FIELDS: [&str; 3] = ["dc:creator", "author", "creator"];
const LOCATION_FIELDS: [&str; 2] = ["location", "job_listing:location"];

/// Map one raw item into a job record, using `now` for any time-based
/// fallback (missing publish date, synthesized identity).
///
/// # Errors
///
/// Returns [`ItemError::InvalidItem`] if no identity could be derived.
pub fn map_item(item: &RawItem, now: DateTime<Utc>) -> Result<JobRecord, ItemError> {
    let identity = derive_identity(item, now);
    if identity.trim().is_empty() {
        return Err(ItemError::InvalidItem(
            "item produced an empty identity".to_string(),
        ));
    }

    let title = text_field(item, "title");

    Ok(JobRecord {
        identity,
        title: title.unwrap_or(DEFAULT_TITLE).to_string(),
        company: first_of(item, &COMPANY_FIELDS)
            .unwrap_or(DEFAULT_COMPANY)
            .to_string(),
        location: first_of(item, &LOCATION_FIELDS)
            .unwrap_or(DEFAULT_LOCATION)
            .to_string(),
        description: text_field(item, "description")
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string(),
        link: text_field(item, "link").unwrap_or_default().to_string(),
        published: text_field(item, "pubdate")
            .and_then(parse_published)
            .unwrap_or(now),
    })
}

/// guid, then link, then a synthesized `<slug>-<millis>-<random>` key.
pub fn derive_identity(item: &RawItem, now: DateTime<Utc>) -> String {
    if let Some(guid) = text_field(item, "guid") {
        return guid.to_string();
    }
    if let Some(link) = text_field(item, "link") {
        return link.to_string();
    }

    let slug = text_field(item, "title")
        .map(slugify)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_SLUG.to_string());
    format!("{slug}-{}-{}", now.timestamp_millis(), random_suffix())
}

fn text_field<'a>(item: &'a RawItem, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(RawValue::first_text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn first_of<'a>(item: &'a RawItem, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| text_field(item, key))
}

fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn slugify(input: &str) -> String {
    input
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;

    use super::*;
    use crate::feed::TEXT_KEY;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 18, 9, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    fn text(value: &str) -> RawValue {
        RawValue::List(vec![RawValue::Text(value.to_string())])
    }

    fn item(fields: &[(&str, RawValue)]) -> RawItem {
        fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn guid_wins_over_link() {
        let raw = item(&[
            ("guid", text("  guid-1 ")),
            ("link", text("https://example.com/1")),
        ]);
        assert_eq!(derive_identity(&raw, now()), "guid-1");
    }

    #[test]
    fn guid_is_unwrapped_from_attribute_map() {
        let mut map = BTreeMap::new();
        map.insert(TEXT_KEY.to_string(), RawValue::Text("wrapped-guid".into()));
        map.insert("isPermaLink".to_string(), text("false"));
        let raw = item(&[("guid", RawValue::List(vec![RawValue::Map(map)]))]);
        assert_eq!(derive_identity(&raw, now()), "wrapped-guid");
    }

    #[test]
    fn blank_guid_falls_through_to_link() {
        let raw = item(&[
            ("guid", text("   ")),
            ("link", text(" https://example.com/2 ")),
        ]);
        assert_eq!(derive_identity(&raw, now()), "https://example.com/2");
    }

    #[test]
    fn identity_is_deterministic_for_natural_keys() {
        let raw = item(&[("link", text("https://example.com/3"))]);
        let first = map_item(&raw, now()).expect("maps");
        let second = map_item(&raw, now()).expect("maps");
        assert_eq!(first.identity, second.identity);
    }

    #[test]
    fn synthesized_identity_uses_title_slug_time_and_suffix() {
        let raw = item(&[("title", text("Senior Rust Engineer (Remote)"))]);
        let identity = derive_identity(&raw, now());
        let prefix = format!("senior-rust-engineer-remote-{}-", now().timestamp_millis());
        assert!(identity.starts_with(&prefix), "got {identity}");
        assert_eq!(identity.len(), prefix.len() + RANDOM_SUFFIX_LEN);
    }

    #[test]
    fn synthesized_identity_without_title_uses_placeholder() {
        let identity = derive_identity(&RawItem::new(), now());
        assert!(identity.starts_with("job-"));
        assert_ne!(identity, derive_identity(&RawItem::new(), now()));
    }

    #[test]
    fn link_only_item_gets_every_default() {
        let raw = item(&[("link", text("https://example.com/4"))]);
        let record = map_item(&raw, now()).expect("maps");
        assert_eq!(record.title, DEFAULT_TITLE);
        assert_eq!(record.company, DEFAULT_COMPANY);
        assert_eq!(record.location, DEFAULT_LOCATION);
        assert_eq!(record.description, DEFAULT_DESCRIPTION);
        assert_eq!(record.link, "https://example.com/4");
        assert_eq!(record.published, now());
    }

    #[test]
    fn company_comes_from_creator_fields() {
        let raw = item(&[
            ("link", text("https://example.com/5")),
            ("author", text("Fallback Author")),
            ("dc:creator", text("Acme")),
        ]);
        assert_eq!(map_item(&raw, now()).expect("maps").company, "Acme");

        let raw = item(&[
            ("link", text("https://example.com/5")),
            ("author", text("Fallback Author")),
        ]);
        assert_eq!(map_item(&raw, now()).expect("maps").company, "Fallback Author");
    }

    #[test]
    fn parses_rfc2822_publish_date() {
        let raw = item(&[
            ("link", text("https://example.com/6")),
            ("pubdate", text("Tue, 07 Oct 2025 10:00:00 +0200")),
        ]);
        let record = map_item(&raw, now()).expect("maps");
        assert_eq!(
            record.published,
            Utc.with_ymd_and_hms(2025, 10, 7, 8, 0, 0).single().expect("ts")
        );
    }

    #[test]
    fn unparseable_publish_date_falls_back_to_now() {
        let raw = item(&[
            ("link", text("https://example.com/7")),
            ("pubdate", text("sometime last week")),
        ]);
        assert_eq!(map_item(&raw, now()).expect("maps").published, now());
    }

    #[test]
    fn bare_angle_in_title_keeps_stable_identity() {
        let items = crate::feed::normalize(
            "<rss><channel><item><title>Salary < 50k</title>\
             <link>https://jobs.test/42</link><guid>job-42</guid></item></channel></rss>",
        )
        .expect("feed parses");

        let first = map_item(&items[0], now()).expect("maps");
        let second = map_item(&items[0], now()).expect("maps");
        assert_eq!(first.identity, "job-42");
        assert_eq!(second.identity, first.identity);
        assert_eq!(first.title, "Salary < 50k");
        assert_eq!(first.link, "https://jobs.test/42");
    }
}
