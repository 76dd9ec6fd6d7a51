use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::trust::{Algorithm, Signature};
use crate::version::SemVerLike;

/// OS tag assumed when a feed item does not name one.
pub const DEFAULT_OPERATING_SYSTEM: &str = "windows";

/// MIME type advertised for release artifacts unless overridden.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// One release entry in a feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    /// Display title, e.g. `Version 2.0`.
    #[serde(default)]
    pub title: String,
    /// Version string; parsed leniently through [`SemVerLike`]. Missing
    /// versions leave the item unversioned rather than rejecting the feed.
    #[serde(default)]
    pub version: String,
    /// Optional marketing version shown to users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_version: Option<String>,
    /// Release track tag, independent of the version suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// When the release was published.
    #[serde(rename = "pub_date", default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<DateTime<Utc>>,
    /// Where the artifact can be downloaded.
    #[serde(rename = "url", default)]
    pub download_link: String,
    /// Target operating system tag (`windows`, `linux`, `macos`, ...).
    #[serde(rename = "os", default = "default_os")]
    pub operating_system: String,
    /// Artifact size in bytes.
    #[serde(rename = "size", default)]
    pub length: u64,
    /// MIME type of the artifact.
    #[serde(rename = "type", default = "default_mime_type")]
    pub mime_type: String,
    /// Artifact signature as written in the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Link to human-readable release notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes_link: Option<String>,
    /// Inline release description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether clients should treat the update as mandatory.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_critical: bool,
}

fn default_os() -> String {
    DEFAULT_OPERATING_SYSTEM.to_string()
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FeedItem {
    /// Create an item with the required fields; everything optional is unset.
    pub fn new(
        title: impl Into<String>,
        version: impl Into<String>,
        download_link: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            short_version: None,
            channel: None,
            publication_date: None,
            download_link: download_link.into(),
            operating_system: default_os(),
            length: 0,
            mime_type: default_mime_type(),
            signature: None,
            release_notes_link: None,
            description: None,
            is_critical: false,
        }
    }

    /// Parsed version, or `None` for unversioned items.
    pub fn semver(&self) -> Option<SemVerLike> {
        SemVerLike::parse(&self.version)
    }

    /// Decode the signature string. Untagged signatures are attributed to
    /// `untagged_algorithm`.
    pub fn parsed_signature(&self, untagged_algorithm: Algorithm) -> Result<Option<Signature>> {
        self.signature
            .as_deref()
            .map(|raw| Signature::parse_with_default(raw, untagged_algorithm))
            .transpose()
    }
}

/// A product's update feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feed {
    /// Product title (the channel title in the syndication encoding).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Link to the feed itself or the product page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Language tag such as `en`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub items: Vec<FeedItem>,
}

impl Feed {
    /// Create an empty feed for `title`.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Sort items newest first.
    pub fn sort_descending(&mut self) {
        sort_descending(&mut self.items);
    }

    /// Newest item by version, ignoring unversioned entries.
    pub fn latest(&self) -> Option<&FeedItem> {
        self.items
            .iter()
            .filter_map(|item| item.semver().map(|version| (version, item)))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, item)| item)
    }
}

/// Sort items strictly by descending version. Unversioned items go last,
/// keeping their relative order.
pub fn sort_descending(items: &mut [FeedItem]) {
    items.sort_by_cached_key(|item| Reverse(item.semver()));
}

/// Collapse items with equal versions. The item appearing later wins and
/// takes the slot of the first occurrence; unversioned items pass through.
pub fn dedup_by_version(items: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut kept: Vec<(Option<SemVerLike>, FeedItem)> = Vec::with_capacity(items.len());
    for item in items {
        let version = item.semver();
        if let Some(parsed) = &version {
            if let Some(slot) = kept
                .iter_mut()
                .find(|(existing, _)| existing.as_ref() == Some(parsed))
            {
                tracing::debug!(version = %parsed, title = %item.title, "replacing duplicate version");
                slot.1 = item;
                continue;
            }
        }
        kept.push((version, item));
    }
    kept.into_iter().map(|(_, item)| item).collect()
}

/// Union of an existing feed's items and freshly built ones. A fresh item
/// replaces every existing item of the same version.
pub fn merge_items(existing: Vec<FeedItem>, fresh: Vec<FeedItem>) -> Vec<FeedItem> {
    let fresh = dedup_by_version(fresh);
    let fresh_versions: Vec<SemVerLike> = fresh.iter().filter_map(FeedItem::semver).collect();
    let mut merged: Vec<FeedItem> = existing
        .into_iter()
        .filter(|item| match item.semver() {
            Some(version) => !fresh_versions.contains(&version),
            None => true,
        })
        .collect();
    merged.extend(fresh);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, version: &str) -> FeedItem {
        FeedItem::new(title, version, format!("https://example.com/{version}.exe"))
    }

    fn titles(items: &[FeedItem]) -> Vec<&str> {
        items.iter().map(|item| item.title.as_str()).collect()
    }

    #[test]
    fn sorts_newest_first_with_unversioned_last() {
        let mut items = vec![
            item("a", "1.0"),
            item("nightly", "latest"),
            item("c", "2.0.1"),
            item("b", "1.10"),
        ];
        sort_descending(&mut items);
        assert_eq!(titles(&items), ["c", "b", "a", "nightly"]);
    }

    #[test]
    fn dedup_keeps_later_item_for_equal_versions() {
        let items = vec![
            item("first 1.3", "1.3"),
            item("2.0", "2.0"),
            item("second 1.3", "1.3.0"),
        ];
        let deduped = dedup_by_version(items);
        assert_eq!(titles(&deduped), ["second 1.3", "2.0"]);
    }

    #[test]
    fn merge_prefers_fresh_items() {
        let existing = vec![item("old 1.0", "1.0"), item("old 1.1", "1.1")];
        let fresh = vec![item("new 1.1", "1.1"), item("new 1.2", "1.2")];
        let mut merged = merge_items(existing, fresh);
        sort_descending(&mut merged);
        assert_eq!(titles(&merged), ["new 1.2", "new 1.1", "old 1.0"]);
    }

    #[test]
    fn latest_ignores_unversioned_items() {
        let mut feed = Feed::new("App");
        feed.items = vec![item("x", "dev"), item("y", "0.9"), item("z", "1.0")];
        assert_eq!(feed.latest().map(|i| i.title.as_str()), Some("z"));
    }

    #[test]
    fn parsed_signature_honours_tags() {
        let mut signed = item("x", "1.0");
        assert!(signed.parsed_signature(Algorithm::Ed25519).unwrap().is_none());

        signed.signature = Some("ecdsa-p256:AAEC".into());
        let signature = signed
            .parsed_signature(Algorithm::Ed25519)
            .unwrap()
            .expect("signature present");
        assert_eq!(signature.algorithm(), Algorithm::EcdsaP256);
        assert_eq!(signature.bytes(), &[0, 1, 2]);
    }
}
