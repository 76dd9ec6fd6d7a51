//! Client-side selection of the feed items worth offering.

use crate::feed::{dedup_by_version, sort_descending, FeedItem};
use crate::version::SemVerLike;

/// Chooses which feed items a client should consider for `installed`.
pub trait ItemFilter: Send + Sync {
    /// Candidate items, newest first.
    fn select(&self, installed: &SemVerLike, items: &[FeedItem]) -> Vec<FeedItem>;
}

/// Channel-aware filter.
///
/// With no search names configured only plain releases (no version suffix)
/// pass. With search names, an item passes when one of the names occurs in its
/// version suffix or channel tag, or when it carries neither and
/// `keep_items_with_no_channel_info` is set. A list holding only blank names
/// passes nothing.
#[derive(Debug, Clone)]
pub struct ChannelFilter {
    remove_older_items: bool,
    channel_search_names: Vec<String>,
    keep_items_with_no_channel_info: bool,
}

impl ChannelFilter {
    pub fn new() -> Self {
        Self {
            remove_older_items: true,
            channel_search_names: Vec::new(),
            keep_items_with_no_channel_info: true,
        }
    }

    /// Drop items whose version is not newer than the installed one.
    pub fn remove_older_items(mut self, enabled: bool) -> Self {
        self.remove_older_items = enabled;
        self
    }

    /// Channel names to opt into, matched case-insensitively. Blank names are
    /// ignored.
    pub fn channel_search_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.channel_search_names = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .collect();
        self
    }

    pub fn keep_items_with_no_channel_info(mut self, enabled: bool) -> Self {
        self.keep_items_with_no_channel_info = enabled;
        self
    }

    fn matches_channel(&self, version: &SemVerLike, item: &FeedItem) -> bool {
        let suffix = version.all_suffixes().trim().to_lowercase();
        let channel = item
            .channel
            .as_deref()
            .map(|channel| channel.trim().to_lowercase())
            .unwrap_or_default();

        if self.channel_search_names.is_empty() {
            return suffix.is_empty();
        }

        let unlabelled = suffix.is_empty() && channel.is_empty();
        self.channel_search_names
            .iter()
            .filter(|name| !name.is_empty())
            .any(|name| {
                suffix.contains(name.as_str())
                    || channel.contains(name.as_str())
                    || (self.keep_items_with_no_channel_info && unlabelled)
            })
    }
}

impl Default for ChannelFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemFilter for ChannelFilter {
    fn select(&self, installed: &SemVerLike, items: &[FeedItem]) -> Vec<FeedItem> {
        let mut selected = Vec::new();
        for item in items {
            let Some(version) = item.semver() else {
                tracing::debug!(title = %item.title, version = %item.version, "skipping unversioned item");
                continue;
            };
            if self.remove_older_items && version <= *installed {
                tracing::debug!(%version, %installed, "skipping item not newer than installed");
                continue;
            }
            if !self.matches_channel(&version, item) {
                tracing::debug!(%version, channel = ?item.channel, "skipping item outside selected channels");
                continue;
            }
            selected.push(item.clone());
        }

        let mut selected = dedup_by_version(selected);
        sort_descending(&mut selected);
        selected
    }
}
