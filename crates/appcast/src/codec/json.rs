use crate::codec::FeedCodec;
use crate::error::Result;
use crate::feed::Feed;

/// Feeds as JSON documents mirroring the syndication fields.
#[derive(Debug, Clone)]
pub struct JsonFeedCodec {
    human_readable: bool,
}

impl JsonFeedCodec {
    /// Indented output by default.
    pub fn new() -> Self {
        Self {
            human_readable: true,
        }
    }

    /// Toggle indentation in serialized output.
    pub fn human_readable(mut self, enabled: bool) -> Self {
        self.human_readable = enabled;
        self
    }
}

impl Default for JsonFeedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedCodec for JsonFeedCodec {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn deserialize(&self, text: &str, should_sort: bool) -> Feed {
        if text.trim().is_empty() {
            return Feed::default();
        }
        let mut feed = match serde_json::from_str::<Feed>(text) {
            Ok(feed) => feed,
            Err(err) => {
                tracing::warn!("ignoring malformed json feed: {err}");
                return Feed::default();
            }
        };
        if should_sort {
            feed.sort_descending();
        }
        feed
    }

    fn serialize(&self, feed: &Feed) -> Result<String> {
        let text = if self.human_readable {
            serde_json::to_string_pretty(feed)?
        } else {
            serde_json::to_string(feed)?
        };
        Ok(text)
    }
}
