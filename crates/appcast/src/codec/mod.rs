//! Wire encodings for feeds.
//!
//! [`FeedCodec`] is the contract shared by the syndication (XML) and
//! structured (JSON) encodings. Decoding is lenient: a document that cannot be
//! parsed decodes to an empty [`Feed`]. Reading a file that does not exist is
//! still an error.

mod json;
mod xml;

pub use json::JsonFeedCodec;
pub use xml::XmlFeedCodec;

use std::fs;
use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::error::{AppcastError, Result};
use crate::feed::{dedup_by_version, Feed, FeedItem};

/// Serialises and deserialises feeds in one wire format.
#[async_trait]
pub trait FeedCodec: Send + Sync {
    /// File extension (without the dot) for documents in this format.
    fn extension(&self) -> &'static str;

    /// Parse `text` into a feed, sorting newest first when `should_sort`.
    fn deserialize(&self, text: &str, should_sort: bool) -> Feed;

    /// Render `feed` in this format.
    fn serialize(&self, feed: &Feed) -> Result<String>;

    /// Read and parse a feed file, sorted newest first.
    fn deserialize_from_file(&self, path: &Path) -> Result<Feed> {
        let text = fs::read_to_string(path)?;
        Ok(self.deserialize(&text, true))
    }

    /// Write `feed` to `path`, replacing any previous document atomically.
    fn serialize_to_file(&self, feed: &Feed, path: &Path) -> Result<()> {
        let text = self.serialize(feed)?;
        write_atomically(path, text.as_bytes())
    }

    async fn deserialize_from_file_async(&self, path: &Path) -> Result<Feed> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(self.deserialize(&text, true))
    }

    async fn serialize_to_file_async(&self, feed: &Feed, path: &Path) -> Result<()> {
        let text = self.serialize(feed)?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomically(&target, text.as_bytes())).await?
    }

    /// An existing feed with its channel metadata and items in document
    /// order. Equal versions are collapsed unless `allow_duplicate_versions`.
    fn read_existing_feed(&self, path: &Path, allow_duplicate_versions: bool) -> Result<Feed> {
        let text = fs::read_to_string(path)?;
        let mut feed = self.deserialize(&text, false);
        if !allow_duplicate_versions {
            feed.items = dedup_by_version(feed.items);
        }
        Ok(feed)
    }

    /// Items and product title of an existing feed, in document order.
    /// Equal versions are collapsed unless `allow_duplicate_versions`.
    fn read_existing(
        &self,
        path: &Path,
        allow_duplicate_versions: bool,
    ) -> Result<(Vec<FeedItem>, Option<String>)> {
        let feed = self.read_existing_feed(path, allow_duplicate_versions)?;
        Ok((feed.items, feed.title))
    }
}

/// Write through a temporary file in the destination directory so readers
/// never see a partially written document.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent)?;
    }

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.into_temp_path()
        .persist(path)
        .map_err(|err| AppcastError::Io(err.error))?;
    Ok(())
}
