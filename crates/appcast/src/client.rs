use std::path::Path;

use crate::codec::FeedCodec;
use crate::error::{AppcastError, Result};
use crate::feed::{Feed, FeedItem};
use crate::filter::ItemFilter;
use crate::trust::KeyPairHandle;
use crate::version::SemVerLike;

/// Client-side view of a feed: is there something newer, and is a downloaded
/// artifact the one the publisher signed?
pub struct UpdateChecker<C, F> {
    codec: C,
    filter: F,
    keys: KeyPairHandle,
}

impl<C, F> UpdateChecker<C, F>
where
    C: FeedCodec,
    F: ItemFilter,
{
    /// `keys` only needs the publisher's public key.
    pub fn new(codec: C, filter: F, keys: KeyPairHandle) -> Self {
        Self { codec, filter, keys }
    }

    /// Decide whether `feed_text` offers anything newer than `installed`.
    pub fn check_for_update(&self, installed: &str, feed_text: &str) -> Result<UpdateStatus> {
        let installed = parse_installed(installed)?;
        let feed = self.codec.deserialize(feed_text, true);
        Ok(self.status_for(&installed, &feed))
    }

    /// Same as [`check_for_update`](Self::check_for_update) for a feed on disk.
    /// A missing file is an error, not an empty feed.
    pub async fn check_for_update_from_file_async(
        &self,
        installed: &str,
        path: &Path,
    ) -> Result<UpdateStatus> {
        let installed = parse_installed(installed)?;
        let feed = self.codec.deserialize_from_file_async(path).await?;
        Ok(self.status_for(&installed, &feed))
    }

    /// Check a downloaded artifact against the advertised size and signature.
    /// Items without a signature are never authentic.
    pub fn verify_download(&self, update: &AvailableUpdate, bytes: &[u8]) -> bool {
        let item = update.item();
        if bytes.len() as u64 != item.length {
            tracing::warn!(
                expected = item.length,
                actual = bytes.len(),
                "downloaded artifact size mismatch"
            );
            return false;
        }
        let signature = match item.parsed_signature(self.keys.algorithm()) {
            Ok(Some(signature)) => signature,
            Ok(None) => {
                tracing::warn!(version = %item.version, "refusing unsigned artifact");
                return false;
            }
            Err(err) => {
                tracing::warn!(version = %item.version, "unreadable artifact signature: {err}");
                return false;
            }
        };
        self.keys.verify(bytes, &signature)
    }

    fn status_for(&self, installed: &SemVerLike, feed: &Feed) -> UpdateStatus {
        let candidates = self.filter.select(installed, &feed.items);
        match candidates.into_iter().next() {
            Some(item) => {
                tracing::info!(%installed, available = %item.version, "update available");
                UpdateStatus::Available(AvailableUpdate { item })
            }
            None => {
                tracing::debug!(%installed, "no newer release in feed");
                UpdateStatus::UpToDate
            }
        }
    }
}

fn parse_installed(raw: &str) -> Result<SemVerLike> {
    SemVerLike::parse(raw).ok_or_else(|| AppcastError::InvalidVersion(raw.to_string()))
}

/// Result of checking a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    Available(AvailableUpdate),
}

/// The newest release a client may install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUpdate {
    item: FeedItem,
}

impl AvailableUpdate {
    pub fn item(&self) -> &FeedItem {
        &self.item
    }

    pub fn version(&self) -> &str {
        &self.item.version
    }

    pub fn download_link(&self) -> &str {
        &self.item.download_link
    }

    /// Expected artifact size in bytes.
    pub fn length(&self) -> u64 {
        self.item.length
    }

    pub fn is_critical(&self) -> bool {
        self.item.is_critical
    }
}

impl From<FeedItem> for AvailableUpdate {
    fn from(item: FeedItem) -> Self {
        AvailableUpdate { item }
    }
}
