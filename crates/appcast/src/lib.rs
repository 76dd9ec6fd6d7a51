//! Signed software update feeds.
//!
//! A publisher scans a directory of release artifacts, signs each one and
//! merges the result into a feed document (RSS-style XML or JSON). Clients
//! parse the same document, filter it by channel and installed version, and
//! verify what they download against the publisher's public key.
//!
//! ```ignore
//! use appcast::{
//!     Algorithm, BuilderConfig, FeedBuilder, TrustConfig, TrustManager, XmlFeedCodec,
//! };
//!
//! # fn demo() -> appcast::Result<()> {
//! let trust = TrustManager::new(TrustConfig::new("/srv/keys").default_algorithm(Algorithm::Ed25519));
//! let config = BuilderConfig::new("dist", "dist/appcast.xml", "https://example.com/downloads")
//!     .extensions("exe,msi")
//!     .channel("beta");
//! let feed = FeedBuilder::new(config, XmlFeedCodec::new(), trust).build()?;
//! println!("{} releases", feed.items.len());
//! # Ok(())
//! # }
//! ```

mod builder;
mod client;
mod codec;
mod error;
mod feed;
mod filter;
mod trust;
mod version;

pub use builder::{
    find_binaries, search_extensions, versioned_binaries, BuilderConfig, FeedBuilder,
    DEFAULT_PRODUCT_NAME,
};
pub use client::{AvailableUpdate, UpdateChecker, UpdateStatus};
pub use codec::{FeedCodec, JsonFeedCodec, XmlFeedCodec};
pub use error::{AppcastError, Result};
pub use feed::{
    dedup_by_version, merge_items, sort_descending, Feed, FeedItem, DEFAULT_MIME_TYPE,
    DEFAULT_OPERATING_SYSTEM,
};
pub use filter::{ChannelFilter, ItemFilter};
pub use trust::{Algorithm, KeyPair, KeyPairHandle, Signature, TrustConfig, TrustManager};
pub use version::{infer_version_from_filename, SemVerLike};
