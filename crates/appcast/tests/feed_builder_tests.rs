use std::fs;
use std::path::Path;

use appcast::{
    Algorithm, BuilderConfig, Feed, FeedBuilder, FeedCodec, FeedItem, JsonFeedCodec,
    TrustConfig, TrustManager, XmlFeedCodec, DEFAULT_PRODUCT_NAME,
};
use tempfile::{tempdir, TempDir};

struct Workspace {
    _dir: TempDir,
    dist: std::path::PathBuf,
    keys: std::path::PathBuf,
}

fn workspace() -> Workspace {
    let dir = tempdir().unwrap();
    let dist = dir.path().join("dist");
    let keys = dir.path().join("keys");
    fs::create_dir_all(dist.join("nested")).unwrap();
    fs::write(dist.join("MyApp-1.0.exe"), b"one point oh").unwrap();
    fs::write(dist.join("MyApp-1.1.exe"), b"one point one").unwrap();
    fs::write(dist.join("readme.exe"), b"no version here").unwrap();
    fs::write(dist.join("MyApp-1.1.txt"), b"not a binary").unwrap();
    fs::write(dist.join("nested").join("MyApp Setup 2.0.exe"), b"two point oh").unwrap();
    Workspace {
        _dir: dir,
        dist,
        keys,
    }
}

fn trust(keys: &Path) -> TrustManager {
    TrustManager::new(TrustConfig::new(keys))
}

fn versions(feed: &Feed) -> Vec<&str> {
    feed.items.iter().map(|item| item.version.as_str()).collect()
}

#[test]
fn builds_signed_feed_from_directory() {
    let ws = workspace();
    let output = ws.dist.join("appcast.xml");
    let config = BuilderConfig::new(&ws.dist, &output, "https://example.com/downloads")
        .search_subdirectories(true)
        .operating_system("linux");

    let feed = FeedBuilder::new(config, XmlFeedCodec::new(), trust(&ws.keys))
        .build()
        .unwrap();

    assert_eq!(feed.title.as_deref(), Some(DEFAULT_PRODUCT_NAME));
    assert_eq!(versions(&feed), ["2.0", "1.1", "1.0"]);

    let newest = &feed.items[0];
    assert_eq!(newest.title, "Version 2.0");
    assert_eq!(
        newest.download_link,
        "https://example.com/downloads/nested/MyApp%20Setup%202.0.exe"
    );
    assert_eq!(newest.length, "two point oh".len() as u64);
    assert_eq!(newest.operating_system, "linux");
    assert!(newest.publication_date.is_some());
    assert!(newest.release_notes_link.is_none());

    let verifier = trust(&ws.keys);
    for (item, file) in feed.items.iter().zip([
        "nested/MyApp Setup 2.0.exe",
        "MyApp-1.1.exe",
        "MyApp-1.0.exe",
    ]) {
        let bytes = fs::read(ws.dist.join(file)).unwrap();
        let signature = item.signature.as_deref().expect("item is signed");
        assert!(signature.starts_with("ed25519:"));
        assert!(verifier.verify_encoded(&bytes, signature));
        assert!(!verifier.verify_encoded(b"tampered", signature));
    }

    let written = XmlFeedCodec::new().deserialize_from_file(&output).unwrap();
    assert_eq!(versions(&written), versions(&feed));
    assert_eq!(written.items[1].signature, feed.items[1].signature);
}

#[test]
fn non_recursive_build_ignores_nested_files() {
    let ws = workspace();
    let output = ws.dist.join("appcast.json");
    let config = BuilderConfig::new(&ws.dist, &output, "https://example.com/downloads/");
    let feed = FeedBuilder::new(config, JsonFeedCodec::new(), trust(&ws.keys))
        .build()
        .unwrap();

    assert_eq!(versions(&feed), ["1.1", "1.0"]);
    assert_eq!(
        feed.items[0].download_link,
        "https://example.com/downloads/MyApp-1.1.exe"
    );
}

#[test]
fn merges_with_existing_feed_and_keeps_its_title() {
    let ws = workspace();
    let output = ws.dist.join("appcast.json");

    let mut existing = Feed::new("Existing App");
    let mut stale = FeedItem::new("Old 1.0", "1.0", "https://old.example.com/1.0.exe");
    stale.signature = Some("ed25519:AAAA".into());
    existing.items = vec![
        FeedItem::new("Version 0.9", "0.9", "https://old.example.com/0.9.exe"),
        stale,
    ];
    JsonFeedCodec::new().serialize_to_file(&existing, &output).unwrap();

    let config = BuilderConfig::new(&ws.dist, &output, "https://example.com/downloads");
    let feed = FeedBuilder::new(config, JsonFeedCodec::new(), trust(&ws.keys))
        .build()
        .unwrap();

    assert_eq!(feed.title.as_deref(), Some("Existing App"));
    assert_eq!(versions(&feed), ["1.1", "1.0", "0.9"]);
    assert_eq!(feed.items[1].download_link, "https://example.com/downloads/MyApp-1.0.exe");
    assert_eq!(feed.items[2].download_link, "https://old.example.com/0.9.exe");

    let rebuilt = FeedBuilder::new(
        BuilderConfig::new(&ws.dist, &output, "https://example.com/downloads"),
        JsonFeedCodec::new(),
        trust(&ws.keys),
    )
    .build()
    .unwrap();
    assert_eq!(versions(&rebuilt), versions(&feed));
}

#[test]
fn rebuilding_keeps_existing_channel_metadata() {
    let ws = workspace();
    let output = ws.dist.join("appcast.xml");

    let mut existing = Feed::new("Existing App");
    existing.link = Some("https://example.com/appcast.xml".into());
    existing.description = Some("Most recent changes.".into());
    existing.language = Some("en".into());
    existing.items = vec![FeedItem::new("Version 0.9", "0.9", "https://old.example.com/0.9.exe")];
    XmlFeedCodec::new().serialize_to_file(&existing, &output).unwrap();

    let config = BuilderConfig::new(&ws.dist, &output, "https://example.com/downloads").product_name("Renamed App");
    let feed = FeedBuilder::new(config, XmlFeedCodec::new(), trust(&ws.keys))
        .build()
        .unwrap();

    let written = XmlFeedCodec::new().deserialize_from_file(&output).unwrap();
    for feed in [&feed, &written] {
        assert_eq!(feed.title.as_deref(), Some("Renamed App"));
        assert_eq!(feed.link, existing.link);
        assert_eq!(feed.description, existing.description);
        assert_eq!(feed.language, existing.language);
        assert_eq!(versions(feed), ["1.1", "1.0", "0.9"]);
    }
}

#[test]
fn applies_channel_product_name_and_release_notes() {
    let ws = workspace();
    let output = ws.dist.join("feeds").join("appcast.xml");
    let config = BuilderConfig::new(&ws.dist, &output, "https://example.com/downloads")
        .extensions("exe, msi")
        .channel("beta")
        .product_name("My App")
        .release_notes_base_url("https://example.com/notes")
        .mime_type("application/x-msdownload");

    let trust = TrustManager::new(TrustConfig::new(&ws.keys).default_algorithm(Algorithm::EcdsaP256));
    let feed = FeedBuilder::new(config, XmlFeedCodec::new().human_readable(false), trust)
        .build()
        .unwrap();

    assert_eq!(feed.title.as_deref(), Some("My App"));
    let item = &feed.items[0];
    assert_eq!(item.channel.as_deref(), Some("beta"));
    assert_eq!(item.mime_type, "application/x-msdownload");
    assert_eq!(
        item.release_notes_link.as_deref(),
        Some("https://example.com/notes/1.1.md")
    );
    assert!(item.signature.as_deref().unwrap().starts_with("ecdsa-p256:"));
    assert!(ws.keys.join("ecdsa-p256.private.pem").exists());

    let written = XmlFeedCodec::new().deserialize_from_file(&output).unwrap();
    assert_eq!(written.items[0].channel.as_deref(), Some("beta"));
    assert_eq!(written.title.as_deref(), Some("My App"));
}

#[test]
fn sorted_round_trip_is_strictly_descending() {
    let mut feed = Feed::new("Ordering");
    for version in ["1.2", "0.10.1", "3.0", "1.10", "0.9.9.9", "2.0.1", "1.2.1"] {
        feed.items.push(FeedItem::new(
            format!("Version {version}"),
            version,
            format!("https://example.com/{version}.exe"),
        ));
    }
    let codecs: [Box<dyn FeedCodec>; 2] = [Box::new(XmlFeedCodec::new()), Box::new(JsonFeedCodec::new())];
    for codec in codecs {
        let text = codec.serialize(&feed).unwrap();
        let parsed = codec.deserialize(&text, true);
        let ordered: Vec<_> = parsed.items.iter().filter_map(FeedItem::semver).collect();
        assert_eq!(ordered.len(), feed.items.len());
        assert!(ordered.windows(2).all(|pair| pair[0] > pair[1]));
        assert_eq!(parsed.items[0].version, "3.0");
        assert_eq!(parsed.items[6].version, "0.9.9.9");
    }
}

#[test]
fn missing_source_directory_is_an_error() {
    let ws = workspace();
    let config = BuilderConfig::new(ws.dist.join("absent"), ws.dist.join("appcast.xml"), "https://example.com");
    let result = FeedBuilder::new(config, XmlFeedCodec::new(), trust(&ws.keys)).build();
    assert!(result.is_err());
    assert!(!ws.dist.join("appcast.xml").exists());
}
