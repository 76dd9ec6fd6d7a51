//! Turns a directory of release artifacts into a signed, merged feed.
//!
//! The pipeline is: enumerate matching files, keep those with a version in
//! their name, build and sign one item per file, merge with the feed already
//! on disk (fresh items win), sort, write.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use url::Url;
use walkdir::WalkDir;

use crate::codec::FeedCodec;
use crate::error::{AppcastError, Result};
use crate::feed::{merge_items, sort_descending, Feed, FeedItem, DEFAULT_MIME_TYPE, DEFAULT_OPERATING_SYSTEM};
use crate::trust::TrustManager;
pub use crate::version::infer_version_from_filename;

/// Title used when neither the configuration nor an existing feed names the
/// product.
pub const DEFAULT_PRODUCT_NAME: &str = "Application";

/// Parse `"exe, .msi"` into `{"*.exe", "*.msi"}`. Blank entries are skipped.
pub fn search_extensions(csv: &str) -> BTreeSet<String> {
    csv.split(',')
        .map(|ext| ext.trim().trim_start_matches('*').trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!("*.{ext}"))
        .collect()
}

/// Files under `root` whose names match any of `patterns`. Only direct
/// children are considered unless `recurse` is set.
pub fn find_binaries(root: &Path, patterns: &BTreeSet<String>, recurse: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(AppcastError::NotADirectory(root.to_path_buf()));
    }
    let patterns = patterns
        .iter()
        .map(|pattern| Pattern::new(pattern))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::default()
    };
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if !recurse {
        walker = walker.max_depth(1);
    }

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if patterns.iter().any(|pattern| pattern.matches_with(&name, options)) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Pair each path with the version in its file name, dropping paths that
/// carry none.
pub fn versioned_binaries(paths: Vec<PathBuf>) -> Vec<(PathBuf, String)> {
    paths
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            match infer_version_from_filename(&name) {
                Some(version) => Some((path, version)),
                None => {
                    tracing::debug!(file = %name, "skipping file without a version in its name");
                    None
                }
            }
        })
        .collect()
}

/// Everything a feed build needs to know.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Directory scanned for release artifacts.
    pub source_dir: PathBuf,
    /// Feed document to create or merge into.
    pub output_path: PathBuf,
    /// Comma-separated extensions, e.g. `exe,msi`.
    pub extensions: String,
    pub search_subdirectories: bool,
    /// Download links are this URL joined with each file's relative path.
    pub base_url: String,
    pub operating_system: String,
    pub channel: Option<String>,
    pub product_name: Option<String>,
    /// When set, items link to `<release_notes_base_url>/<version>.md`.
    pub release_notes_base_url: Option<String>,
    pub allow_duplicate_versions: bool,
    pub mime_type: String,
}

impl BuilderConfig {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_path: output_path.into(),
            extensions: "exe".to_string(),
            search_subdirectories: false,
            base_url: base_url.into(),
            operating_system: DEFAULT_OPERATING_SYSTEM.to_string(),
            channel: None,
            product_name: None,
            release_notes_base_url: None,
            allow_duplicate_versions: false,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
        }
    }

    pub fn extensions(mut self, csv: impl Into<String>) -> Self {
        self.extensions = csv.into();
        self
    }

    pub fn search_subdirectories(mut self, enabled: bool) -> Self {
        self.search_subdirectories = enabled;
        self
    }

    pub fn operating_system(mut self, os: impl Into<String>) -> Self {
        self.operating_system = os.into();
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    pub fn release_notes_base_url(mut self, url: impl Into<String>) -> Self {
        self.release_notes_base_url = Some(url.into());
        self
    }

    pub fn allow_duplicate_versions(mut self, enabled: bool) -> Self {
        self.allow_duplicate_versions = enabled;
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

/// Builds feeds with one codec and one signing identity.
pub struct FeedBuilder<C> {
    config: BuilderConfig,
    codec: C,
    trust: TrustManager,
}

impl<C: FeedCodec> FeedBuilder<C> {
    pub fn new(config: BuilderConfig, codec: C, trust: TrustManager) -> Self {
        Self {
            config,
            codec,
            trust,
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn trust(&self) -> &TrustManager {
        &self.trust
    }

    /// Scan, sign, merge and write. Returns the feed that was written.
    pub fn build(&self) -> Result<Feed> {
        let config = &self.config;
        let patterns = search_extensions(&config.extensions);
        let binaries = find_binaries(&config.source_dir, &patterns, config.search_subdirectories)?;
        let versioned = versioned_binaries(binaries);

        let base_url = Url::parse(&config.base_url)?;
        let notes_url = config
            .release_notes_base_url
            .as_deref()
            .map(Url::parse)
            .transpose()?;

        let mut fresh = Vec::with_capacity(versioned.len());
        for (path, version) in versioned {
            fresh.push(self.item_for(&path, version, &base_url, notes_url.as_ref())?);
        }

        let existing = if config.output_path.exists() {
            self.codec
                .read_existing_feed(&config.output_path, config.allow_duplicate_versions)?
        } else {
            Feed::default()
        };

        let fresh_count = fresh.len();
        let mut items = merge_items(existing.items, fresh);
        sort_descending(&mut items);

        let title = config
            .product_name
            .clone()
            .or(existing.title)
            .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_string());
        let feed = Feed {
            title: Some(title),
            link: existing.link,
            description: existing.description,
            language: existing.language,
            items,
        };
        self.codec.serialize_to_file(&feed, &config.output_path)?;

        tracing::info!(
            output = ?config.output_path,
            signed = fresh_count,
            total = feed.items.len(),
            "feed written"
        );
        Ok(feed)
    }

    fn item_for(
        &self,
        path: &Path,
        version: String,
        base_url: &Url,
        notes_url: Option<&Url>,
    ) -> Result<FeedItem> {
        let config = &self.config;
        let metadata = fs::metadata(path)?;
        let relative = path.strip_prefix(&config.source_dir).unwrap_or(path);
        let link = append_segments(base_url, path_segments(relative))?;

        let mut item = FeedItem::new(format!("Version {version}"), version, link);
        item.length = metadata.len();
        item.publication_date = Some(
            metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        );
        item.operating_system = config.operating_system.clone();
        item.mime_type = config.mime_type.clone();
        item.channel = config.channel.clone();
        item.signature = Some(self.trust.sign_file(path)?.to_string());
        if let Some(notes) = notes_url {
            let page = format!("{}.md", item.version);
            item.release_notes_link = Some(append_segments(notes, vec![page])?);
        }

        tracing::debug!(
            file = %relative.display(),
            version = %item.version,
            size = item.length,
            "signed release artifact"
        );
        Ok(item)
    }
}

fn path_segments(relative: &Path) -> Vec<String> {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Append percent-encoded path segments to `base`.
fn append_segments(base: &Url, segments: Vec<String>) -> Result<String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| AppcastError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::write(path, b"payload").unwrap();
    }

    fn names(paths: &[PathBuf]) -> BTreeSet<String> {
        paths
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn parses_extension_lists() {
        assert!(search_extensions("").is_empty());
        assert!(search_extensions(" , ").is_empty());
        assert_eq!(search_extensions("exe"), BTreeSet::from(["*.exe".to_string()]));
        let set = search_extensions("exe,msi");
        assert_eq!(set.len(), 2);
        assert!(set.contains("*.exe") && set.contains("*.msi"));
        assert_eq!(search_extensions("exe, .exe,*.exe").len(), 1);
    }

    #[test]
    fn scans_one_or_all_levels() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for name in ["hello.txt", "goodbye.txt", "batch.bat"] {
            touch(&root.join(name));
        }
        let sub = root.join("Subdir");
        fs::create_dir(&sub).unwrap();
        for name in ["good-day-sir.txt", "there-are-four-lights.txt", "please-understand.bat"] {
            touch(&sub.join(name));
        }

        let exe = find_binaries(root, &search_extensions("exe"), false).unwrap();
        assert!(exe.is_empty());

        let txt = find_binaries(root, &search_extensions("txt"), false).unwrap();
        assert_eq!(
            names(&txt),
            BTreeSet::from(["hello.txt".to_string(), "goodbye.txt".to_string()])
        );

        let shallow = find_binaries(root, &search_extensions("txt,bat"), false).unwrap();
        assert_eq!(shallow.len(), 3);
        assert!(shallow.iter().all(|path| path.parent() == Some(root)));

        let deep = find_binaries(root, &search_extensions("txt,bat"), true).unwrap();
        assert_eq!(deep.len(), 6);
        assert_eq!(deep.iter().filter(|path| path.starts_with(&sub)).count(), 3);
    }

    #[test]
    fn scanning_a_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            find_binaries(&missing, &search_extensions("exe"), true),
            Err(AppcastError::NotADirectory(_))
        ));
    }

    #[test]
    fn keeps_only_versioned_file_names() {
        let paths = vec![
            PathBuf::from("out/MyApp-Beta7-v2.0.3.exe"),
            PathBuf::from("out/readme.exe"),
            PathBuf::from("out/app1..exe"),
            PathBuf::from("out/app-1.4.msi"),
        ];
        let versioned = versioned_binaries(paths);
        let versions: Vec<&str> = versioned.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(versions, ["2.0.3", "1.4"]);
    }

    #[test]
    fn links_are_joined_and_encoded() {
        let base = Url::parse("https://example.com/downloads").unwrap();
        let link = append_segments(&base, path_segments(Path::new("Sub dir/app-1.0.exe"))).unwrap();
        assert_eq!(link, "https://example.com/downloads/Sub%20dir/app-1.0.exe");

        let slashed = Url::parse("https://example.com/downloads/").unwrap();
        let link = append_segments(&slashed, vec!["app#1.0.exe".to_string()]).unwrap();
        assert_eq!(link, "https://example.com/downloads/app%231.0.exe");
    }
}
