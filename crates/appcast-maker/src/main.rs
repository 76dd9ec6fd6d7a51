//! Feed generator for release directories.
//!
//! Scans a directory of binaries, signs each versioned artifact and writes (or
//! merges into) an `appcast.xml` / `appcast.json` feed.

use std::path::PathBuf;

use anyhow::Context;
use appcast::{
    Algorithm, BuilderConfig, Feed, FeedBuilder, FeedCodec, JsonFeedCodec, TrustConfig,
    TrustManager, XmlFeedCodec,
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// Output document format
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Xml,
    Json,
}

/// Command-line arguments for the feed generator
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory containing the release binaries
    #[arg(short, long, required_unless_present = "generate_keys")]
    binaries: Option<PathBuf>,

    /// Comma-separated file extensions to include
    #[arg(short, long, default_value = "exe")]
    ext: String,

    /// Search subdirectories of the binaries directory too
    #[arg(short, long, default_value_t = false)]
    recurse: bool,

    /// URL the binaries will be downloadable from
    #[arg(short = 'u', long, required_unless_present = "generate_keys")]
    base_url: Option<String>,

    /// Directory the feed is written to (defaults to the binaries directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Feed document format
    #[arg(short, long, value_enum, default_value_t = Format::Xml)]
    format: Format,

    /// Operating system tag for every new item
    #[arg(long, default_value = "windows")]
    os: String,

    /// Release channel for every new item, e.g. beta
    #[arg(short, long)]
    channel: Option<String>,

    /// Product name used as the feed title
    #[arg(short = 'n', long)]
    product_name: Option<String>,

    /// Base URL for release notes; items link to <url>/<version>.md
    #[arg(long)]
    release_notes_url: Option<String>,

    /// Keep existing items that share a version
    #[arg(long, default_value_t = false)]
    allow_duplicates: bool,

    /// Write the feed without indentation
    #[arg(long, default_value_t = false)]
    compact: bool,

    /// Directory holding the signing keys
    #[arg(short, long, env = "APPCAST_KEY_DIR")]
    key_dir: PathBuf,

    /// Signature algorithm for new signatures (ed25519, ecdsa-p256 or dsa)
    #[arg(short, long, default_value = "ed25519")]
    algorithm: Algorithm,

    /// Create signing keys if missing, print the public key and exit
    #[arg(long, default_value_t = false)]
    generate_keys: bool,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,appcast=debug")
    } else {
        EnvFilter::new("info,appcast=info")
    };
    fmt().with_env_filter(filter).init();

    let trust = TrustManager::new(TrustConfig::new(&args.key_dir).default_algorithm(args.algorithm));

    if args.generate_keys {
        let keys = trust
            .ensure_keys_exist(args.algorithm)
            .with_context(|| format!("failed to prepare keys in {}", args.key_dir.display()))?;
        tracing::info!(algorithm = %keys.algorithm(), fingerprint = %keys.fingerprint(), "signing keys ready");
        println!("{}", keys.public_key_string()?);
        return Ok(());
    }

    let binaries = args.binaries.clone().context("--binaries is required")?;
    let base_url = args.base_url.clone().context("--base-url is required")?;
    let extension = match args.format {
        Format::Xml => "xml",
        Format::Json => "json",
    };
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| binaries.clone())
        .join(format!("appcast.{extension}"));

    let mut config = BuilderConfig::new(&binaries, &output, base_url)
        .extensions(args.ext.as_str())
        .search_subdirectories(args.recurse)
        .operating_system(args.os.as_str())
        .allow_duplicate_versions(args.allow_duplicates);
    config.channel = args.channel.clone();
    config.product_name = args.product_name.clone();
    config.release_notes_base_url = args.release_notes_url.clone();

    let human_readable = !args.compact;
    let feed = match args.format {
        Format::Xml => run(config, XmlFeedCodec::new().human_readable(human_readable), trust).await?,
        Format::Json => run(config, JsonFeedCodec::new().human_readable(human_readable), trust).await?,
    };

    match feed.latest() {
        Some(latest) => tracing::info!(
            path = %output.display(),
            items = feed.items.len(),
            latest = %latest.version,
            "appcast generated"
        ),
        None => tracing::warn!(path = %output.display(), "appcast contains no versioned items"),
    }
    Ok(())
}

async fn run<C>(config: BuilderConfig, codec: C, trust: TrustManager) -> anyhow::Result<Feed>
where
    C: FeedCodec + 'static,
{
    let source = config.source_dir.clone();
    let builder = FeedBuilder::new(config, codec, trust);
    let feed = tokio::task::spawn_blocking(move || builder.build())
        .await
        .context("feed build task failed")?
        .with_context(|| format!("failed to build feed for {}", source.display()))?;
    Ok(feed)
}
