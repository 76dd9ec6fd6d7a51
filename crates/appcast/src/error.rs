use std::path::PathBuf;

use crate::trust::Algorithm;

/// Convenient result alias for appcast operations.
pub type Result<T> = std::result::Result<T, AppcastError>;

/// Errors that can occur while building, signing or reading a feed.
#[derive(thiserror::Error, Debug)]
pub enum AppcastError {
    /// Failed to perform an I/O operation.
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
    /// Directory traversal failed part-way through.
    #[error("directory scan failed: {0}")]
    Walk(#[from] walkdir::Error),
    /// JSON encoding failed.
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    /// XML encoding failed.
    #[error("xml encoding failed: {0}")]
    Xml(String),
    /// An extension produced an invalid glob pattern.
    #[error("invalid search pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    /// The configured base URL could not be joined with an artifact path.
    #[error("invalid download url: {0}")]
    Url(#[from] url::ParseError),
    /// A version string contained no numeric run.
    #[error("no version found in {0:?}")]
    InvalidVersion(String),
    /// Signing was requested but only a public key is available.
    #[error("no private {0} key available for signing")]
    MissingPrivateKey(Algorithm),
    /// Stored or supplied key material could not be decoded.
    #[error("invalid {algorithm} key: {reason}")]
    InvalidKey {
        /// Algorithm the key was expected to belong to.
        algorithm: Algorithm,
        /// Decoder message.
        reason: String,
    },
    /// A signature string was not of the form `<algorithm>:<base64>`.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    /// An algorithm tag was not recognised.
    #[error("unknown signature algorithm: {0}")]
    UnknownAlgorithm(String),
    /// The path handed to the builder is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    /// Background task failed to complete.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AppcastError {
    pub(crate) fn xml(err: impl std::fmt::Display) -> Self {
        AppcastError::Xml(err.to_string())
    }

    pub(crate) fn invalid_key(algorithm: Algorithm, err: impl std::fmt::Display) -> Self {
        AppcastError::InvalidKey {
            algorithm,
            reason: err.to_string(),
        }
    }
}
