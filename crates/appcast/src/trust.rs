//! Signing identity for published artifacts.
//!
//! A [`TrustManager`] owns at most one key pair per [`Algorithm`] under a
//! caller-supplied storage directory. Ed25519 is the default for new keys.
//! DSA remains so signatures issued by older publishers keep verifying, and
//! ECDSA P-256 is available for deployments that need a NIST curve. Every
//! [`Signature`] carries its algorithm, so verification never has to guess
//! which key to use.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use base64::{engine::general_purpose, Engine as _};
use dsa::signature::{DigestSigner as _, DigestVerifier as _, SignatureEncoding as _};
use ed25519_dalek::{Signer as _, Verifier as _};
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{AppcastError, Result};

/// Signature algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    /// Ed25519, used for newly generated keys.
    Ed25519,
    /// ECDSA over P-256 with SHA-256.
    EcdsaP256,
    /// DSA with SHA-256 and DER-encoded signatures, kept for previously
    /// issued signatures.
    Dsa,
}

impl Algorithm {
    /// Tag used in signature strings and key file names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Algorithm::Ed25519 => "ed25519",
            Algorithm::EcdsaP256 => "ecdsa-p256",
            Algorithm::Dsa => "dsa",
        }
    }

    /// Whether this is the legacy family.
    pub const fn is_legacy(self) -> bool {
        matches!(self, Algorithm::Dsa)
    }

    const fn key_file_names(self) -> (&'static str, &'static str) {
        match self {
            Algorithm::Ed25519 => ("ed25519.private", "ed25519.public"),
            Algorithm::EcdsaP256 => ("ecdsa-p256.private.pem", "ecdsa-p256.public.pem"),
            Algorithm::Dsa => ("dsa.private.pem", "dsa.public.pem"),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = AppcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ed25519" => Ok(Algorithm::Ed25519),
            "ecdsa-p256" | "ecdsa" | "p256" => Ok(Algorithm::EcdsaP256),
            "dsa" => Ok(Algorithm::Dsa),
            other => Err(AppcastError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// A signature together with the algorithm that produced it.
///
/// The text form is `<algorithm>:<base64>`, e.g. `ed25519:3q2+7w==`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    algorithm: Algorithm,
    bytes: Vec<u8>,
}

impl Signature {
    pub fn new(algorithm: Algorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Raw signature bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parse a tagged signature, or attribute an untagged base64 string to
    /// `untagged`. Base64 never contains `:`, so its presence means a tag.
    pub fn parse_with_default(raw: &str, untagged: Algorithm) -> Result<Self> {
        let raw = raw.trim();
        let (algorithm, encoded) = match raw.split_once(':') {
            Some((tag, encoded)) => (tag.parse::<Algorithm>()?, encoded),
            None => (untagged, raw),
        };
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| AppcastError::MalformedSignature(format!("{raw:?}: {err}")))?;
        Ok(Self { algorithm, bytes })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.algorithm,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

impl FromStr for Signature {
    type Err = AppcastError;

    fn from_str(s: &str) -> Result<Self> {
        if !s.contains(':') {
            return Err(AppcastError::MalformedSignature(format!(
                "{s:?} has no algorithm tag"
            )));
        }
        Self::parse_with_default(s, Algorithm::Ed25519)
    }
}

enum SecretKey {
    Ed25519(ed25519_dalek::SigningKey),
    EcdsaP256(p256::ecdsa::SigningKey),
    Dsa(dsa::SigningKey),
}

enum PublicKey {
    Ed25519(ed25519_dalek::VerifyingKey),
    EcdsaP256(p256::ecdsa::VerifyingKey),
    Dsa(dsa::VerifyingKey),
}

impl PublicKey {
    fn algorithm(&self) -> Algorithm {
        match self {
            PublicKey::Ed25519(_) => Algorithm::Ed25519,
            PublicKey::EcdsaP256(_) => Algorithm::EcdsaP256,
            PublicKey::Dsa(_) => Algorithm::Dsa,
        }
    }
}

/// Shared handle to loaded key material.
pub type KeyPairHandle = Arc<KeyPair>;

/// A public key plus, on publishing machines, the matching private key.
pub struct KeyPair {
    public: PublicKey,
    secret: Option<SecretKey>,
}

impl KeyPair {
    /// Generate fresh key material.
    pub fn generate(algorithm: Algorithm) -> Self {
        let secret = match algorithm {
            Algorithm::Ed25519 => SecretKey::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng)),
            Algorithm::EcdsaP256 => SecretKey::EcdsaP256(p256::ecdsa::SigningKey::random(&mut OsRng)),
            Algorithm::Dsa => {
                let components = dsa::Components::generate(&mut OsRng, dsa::KeySize::DSA_2048_256);
                SecretKey::Dsa(dsa::SigningKey::generate(&mut OsRng, components))
            }
        };
        Self::from_secret(secret)
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = match &secret {
            SecretKey::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
            SecretKey::EcdsaP256(key) => PublicKey::EcdsaP256(p256::ecdsa::VerifyingKey::from(key)),
            SecretKey::Dsa(key) => PublicKey::Dsa(key.verifying_key().clone()),
        };
        Self {
            public,
            secret: Some(secret),
        }
    }

    /// Build a verification-only key pair from an exported public key
    /// (base64 for Ed25519, SPKI PEM for ECDSA P-256 and DSA).
    pub fn from_public_key(algorithm: Algorithm, encoded: &str) -> Result<Self> {
        let public = match algorithm {
            Algorithm::Ed25519 => {
                let bytes = decode_key_bytes(algorithm, encoded)?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|err| AppcastError::invalid_key(algorithm, err))?;
                PublicKey::Ed25519(key)
            }
            Algorithm::EcdsaP256 => {
                let key = p256::ecdsa::VerifyingKey::from_public_key_pem(encoded.trim())
                    .map_err(|err| AppcastError::invalid_key(algorithm, err))?;
                PublicKey::EcdsaP256(key)
            }
            Algorithm::Dsa => {
                let key = dsa::VerifyingKey::from_public_key_pem(encoded.trim())
                    .map_err(|err| AppcastError::invalid_key(algorithm, err))?;
                PublicKey::Dsa(key)
            }
        };
        Ok(Self {
            public,
            secret: None,
        })
    }

    fn from_private_key(algorithm: Algorithm, encoded: &str) -> Result<Self> {
        let secret = match algorithm {
            Algorithm::Ed25519 => {
                let bytes = decode_key_bytes(algorithm, encoded)?;
                SecretKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&bytes))
            }
            Algorithm::EcdsaP256 => {
                let key = p256::ecdsa::SigningKey::from_pkcs8_pem(encoded.trim())
                    .map_err(|err| AppcastError::invalid_key(algorithm, err))?;
                SecretKey::EcdsaP256(key)
            }
            Algorithm::Dsa => {
                let key = dsa::SigningKey::from_pkcs8_pem(encoded.trim())
                    .map_err(|err| AppcastError::invalid_key(algorithm, err))?;
                SecretKey::Dsa(key)
            }
        };
        Ok(Self::from_secret(secret))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.public.algorithm()
    }

    /// Whether this key pair can sign.
    pub fn has_private_key(&self) -> bool {
        self.secret.is_some()
    }

    /// Public key in its storage encoding, suitable for embedding in clients.
    pub fn public_key_string(&self) -> Result<String> {
        match &self.public {
            PublicKey::Ed25519(key) => Ok(general_purpose::STANDARD.encode(key.to_bytes())),
            PublicKey::EcdsaP256(key) => key
                .to_public_key_pem(LineEnding::LF)
                .map_err(|err| AppcastError::invalid_key(Algorithm::EcdsaP256, err)),
            PublicKey::Dsa(key) => key
                .to_public_key_pem(LineEnding::LF)
                .map_err(|err| AppcastError::invalid_key(Algorithm::Dsa, err)),
        }
    }

    fn private_key_string(&self) -> Result<Option<String>> {
        match &self.secret {
            None => Ok(None),
            Some(SecretKey::Ed25519(key)) => Ok(Some(general_purpose::STANDARD.encode(key.to_bytes()))),
            Some(SecretKey::EcdsaP256(key)) => key
                .to_pkcs8_pem(LineEnding::LF)
                .map(|pem| Some(pem.to_string()))
                .map_err(|err| AppcastError::invalid_key(Algorithm::EcdsaP256, err)),
            Some(SecretKey::Dsa(key)) => key
                .to_pkcs8_pem(LineEnding::LF)
                .map(|pem| Some(pem.to_string()))
                .map_err(|err| AppcastError::invalid_key(Algorithm::Dsa, err)),
        }
    }

    /// SHA-256 fingerprint of the public key (hex-encoded).
    pub fn fingerprint(&self) -> String {
        let digest = match &self.public {
            PublicKey::Ed25519(key) => Sha256::digest(key.as_bytes()),
            PublicKey::EcdsaP256(key) => Sha256::digest(key.to_encoded_point(true).as_bytes()),
            PublicKey::Dsa(key) => Sha256::digest(key.y().to_bytes_be()),
        };
        hex::encode(digest)
    }

    /// Sign `payload` with the private key.
    pub fn sign(&self, payload: &[u8]) -> Result<Signature> {
        let bytes = match &self.secret {
            None => return Err(AppcastError::MissingPrivateKey(self.algorithm())),
            Some(SecretKey::Ed25519(key)) => {
                let signature: ed25519_dalek::Signature = key.sign(payload);
                signature.to_bytes().to_vec()
            }
            Some(SecretKey::EcdsaP256(key)) => {
                let signature: p256::ecdsa::Signature = key.sign(payload);
                signature.to_bytes().to_vec()
            }
            Some(SecretKey::Dsa(key)) => {
                let signature: dsa::Signature = key
                    .try_sign_digest(Sha256::new_with_prefix(payload))
                    .map_err(|err| AppcastError::invalid_key(Algorithm::Dsa, err))?;
                signature.to_vec()
            }
        };
        Ok(Signature::new(self.algorithm(), bytes))
    }

    /// Check `signature` over `payload`. Any mismatch, including a signature
    /// from another algorithm or undecodable bytes, yields `false`.
    pub fn verify(&self, payload: &[u8], signature: &Signature) -> bool {
        if signature.algorithm() != self.algorithm() {
            return false;
        }
        match &self.public {
            PublicKey::Ed25519(key) => ed25519_dalek::Signature::from_slice(signature.bytes())
                .map(|parsed| key.verify(payload, &parsed).is_ok())
                .unwrap_or(false),
            PublicKey::EcdsaP256(key) => p256::ecdsa::Signature::from_slice(signature.bytes())
                .map(|parsed| key.verify(payload, &parsed).is_ok())
                .unwrap_or(false),
            PublicKey::Dsa(key) => dsa::Signature::try_from(signature.bytes())
                .map(|parsed| {
                    key.verify_digest(Sha256::new_with_prefix(payload), &parsed)
                        .is_ok()
                })
                .unwrap_or(false),
        }
    }

    fn load(dir: &Path, algorithm: Algorithm) -> Result<Option<Self>> {
        let (private_name, public_name) = algorithm.key_file_names();
        let private_path = dir.join(private_name);
        if private_path.exists() {
            let keys = Self::from_private_key(algorithm, &fs::read_to_string(&private_path)?)?;
            return Ok(Some(keys));
        }
        let public_path = dir.join(public_name);
        if public_path.exists() {
            tracing::debug!(%algorithm, path = ?public_path, "loaded verification-only key");
            let keys = Self::from_public_key(algorithm, &fs::read_to_string(&public_path)?)?;
            return Ok(Some(keys));
        }
        Ok(None)
    }

    fn persist(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let (private_name, public_name) = self.algorithm().key_file_names();
        if let Some(private) = self.private_key_string()? {
            let private_path = dir.join(private_name);
            fs::write(&private_path, private)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&private_path, fs::Permissions::from_mode(0o600))?;
            }
        }
        fs::write(dir.join(public_name), self.public_key_string()?)?;
        Ok(())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .field("fingerprint", &self.fingerprint())
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}

fn decode_key_bytes(algorithm: Algorithm, encoded: &str) -> Result<[u8; 32]> {
    let raw = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|err| AppcastError::invalid_key(algorithm, err))?;
    raw.try_into()
        .map_err(|_| AppcastError::invalid_key(algorithm, "key must be 32 bytes"))
}

/// Where and how a [`TrustManager`] keeps its keys.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Directory holding the key files. Never defaulted: callers choose it.
    pub storage_dir: PathBuf,
    /// Algorithm used by [`TrustManager::sign`] and for untagged signatures.
    pub default_algorithm: Algorithm,
}

impl TrustConfig {
    /// Keys under `storage_dir`, Ed25519 by default.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            default_algorithm: Algorithm::Ed25519,
        }
    }

    /// Set the default algorithm.
    pub fn default_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.default_algorithm = algorithm;
        self
    }
}

/// Loads, creates and uses the key pairs stored under one directory.
///
/// Loaded keys are cached; first-use generation is not locked against other
/// processes targeting the same directory.
pub struct TrustManager {
    config: TrustConfig,
    keys: RwLock<HashMap<Algorithm, KeyPairHandle>>,
}

impl TrustManager {
    pub fn new(config: TrustConfig) -> Self {
        Self {
            config,
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    pub fn default_algorithm(&self) -> Algorithm {
        self.config.default_algorithm
    }

    /// Load the key pair for `algorithm`, generating and persisting one if
    /// the storage directory has none.
    pub fn ensure_keys_exist(&self, algorithm: Algorithm) -> Result<KeyPairHandle> {
        if let Some(keys) = self.load_keys(algorithm)? {
            return Ok(keys);
        }
        let keys = KeyPair::generate(algorithm);
        keys.persist(&self.config.storage_dir)?;
        tracing::info!(
            %algorithm,
            fingerprint = %keys.fingerprint(),
            dir = ?self.config.storage_dir,
            "generated new signing keys"
        );
        Ok(self.cache(algorithm, keys))
    }

    /// Load the key pair for `algorithm` without creating one.
    pub fn load_keys(&self, algorithm: Algorithm) -> Result<Option<KeyPairHandle>> {
        if let Some(keys) = self.cached(algorithm) {
            return Ok(Some(keys));
        }
        match KeyPair::load(&self.config.storage_dir, algorithm)? {
            Some(keys) => Ok(Some(self.cache(algorithm, keys))),
            None => Ok(None),
        }
    }

    /// Replace the stored key pair with fresh material. Signatures made with
    /// the previous key no longer verify.
    pub fn regenerate_keys(&self, algorithm: Algorithm) -> Result<KeyPairHandle> {
        let keys = KeyPair::generate(algorithm);
        keys.persist(&self.config.storage_dir)?;
        tracing::warn!(
            %algorithm,
            fingerprint = %keys.fingerprint(),
            "signing keys regenerated; previously published signatures must be reissued"
        );
        Ok(self.cache(algorithm, keys))
    }

    /// Sign with the default algorithm.
    pub fn sign(&self, payload: &[u8]) -> Result<Signature> {
        self.sign_with(self.config.default_algorithm, payload)
    }

    pub fn sign_with(&self, algorithm: Algorithm, payload: &[u8]) -> Result<Signature> {
        self.ensure_keys_exist(algorithm)?.sign(payload)
    }

    /// Sign the contents of a file with the default algorithm.
    pub fn sign_file(&self, path: &Path) -> Result<Signature> {
        let bytes = fs::read(path)?;
        self.sign(&bytes)
    }

    /// Verify using the stored key matching the signature's algorithm.
    pub fn verify(&self, payload: &[u8], signature: &Signature) -> bool {
        match self.load_keys(signature.algorithm()) {
            Ok(Some(keys)) => keys.verify(payload, signature),
            Ok(None) => {
                tracing::warn!(algorithm = %signature.algorithm(), "no key available to verify signature");
                false
            }
            Err(err) => {
                tracing::warn!(algorithm = %signature.algorithm(), "failed to load verification key: {err}");
                false
            }
        }
    }

    /// Verify a signature string as found in a feed; untagged strings are
    /// attributed to the default algorithm.
    pub fn verify_encoded(&self, payload: &[u8], signature: &str) -> bool {
        match Signature::parse_with_default(signature, self.config.default_algorithm) {
            Ok(parsed) => self.verify(payload, &parsed),
            Err(err) => {
                tracing::debug!("rejecting unparseable signature: {err}");
                false
            }
        }
    }

    fn cached(&self, algorithm: Algorithm) -> Option<KeyPairHandle> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&algorithm)
            .cloned()
    }

    fn cache(&self, algorithm: Algorithm, keys: KeyPair) -> KeyPairHandle {
        let handle = Arc::new(keys);
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(algorithm, Arc::clone(&handle));
        handle
    }
}

impl fmt::Debug for TrustManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
