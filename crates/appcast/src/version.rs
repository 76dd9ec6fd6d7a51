//! Lenient, ordered version values.
//!
//! Release titles and file names rarely carry clean semantic versions, so a
//! [`SemVerLike`] is built from the *last* run of dot-separated digit groups in
//! arbitrary text. Whatever follows that run is kept verbatim as the suffix and
//! is what channel filtering searches for tokens such as `beta`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppcastError;

static NUMERIC_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)+").expect("valid numeric run pattern"));

/// A version made of any number of numeric components plus a free-text suffix.
#[derive(Debug, Clone)]
pub struct SemVerLike {
    components: Vec<u64>,
    suffix: String,
}

impl SemVerLike {
    /// Parse the last numeric run found in `raw`.
    ///
    /// Returns `None` when `raw` holds no run of at least two dot-separated
    /// digit groups (`"foo1."` has no complete run).
    pub fn parse(raw: &str) -> Option<Self> {
        let run = last_numeric_run(raw)?;
        let components = run
            .as_str()
            .split('.')
            .map(|part| part.parse::<u64>().unwrap_or(u64::MAX))
            .collect();
        Some(Self {
            components,
            suffix: raw[run.end()..].to_string(),
        })
    }

    /// Numeric components in the order they appeared.
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Everything after the matched numeric run.
    pub fn all_suffixes(&self) -> &str {
        &self.suffix
    }

    /// True when the suffix carries any non-whitespace text.
    pub fn has_suffix(&self) -> bool {
        !self.suffix.trim().is_empty()
    }

    fn component(&self, index: usize) -> u64 {
        self.components.get(index).copied().unwrap_or(0)
    }
}

/// The text of the last numeric run in a file name, e.g. `2.0.3` for
/// `MyApp-Beta7-v2.0.3.exe`.
pub fn infer_version_from_filename(name: &str) -> Option<String> {
    last_numeric_run(name).map(|run| run.as_str().to_string())
}

fn last_numeric_run(raw: &str) -> Option<regex::Match<'_>> {
    NUMERIC_RUN.find_iter(raw).last()
}

impl Ord for SemVerLike {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for index in 0..len {
            match self.component(index).cmp(&other.component(index)) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.suffix
            .to_lowercase()
            .cmp(&other.suffix.to_lowercase())
    }
}

impl PartialOrd for SemVerLike {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemVerLike {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemVerLike {}

impl fmt::Display for SemVerLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numeric: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}{}", numeric.join("."), self.suffix)
    }
}

impl FromStr for SemVerLike {
    type Err = AppcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| AppcastError::InvalidVersion(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> SemVerLike {
        SemVerLike::parse(raw).expect("version parses")
    }

    #[test]
    fn extracts_version_from_file_names() {
        assert_eq!(infer_version_from_filename("foo"), None);
        assert_eq!(infer_version_from_filename("foo1."), None);
        assert_eq!(infer_version_from_filename("foo1.0").as_deref(), Some("1.0"));
        assert_eq!(infer_version_from_filename("foo0.1").as_deref(), Some("0.1"));
        assert_eq!(
            infer_version_from_filename("foo0.0.3.1").as_deref(),
            Some("0.0.3.1")
        );
        assert_eq!(
            infer_version_from_filename("foo1.2.4.8").as_deref(),
            Some("1.2.4.8")
        );
        assert_eq!(
            infer_version_from_filename("1.0bar7.8foo 1.2.4.8").as_deref(),
            Some("1.2.4.8")
        );
        assert_eq!(
            infer_version_from_filename("1.0bar7.8foo6.3 2.0").as_deref(),
            Some("2.0")
        );
        assert_eq!(
            infer_version_from_filename("MyApp-Beta7-v2.0.3.exe").as_deref(),
            Some("2.0.3")
        );
    }

    #[test]
    fn keeps_text_after_the_run_as_suffix() {
        let version = v("1.2.3-beta1");
        assert_eq!(version.components(), &[1, 2, 3]);
        assert_eq!(version.all_suffixes(), "-beta1");
        assert!(version.has_suffix());
        assert!(!v("1.2.3").has_suffix());
    }

    #[test]
    fn missing_components_compare_as_zero() {
        assert_eq!(v("1.3"), v("1.3.0"));
        assert!(v("1.3.1") > v("1.3"));
        assert!(v("1.10") > v("1.9.9"));
        assert!(v("2.0") > v("1.99.99.99"));
    }

    #[test]
    fn suffix_breaks_numeric_ties_case_insensitively() {
        assert_eq!(v("1.0-BETA"), v("1.0-beta"));
        assert!(v("1.0-beta2") > v("1.0-beta1"));
        assert!(v("1.0-alpha") < v("1.0-beta"));
        assert!(v("1.0") < v("1.0-beta"));
    }

    #[test]
    fn from_str_rejects_unversioned_text() {
        assert!("release".parse::<SemVerLike>().is_err());
        assert_eq!("v4.5".parse::<SemVerLike>().unwrap().to_string(), "4.5");
    }
}
