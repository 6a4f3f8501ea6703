//! Content-fingerprint cache.
//!
//! A template is recompiled only when the digest of its text plus the
//! build-version tag differs from the record left by its last successful
//! compile. Records live next to the compiled output:
//!
//! ```text
//! <templateDist>/pages/home.blade.php              compiled output
//! <templateDist>/pages/home.blade.php.fingerprint  fingerprint record
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use vernis_carton::digest_hex;

use crate::error::StoreError;
use crate::store::BuildStore;

const RECORD_EXTENSION: &str = ".fingerprint";

/// Digest of a template's text and the build-version tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(text: &str, version: &str) -> Self {
        let mut input = String::with_capacity(text.len() + version.len());
        input.push_str(text);
        input.push_str(version);
        Self(digest_hex(input.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a stored record, ignoring surrounding whitespace and
    /// ASCII case.
    pub fn matches_record(&self, record: &str) -> bool {
        record.trim().eq_ignore_ascii_case(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Locates fingerprint records and compiled outputs under the template dist
/// root.
#[derive(Debug, Clone)]
pub struct FingerprintCache {
    template_dist: PathBuf,
}

impl FingerprintCache {
    pub fn new(template_dist: impl Into<PathBuf>) -> Self {
        Self {
            template_dist: template_dist.into(),
        }
    }

    /// Where the compiled output of `relative` is written.
    pub fn output_path(&self, relative: &Path) -> PathBuf {
        self.template_dist.join(relative)
    }

    pub fn record_path(&self, relative: &Path) -> PathBuf {
        let mut name = self.output_path(relative).into_os_string();
        name.push(RECORD_EXTENSION);
        PathBuf::from(name)
    }

    /// A missing record always means recompile.
    pub fn should_recompile<S: BuildStore + ?Sized>(
        &self,
        store: &S,
        relative: &Path,
        fingerprint: &Fingerprint,
    ) -> Result<bool, StoreError> {
        let record = store.read(&self.record_path(relative))?;
        Ok(!record.is_some_and(|r| fingerprint.matches_record(&r)))
    }

    /// Record a successful compile. Must be the last write of a file.
    pub fn commit<S: BuildStore + ?Sized>(
        &self,
        store: &mut S,
        relative: &Path,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError> {
        store.write(&self.record_path(relative), fingerprint.as_str())
    }

    /// Output of the last successful compile, if it is still there.
    pub fn load_previous_output<S: BuildStore + ?Sized>(
        &self,
        store: &S,
        relative: &Path,
    ) -> Result<Option<String>, StoreError> {
        store.read(&self.output_path(relative))
    }
}
