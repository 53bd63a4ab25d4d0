//! Addressing: digest ⇄ shard path, and candidate resolution.
//!
//! Layout for digest `h`, depth `d`, width `w`:
//! ```text
//! {root}/
//! └── h[0:w]/
//!     └── h[w:2w]/
//!         └── ...
//!             └── h[(d-1)w:dw]/
//!                 └── h[dw:]{extension}
//! ```
//!
//! Nothing in this module touches the filesystem.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::HashFsConfig;
use crate::digest::Algorithm;
use crate::error::{HashFsError, Result};

/// Resolved identity of stored content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Hex digest of the content.
    pub id: String,
    /// Shard path relative to the root, always `/`-separated.
    pub relpath: String,
    /// `root` joined with `relpath`.
    pub abspath: PathBuf,
    /// Set by `put` when the content was already present.
    pub is_duplicate: bool,
}

impl Address {
    /// Extension of the stored file (everything from the first `.` of the
    /// final segment), or `""`.
    pub fn extension(&self) -> &str {
        let name = self.relpath.rsplit('/').next().unwrap_or_default();
        name.find('.').map_or("", |idx| &name[idx..])
    }

    pub(crate) fn duplicate(mut self, is_duplicate: bool) -> Self {
        self.is_duplicate = is_duplicate;
        self
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relpath)
    }
}

impl AsRef<Path> for Address {
    fn as_ref(&self) -> &Path {
        &self.abspath
    }
}

/// The form a lookup candidate was given in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKind {
    /// Full-length hex digest, lowercased.
    Id(String),
    /// Path relative to the root.
    RelPath(PathBuf),
    /// Absolute path, expected to live under the root.
    AbsPath(PathBuf),
}

/// Maps digests to shard paths and candidates back to addresses.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    root: PathBuf,
    algorithm: Algorithm,
    depth: usize,
    width: usize,
}

impl AddressResolver {
    /// Build a resolver for `root`, which should already be in the form
    /// absolute candidates are expected to use.
    pub fn new(root: impl Into<PathBuf>, config: &HashFsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            root: root.into(),
            algorithm: config.algorithm,
            depth: config.depth,
            width: config.width,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Whether `s` is a full-length hex digest for the configured algorithm.
    pub fn is_id(&self, s: &str) -> bool {
        s.len() == self.algorithm.hex_len() && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Split a digest into its shard path, appending `extension` to the final segment.
    pub fn shard_path(&self, digest: &str, extension: &str) -> Result<String> {
        if !self.is_id(digest) {
            return Err(HashFsError::invalid_candidate(
                digest,
                format!("expected {} hex characters", self.algorithm.hex_len()),
            ));
        }
        validate_extension(extension)?;

        let digest = digest.to_ascii_lowercase();
        let split = self.depth * self.width;
        let mut relpath = String::with_capacity(digest.len() + self.depth + extension.len());
        for start in (0..split).step_by(self.width) {
            relpath.push_str(&digest[start..start + self.width]);
            relpath.push('/');
        }
        relpath.push_str(&digest[split..]);
        relpath.push_str(extension);
        Ok(relpath)
    }

    /// Address for a digest plus extension.
    pub fn address(&self, digest: &str, extension: &str) -> Result<Address> {
        let relpath = self.shard_path(digest, extension)?;
        Ok(Address {
            id: digest.to_ascii_lowercase(),
            abspath: self.abspath(&relpath),
            relpath,
            is_duplicate: false,
        })
    }

    pub(crate) fn abspath(&self, relpath: &str) -> PathBuf {
        relpath
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Full-length hex wins; then absolute paths; everything else is relative.
    pub fn classify(&self, candidate: &Path) -> CandidateKind {
        if let Some(s) = candidate.to_str() {
            if self.is_id(s) {
                return CandidateKind::Id(s.to_ascii_lowercase());
            }
        }
        if candidate.is_absolute() {
            CandidateKind::AbsPath(candidate.to_path_buf())
        } else {
            CandidateKind::RelPath(candidate.to_path_buf())
        }
    }

    /// Compute the canonical address for any candidate form.
    ///
    /// The address is reported whether or not a file exists there. Ids
    /// resolve without an extension.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> Result<Address> {
        let candidate = candidate.as_ref();
        match self.classify(candidate) {
            CandidateKind::Id(id) => self.address(&id, ""),
            CandidateKind::RelPath(rel) => self.resolve_relpath(candidate, &rel),
            CandidateKind::AbsPath(abs) => {
                let rel = abs.strip_prefix(&self.root).map_err(|_| {
                    HashFsError::invalid_candidate(
                        candidate.display().to_string(),
                        format!("not under root {}", self.root.display()),
                    )
                })?;
                self.resolve_relpath(candidate, rel)
            }
        }
    }

    /// Reverse the shard split of a root-relative path.
    fn resolve_relpath(&self, candidate: &Path, rel: &Path) -> Result<Address> {
        let invalid = |reason: String| {
            HashFsError::invalid_candidate(candidate.display().to_string(), reason)
        };

        let mut segments = Vec::with_capacity(self.depth + 1);
        for component in rel.components() {
            match component {
                Component::Normal(segment) => {
                    let segment = segment
                        .to_str()
                        .ok_or_else(|| invalid("path is not valid UTF-8".to_string()))?;
                    segments.push(segment);
                }
                other => {
                    return Err(invalid(format!(
                        "unexpected path component {:?}",
                        other.as_os_str()
                    )))
                }
            }
        }

        if segments.len() != self.depth + 1 {
            return Err(invalid(format!(
                "expected {} shard directories and a file name, found {} segments",
                self.depth,
                segments.len()
            )));
        }

        let (name, shards) = segments
            .split_last()
            .ok_or_else(|| invalid("empty path".to_string()))?;

        let mut id = String::with_capacity(self.algorithm.hex_len());
        for shard in shards {
            if shard.len() != self.width || !shard.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid(format!(
                    "shard directory {shard:?} is not {} hex characters",
                    self.width
                )));
            }
            id.push_str(shard);
        }

        let (remainder, extension) = match name.find('.') {
            Some(idx) => name.split_at(idx),
            None => (*name, ""),
        };
        id.push_str(remainder);

        if !self.is_id(&id) {
            return Err(invalid(format!(
                "does not reconstruct a {}-character {} digest",
                self.algorithm.hex_len(),
                self.algorithm
            )));
        }

        self.address(&id, extension)
    }
}

/// Extensions are appended verbatim to the final segment, never hashed.
pub fn validate_extension(extension: &str) -> Result<()> {
    let ok = extension.is_empty()
        || (extension.starts_with('.')
            && !extension.contains(['/', '\\', '\0']));
    if ok {
        Ok(())
    } else {
        Err(HashFsError::InvalidExtension(extension.to_string()))
    }
}
