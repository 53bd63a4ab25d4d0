//! Store configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `HASHFS_ROOT_FOLDER`: Root folder to save files (required)
//! - `HASHFS_DEPTH`: Number of nested shard folders (default 4)
//! - `HASHFS_WIDTH`: Hex characters per shard folder (default 1)
//! - `HASHFS_ALGORITHM`: Digest algorithm (default `sha256`)
//! - `HASHFS_HOST`: Host for generated URLs (default none, relative URLs)
//! - `HASHFS_PATH_PREFIX`: URL path prefix (default empty)

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::digest::Algorithm;
use crate::error::{HashFsError, IoContext, Result};

pub const DEFAULT_DEPTH: usize = 4;
pub const DEFAULT_WIDTH: usize = 1;

/// Immutable configuration shared by [`HashFs`](crate::HashFs) and
/// [`UrlBuilder`](crate::UrlBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashFsConfig {
    /// Base directory for all stored content.
    pub root: PathBuf,

    /// Digest function used for addressing.
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Number of shard-directory levels.
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Hex characters consumed per shard level.
    #[serde(default = "default_width")]
    pub width: usize,

    /// URL host/scheme for generated URLs. `None` produces host-relative URLs.
    #[serde(default)]
    pub host: Option<String>,

    /// URL path segment prepended before the relative path.
    #[serde(default)]
    pub path_prefix: String,
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

fn default_width() -> usize {
    DEFAULT_WIDTH
}

impl HashFsConfig {
    /// Create a config rooted at `root` with default sharding and no URL host.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            algorithm: Algorithm::default(),
            depth: DEFAULT_DEPTH,
            width: DEFAULT_WIDTH,
            host: None,
            path_prefix: String::new(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    /// Check every constraint the store and URL builder rely on.
    ///
    /// `depth * width` must be strictly less than the digest's hex length.
    /// Equal is rejected too: the shards would consume the whole digest and
    /// leave no file name.
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(HashFsError::config("root must be set"));
        }
        if self.width == 0 {
            return Err(HashFsError::config("width must be at least 1"));
        }

        let hex_len = self.algorithm.hex_len();
        let sharded = self.depth.checked_mul(self.width).unwrap_or(usize::MAX);
        if sharded >= hex_len {
            return Err(HashFsError::config(format!(
                "depth * width ({} * {}) must be less than the {} digest length of {} hex characters",
                self.depth, self.width, self.algorithm, hex_len
            )));
        }

        if !self.path_prefix.is_empty() && !self.path_prefix.starts_with('/') {
            return Err(HashFsError::config(format!(
                "path_prefix must start with a leading slash, got {:?}",
                self.path_prefix
            )));
        }

        Ok(())
    }

    /// Load configuration from `HASHFS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|var| env::var(var).ok(), None)
    }

    /// Like [`from_env`](Self::from_env), but `root` (when given) replaces
    /// `HASHFS_ROOT_FOLDER`, which then need not be set. Every other
    /// variable still applies, and malformed values are still errors.
    pub fn from_env_with_root(root: Option<PathBuf>) -> Result<Self> {
        Self::from_vars(|var| env::var(var).ok(), root)
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>, root: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(root) => root,
            None => lookup("HASHFS_ROOT_FOLDER")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| HashFsError::config("HASHFS_ROOT_FOLDER must be set"))?,
        };

        let mut config = Self::new(root);

        if let Some(alg) = lookup("HASHFS_ALGORITHM") {
            config.algorithm = alg.parse()?;
        }
        if let Some(depth) = lookup("HASHFS_DEPTH") {
            config.depth = parse_usize("HASHFS_DEPTH", &depth)?;
        }
        if let Some(width) = lookup("HASHFS_WIDTH") {
            config.width = parse_usize("HASHFS_WIDTH", &width)?;
        }
        config.host = lookup("HASHFS_HOST").filter(|v| !v.is_empty());
        if let Some(prefix) = lookup("HASHFS_PATH_PREFIX") {
            config.path_prefix = prefix;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to environment.
    ///
    /// The file should contain a `[hashfs]` section:
    /// ```toml
    /// [hashfs]
    /// root = "/srv/uploads"
    /// algorithm = "sha256"
    /// depth = 2
    /// width = 2
    /// path_prefix = "/uploads"
    /// ```
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_io_context(|| format!("failed to read config file: {}", path.display()))?;

        let table: toml::Table = contents.parse().map_err(|e| {
            HashFsError::config(format!("failed to parse TOML {}: {e}", path.display()))
        })?;

        match table.get("hashfs") {
            Some(section) => section
                .clone()
                .try_into()
                .map_err(|e| HashFsError::config(format!("failed to parse [hashfs] section: {e}"))),
            None => Self::from_env(),
        }
    }

    /// Per-user config file location (`~/.config/hashfs/config.toml` on Linux).
    pub fn default_config_file() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "hashfs")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

fn parse_usize(var: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| HashFsError::config(format!("{var} must be a non-negative integer, got {value:?}")))
}
