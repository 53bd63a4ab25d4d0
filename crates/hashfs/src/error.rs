//! Error types for the store.
//!
//! Absence is not an error: lookups return `Ok(None)` when a candidate
//! resolves to an address with no file behind it.

use std::io;

use thiserror::Error;

/// Errors surfaced by configuration, address resolution, and storage.
#[derive(Debug, Error)]
pub enum HashFsError {
    /// Rejected at construction time; the store or URL builder cannot be used.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The candidate is neither a well-formed digest nor a shard path under the root.
    #[error("invalid candidate {candidate:?}: {reason}")]
    InvalidCandidate { candidate: String, reason: String },

    #[error("invalid extension {0:?}: must be empty or start with '.' and contain no separators")]
    InvalidExtension(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl HashFsError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn invalid_candidate(candidate: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCandidate {
            candidate: candidate.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HashFsError>;

/// Attach a human-readable context to an `io::Result`, anyhow-style.
pub(crate) trait IoContext<T> {
    fn io_context(self, context: impl Into<String>) -> Result<T>;

    fn with_io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|source| HashFsError::Io {
            context: context.into(),
            source,
        })
    }

    fn with_io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| HashFsError::Io {
            context: f().into(),
            source,
        })
    }
}
