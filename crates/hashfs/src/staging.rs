//! Staging: temporary files that become immutable content on commit.
//!
//! A put streams into a staging file created directly inside the root, so
//! the final rename never crosses a filesystem boundary. Staging names start
//! with a dot and are never hex, so they cannot collide with shard
//! directories or be mistaken for stored content.
//!
//! A staging file that is dropped without being committed deletes itself.
//! That covers errors, early returns, and callers abandoning the source.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{IoContext, Result};

pub(crate) const STAGING_PREFIX: &str = ".staging-";

/// Whether a root-level entry name belongs to an in-flight put.
pub(crate) fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

/// A handle to a temporary file inside the root.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl StagingFile {
    /// Create a fresh staging file in `root`.
    pub(crate) fn create(root: &Path) -> Result<Self> {
        let path = root.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4().simple()));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_io_context(|| format!("failed to create staging file {}", path.display()))?;

        Ok(Self {
            path,
            file: Some(file),
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writable handle; errors once closed.
    pub(crate) fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("staging file already closed"))
    }

    /// Sync data to disk and close the handle, ready for commit.
    pub(crate) fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .with_io_context(|| format!("failed to sync staging file {}", self.path.display()))?;
        }
        Ok(())
    }

    /// Atomically rename into `dest`, handing the staging file back on
    /// failure so the caller can retry or let it drop.
    pub(crate) fn try_commit(mut self, dest: &Path) -> std::result::Result<(), (Self, io::Error)> {
        self.file = None;
        match fs::rename(&self.path, dest) {
            Ok(()) => {
                self.committed = true;
                Ok(())
            }
            Err(e) => Err((self, e)),
        }
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.file = None;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "discarded staging file");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove staging file"
                );
            }
        }
    }
}
