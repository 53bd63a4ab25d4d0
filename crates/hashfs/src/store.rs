//! HashFs: filesystem-backed content-addressable store.
//!
//! Layout (depth 2, width 1, sha256):
//! ```text
//! {root}/
//! ├── a/
//! │   └── b/
//! │       ├── c123...        # content, named by the digest remainder
//! │       └── d456....png    # extensions are appended, never hashed
//! └── .staging-<uuid>        # in-flight puts only
//! ```
//!
//! Correctness under concurrent writers, threads or processes, rests on the
//! filesystem alone: content only ever appears at its final path through an
//! atomic rename of a fully written and synced staging file. No locks.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::address::{validate_extension, Address, AddressResolver, CandidateKind};
use crate::config::HashFsConfig;
use crate::digest::{digest_reader, HashingWriter};
use crate::error::{HashFsError, IoContext, Result};
use crate::staging::{is_staging_name, StagingFile};

/// How many times a commit is retried when a concurrent delete prunes the
/// shard directory between creating it and renaming into it.
const COMMIT_ATTEMPTS: usize = 8;

/// Trait for content storage backends.
///
/// Object safe, so hosts can hold an `Arc<dyn ContentStore>` and swap in
/// alternative implementations.
pub trait ContentStore: Send + Sync {
    /// Ingest `source`, returning its address. Identical content is stored once.
    fn put(&self, source: &mut dyn Read, extension: Option<&str>) -> Result<Address>;

    /// Resolve a candidate (id, relative path, or absolute path) to stored content.
    ///
    /// Returns `Ok(None)` if nothing is stored there.
    fn get(&self, candidate: &Path) -> Result<Option<Address>>;

    /// Open stored content for reading. The handle closes when dropped.
    fn open(&self, candidate: &Path) -> Result<Option<File>>;

    /// Remove stored content, returning the address it was removed from.
    fn delete(&self, candidate: &Path) -> Result<Option<Address>>;

    /// Check if content exists without opening it.
    fn exists(&self, candidate: &Path) -> Result<bool> {
        Ok(self.get(candidate)?.is_some())
    }
}

/// Filesystem-based content store.
#[derive(Debug, Clone)]
pub struct HashFs {
    config: HashFsConfig,
    resolver: AddressResolver,
}

impl HashFs {
    /// Create a store with the given configuration.
    ///
    /// Rejects invalid configurations and creates the root directory if it
    /// doesn't exist. The root is canonicalized so absolute candidates compare
    /// against a stable prefix.
    pub fn new(config: HashFsConfig) -> Result<Self> {
        config.validate()?;

        fs::create_dir_all(&config.root).with_io_context(|| {
            format!("failed to create root directory {}", config.root.display())
        })?;
        let root = fs::canonicalize(&config.root).with_io_context(|| {
            format!("failed to canonicalize root {}", config.root.display())
        })?;

        let resolver = AddressResolver::new(root, &config)?;
        tracing::debug!(
            root = %resolver.root().display(),
            algorithm = %config.algorithm,
            depth = config.depth,
            width = config.width,
            "opened store"
        );

        Ok(Self { config, resolver })
    }

    /// Create a store at a specific path with default sharding.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(HashFsConfig::new(path))
    }

    pub fn config(&self) -> &HashFsConfig {
        &self.config
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    /// Ingest a byte stream.
    ///
    /// The source is hashed while it is copied into a staging file, so it is
    /// read exactly once and never held in memory. If the source errors
    /// midway, the staging file is removed and the error returned.
    pub fn put<R: Read>(&self, mut source: R, extension: Option<&str>) -> Result<Address> {
        let extension = extension.unwrap_or("");
        validate_extension(extension)?;

        let mut staging = StagingFile::create(self.root())?;
        let (digest, size) = {
            let file = staging.file_mut().io_context("staging file unavailable")?;
            let mut writer = HashingWriter::new(file, self.config.algorithm);
            io::copy(&mut source, &mut writer).io_context("failed to copy source into staging file")?;
            let (_, digest, size) = writer.finish().io_context("failed to flush staging file")?;
            (digest, size)
        };
        staging.close()?;

        let address = self.resolver.address(&digest, extension)?;
        self.commit(staging, address, size)
    }

    /// Ingest an existing file by path. The file itself is left in place.
    pub fn put_file(&self, path: impl AsRef<Path>, extension: Option<&str>) -> Result<Address> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_io_context(|| format!("failed to open source file {}", path.display()))?;
        self.put(file, extension)
    }

    pub fn put_bytes(&self, data: &[u8], extension: Option<&str>) -> Result<Address> {
        self.put(data, extension)
    }

    /// Move a fully written staging file to its canonical path.
    fn commit(&self, mut staging: StagingFile, address: Address, size: u64) -> Result<Address> {
        let mut attempts = 0;

        loop {
            if is_file(&address.abspath)? {
                // Dropping the staging file discards it.
                tracing::debug!(id = %address.id, relpath = %address.relpath, "content already stored");
                return Ok(address.duplicate(true));
            }

            if let Some(parent) = address.abspath.parent() {
                match fs::create_dir_all(parent) {
                    Ok(()) => {}
                    // An intermediate directory was pruned mid-creation.
                    Err(e) if e.kind() == io::ErrorKind::NotFound && attempts + 1 < COMMIT_ATTEMPTS => {
                        attempts += 1;
                        continue;
                    }
                    Err(e) => {
                        return Err(HashFsError::Io {
                            context: format!("failed to create shard directory {}", parent.display()),
                            source: e,
                        })
                    }
                }
            }

            match staging.try_commit(&address.abspath) {
                Ok(()) => {
                    tracing::debug!(
                        id = %address.id,
                        relpath = %address.relpath,
                        size,
                        "stored content"
                    );
                    return Ok(address);
                }
                Err((returned, e))
                    if e.kind() == io::ErrorKind::NotFound && attempts + 1 < COMMIT_ATTEMPTS =>
                {
                    attempts += 1;
                    tracing::debug!(id = %address.id, attempts, "shard directory vanished during commit, retrying");
                    staging = returned;
                }
                Err((_returned, e)) => {
                    // Another writer may have won the race for the same content.
                    if is_file(&address.abspath)? {
                        return Ok(address.duplicate(true));
                    }
                    return Err(HashFsError::Io {
                        context: format!("failed to commit {}", address.relpath),
                        source: e,
                    });
                }
            }
        }
    }

    /// Resolve a candidate and check that a file exists behind it.
    ///
    /// An id also matches content stored with an extension.
    pub fn get(&self, candidate: impl AsRef<Path>) -> Result<Option<Address>> {
        let candidate = candidate.as_ref();
        let kind = self.resolver.classify(candidate);
        let address = self.resolver.resolve(candidate)?;

        if is_file(&address.abspath)? {
            return Ok(Some(address));
        }

        match kind {
            CandidateKind::Id(_) => self.find_with_extension(&address),
            CandidateKind::RelPath(_) | CandidateKind::AbsPath(_) => Ok(None),
        }
    }

    /// Look for `<remainder>.<ext>` next to where the bare id would live.
    fn find_with_extension(&self, address: &Address) -> Result<Option<Address>> {
        let (Some(dir), Some(name)) = (
            address.abspath.parent(),
            address.abspath.file_name().and_then(|n| n.to_str()),
        ) else {
            return Ok(None);
        };

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HashFsError::Io {
                    context: format!("failed to list shard directory {}", dir.display()),
                    source: e,
                })
            }
        };

        let prefix = format!("{name}.");
        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry.with_io_context(|| format!("failed to list {}", dir.display()))?;
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if file_name.starts_with(&prefix) && entry.path().is_file() {
                matches.push(file_name);
            }
        }
        matches.sort();

        match matches.first() {
            Some(file_name) => {
                let extension = &file_name[name.len()..];
                Ok(Some(self.resolver.address(&address.id, extension)?))
            }
            None => Ok(None),
        }
    }

    pub fn exists(&self, candidate: impl AsRef<Path>) -> Result<bool> {
        Ok(self.get(candidate)?.is_some())
    }

    /// Open stored content for sequential reading.
    pub fn open(&self, candidate: impl AsRef<Path>) -> Result<Option<File>> {
        let Some(address) = self.get(candidate)? else {
            return Ok(None);
        };
        match File::open(&address.abspath) {
            Ok(file) => Ok(Some(file)),
            // Deleted between lookup and open.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HashFsError::Io {
                context: format!("failed to open {}", address.relpath),
                source: e,
            }),
        }
    }

    /// Read stored content fully into memory.
    pub fn read(&self, candidate: impl AsRef<Path>) -> Result<Option<Vec<u8>>> {
        let Some(mut file) = self.open(candidate)? else {
            return Ok(None);
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .io_context("failed to read stored content")?;
        Ok(Some(data))
    }

    /// Remove stored content and any shard directories left empty.
    ///
    /// Deleting something that isn't there is `Ok(None)`, not an error.
    pub fn delete(&self, candidate: impl AsRef<Path>) -> Result<Option<Address>> {
        let Some(address) = self.get(candidate)? else {
            return Ok(None);
        };

        match fs::remove_file(&address.abspath) {
            Ok(()) => {}
            // Lost a race with another delete.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HashFsError::Io {
                    context: format!("failed to remove {}", address.relpath),
                    source: e,
                })
            }
        }
        tracing::debug!(id = %address.id, relpath = %address.relpath, "deleted content");

        if let Some(parent) = address.abspath.parent() {
            self.prune_empty_dirs(parent)?;
        }
        Ok(Some(address))
    }

    /// Walk upward from `dir` removing empty directories, stopping at the
    /// root or the first directory that still has entries.
    fn prune_empty_dirs(&self, dir: &Path) -> Result<()> {
        let root = self.root();
        let mut current = dir;

        while current != root && current.starts_with(root) {
            match fs::remove_dir(current) {
                Ok(()) => {
                    tracing::debug!(dir = %current.display(), "pruned empty shard directory");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    if removal_raced(current) {
                        break;
                    }
                    return Err(HashFsError::Io {
                        context: format!("failed to remove shard directory {}", current.display()),
                        source: e,
                    });
                }
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Ok(())
    }

    /// Every stored file, in path order. Staging files and anything that does
    /// not fit the shard layout are skipped.
    pub fn files(&self) -> Result<Vec<Address>> {
        let mut paths = Vec::new();
        collect_files(self.root(), true, &mut paths)?;
        paths.sort();

        let mut addresses = Vec::with_capacity(paths.len());
        for path in paths {
            match self.resolver.resolve(&path) {
                Ok(address) => addresses.push(address),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping file outside shard layout");
                }
            }
        }
        Ok(addresses)
    }

    /// Number of stored files.
    pub fn count(&self) -> Result<usize> {
        Ok(self.files()?.len())
    }

    /// Total bytes of stored content.
    ///
    /// Files deleted while the total is being taken are left out.
    pub fn size(&self) -> Result<u64> {
        total_size(&self.files()?)
    }

    /// Files whose content no longer hashes to their path, each paired with
    /// the address the content actually belongs at.
    pub fn corrupted(&self) -> Result<Vec<(PathBuf, Address)>> {
        self.check(self.files()?)
    }

    fn check(&self, listed: Vec<Address>) -> Result<Vec<(PathBuf, Address)>> {
        let mut corrupted = Vec::new();
        for address in listed {
            let file = match File::open(&address.abspath) {
                Ok(file) => file,
                // Deleted since it was listed.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(HashFsError::Io {
                        context: format!("failed to open {}", address.relpath),
                        source: e,
                    })
                }
            };
            let digest = digest_reader(self.config.algorithm, file)
                .with_io_context(|| format!("failed to hash {}", address.relpath))?;

            if digest != address.id {
                let expected = self.resolver.address(&digest, address.extension())?;
                tracing::debug!(found = %address.relpath, expected = %expected.relpath, "corrupted content");
                corrupted.push((address.abspath, expected));
            }
        }
        Ok(corrupted)
    }

    /// Move every corrupted file to the address its content belongs at.
    ///
    /// If content is already stored there, the misplaced copy is removed and
    /// the returned address is marked duplicate.
    pub fn repair(&self) -> Result<Vec<Address>> {
        let mut repaired = Vec::new();
        for (path, expected) in self.corrupted()? {
            let duplicate = is_file(&expected.abspath)?;
            let moved = if duplicate {
                fs::remove_file(&path)
            } else {
                if let Some(parent) = expected.abspath.parent() {
                    fs::create_dir_all(parent).with_io_context(|| {
                        format!("failed to create shard directory {}", parent.display())
                    })?;
                }
                fs::rename(&path, &expected.abspath)
            };
            match moved {
                Ok(()) => {}
                // Someone else deleted it first; nothing left to repair.
                Err(e) if e.kind() == io::ErrorKind::NotFound && !path.exists() => {
                    if let Some(parent) = path.parent() {
                        self.prune_empty_dirs(parent)?;
                    }
                    continue;
                }
                Err(e) => {
                    return Err(HashFsError::Io {
                        context: format!("failed to repair {} as {}", path.display(), expected.relpath),
                        source: e,
                    })
                }
            }

            if let Some(parent) = path.parent() {
                self.prune_empty_dirs(parent)?;
            }
            tracing::debug!(from = %path.display(), to = %expected.relpath, duplicate, "repaired content");
            repaired.push(expected.duplicate(duplicate));
        }
        Ok(repaired)
    }
}

impl ContentStore for HashFs {
    fn put(&self, source: &mut dyn Read, extension: Option<&str>) -> Result<Address> {
        HashFs::put(self, source, extension)
    }

    fn get(&self, candidate: &Path) -> Result<Option<Address>> {
        HashFs::get(self, candidate)
    }

    fn open(&self, candidate: &Path) -> Result<Option<File>> {
        HashFs::open(self, candidate)
    }

    fn delete(&self, candidate: &Path) -> Result<Option<Address>> {
        HashFs::delete(self, candidate)
    }
}

/// Sum of file sizes, skipping anything deleted since it was listed.
fn total_size(listed: &[Address]) -> Result<u64> {
    let mut total = 0;
    for address in listed {
        match fs::metadata(&address.abspath) {
            Ok(meta) => total += meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(HashFsError::Io {
                    context: format!("failed to stat {}", address.relpath),
                    source: e,
                })
            }
        }
    }
    Ok(total)
}

/// `Ok(false)` for absent paths; other stat failures are surfaced.
fn is_file(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(HashFsError::Io {
            context: format!("failed to stat {}", path.display()),
            source: e,
        }),
    }
}

/// Whether a failed `remove_dir` only means the directory is still in use
/// (not empty, or refilled by a concurrent put) or was pruned by someone else.
fn removal_raced(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(e) => e.kind() == io::ErrorKind::NotFound,
    }
}

fn collect_files(dir: &Path, is_root: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        // A shard directory pruned by a concurrent delete.
        Err(e) if !is_root && e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(HashFsError::Io {
                context: format!("failed to list {}", dir.display()),
                source: e,
            })
        }
    };

    for entry in entries {
        let entry = entry.with_io_context(|| format!("failed to list {}", dir.display()))?;
        if is_root && entry.file_name().to_str().is_some_and(is_staging_name) {
            continue;
        }

        let file_type = entry
            .file_type()
            .with_io_context(|| format!("failed to stat {}", entry.path().display()))?;
        if file_type.is_dir() {
            collect_files(&entry.path(), false, out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{digest_bytes, Algorithm};
    use anyhow::Result;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn store_with(depth: usize, width: usize) -> Result<(HashFs, TempDir)> {
        let temp_dir = TempDir::new()?;
        let config = HashFsConfig::new(temp_dir.path())
            .with_depth(depth)
            .with_width(width);
        Ok((HashFs::new(config)?, temp_dir))
    }

    /// Root entries other than the root itself, staging files included.
    fn root_entries(store: &HashFs) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_put_and_read() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;

        let address = store.put_bytes(b"Hello, World!", None)?;
        assert_eq!(address.id, digest_bytes(Algorithm::Sha256, b"Hello, World!"));
        assert!(!address.is_duplicate);
        assert_eq!(
            address.relpath,
            format!("{}/{}/{}", &address.id[..1], &address.id[1..2], &address.id[2..])
        );
        assert_eq!(address.abspath, store.root().join(&address.id[..1]).join(&address.id[1..2]).join(&address.id[2..]));

        let data = store.read(&address.id)?.expect("should exist");
        assert_eq!(data, b"Hello, World!");
        Ok(())
    }

    #[test]
    fn test_deduplication() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;

        let first = store.put_bytes(b"Duplicate Me", None)?;
        let second = store.put_bytes(b"Duplicate Me", None)?;

        assert_eq!(first.id, second.id);
        assert_eq!(first.relpath, second.relpath);
        assert!(!first.is_duplicate);
        assert!(second.is_duplicate);
        assert_eq!(store.count()?, 1);
        Ok(())
    }

    #[test]
    fn test_put_with_extension() -> Result<()> {
        let (store, _temp) = store_with(2, 2)?;

        let address = store.put_bytes(b"{}", Some(".json"))?;
        assert!(address.relpath.ends_with(".json"));
        assert_eq!(address.extension(), ".json");
        assert_eq!(address.id, digest_bytes(Algorithm::Sha256, b"{}"));

        // The bare id still finds it.
        let found = store.get(&address.id)?.expect("should resolve by id");
        assert_eq!(found, address);
        Ok(())
    }

    #[test]
    fn test_put_rejects_bad_extension() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;

        let result = store.put_bytes(b"data", Some("txt"));
        assert!(matches!(result, Err(HashFsError::InvalidExtension(_))));
        assert!(root_entries(&store).is_empty());
        Ok(())
    }

    #[test]
    fn test_put_file() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        let source_dir = TempDir::new()?;
        let source = source_dir.path().join("upload.txt");
        fs::write(&source, b"from a file")?;

        let address = store.put_file(&source, Some(".txt"))?;
        assert!(source.exists());
        assert_eq!(root_entries(&store).len(), 1);

        assert_eq!(store.read(&address.relpath)?.expect("stored"), b"from a file");
        Ok(())
    }

    #[test]
    fn test_put_file_missing_source_is_io_error() -> Result<()> {
        let (store, temp) = store_with(2, 1)?;
        let result = store.put_file(temp.path().join("nope"), None);
        assert!(matches!(result, Err(HashFsError::Io { .. })));
        Ok(())
    }

    #[test]
    fn test_failing_source_leaves_no_staging_file() -> Result<()> {
        struct Broken {
            sent: bool,
        }
        impl Read for Broken {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.sent {
                    return Err(io::Error::new(io::ErrorKind::ConnectionReset, "source closed"));
                }
                self.sent = true;
                buf[..4].copy_from_slice(b"part");
                Ok(4)
            }
        }

        let (store, _temp) = store_with(2, 1)?;
        let result = store.put(Broken { sent: false }, None);

        assert!(matches!(result, Err(HashFsError::Io { .. })));
        assert!(root_entries(&store).is_empty());
        Ok(())
    }

    #[test]
    fn test_get_missing_is_none() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        let missing = "0".repeat(64);
        assert_eq!(store.get(&missing)?, None);
        assert!(!store.exists(&missing)?);
        assert!(store.open(&missing)?.is_none());
        Ok(())
    }

    #[test]
    fn test_get_invalid_candidate_is_error() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        assert!(matches!(
            store.get("not/a/digest"),
            Err(HashFsError::InvalidCandidate { .. })
        ));
        assert!(matches!(
            store.get("/definitely/not/under/root"),
            Err(HashFsError::InvalidCandidate { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_delete_prunes_shard_dirs() -> Result<()> {
        let (store, _temp) = store_with(3, 2)?;

        let address = store.put_bytes(b"short lived", None)?;
        let deleted = store.delete(&address.abspath)?.expect("should delete");
        assert_eq!(deleted.id, address.id);

        assert!(!address.abspath.exists());
        assert!(root_entries(&store).is_empty());
        assert_eq!(store.delete(&address.id)?, None);
        Ok(())
    }

    #[test]
    fn test_delete_keeps_shared_shard_dirs() -> Result<()> {
        // Depth 1, width 1: 17 distinct contents must share a first-level shard.
        let (store, _temp) = store_with(1, 1)?;
        let addresses: Vec<Address> = (0..17)
            .map(|i| store.put_bytes(format!("content {i}").as_bytes(), None))
            .collect::<crate::Result<_>>()?;

        for address in &addresses {
            store.delete(&address.relpath)?;
            for other in store.files()? {
                assert!(other.abspath.exists());
            }
        }
        assert!(root_entries(&store).is_empty());
        Ok(())
    }

    #[test]
    fn test_files_count_size() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        store.put_bytes(b"one", None)?;
        store.put_bytes(b"three", Some(".txt"))?;
        store.put_bytes(b"one", None)?;

        let files = store.files()?;
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|a| !a.is_duplicate));
        assert_eq!(store.count()?, 2);
        assert_eq!(store.size()?, 8);
        Ok(())
    }

    #[test]
    fn test_files_skips_strays() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        store.put_bytes(b"real", None)?;
        fs::write(store.root().join("README"), b"not content")?;

        assert_eq!(store.count()?, 1);
        Ok(())
    }

    #[test]
    fn test_corrupted_and_repair() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        let good = store.put_bytes(b"good", None)?;
        let victim = store.put_bytes(b"original", Some(".bin"))?;

        // Overwrite in place so the path no longer matches the content.
        fs::write(&victim.abspath, b"tampered")?;

        let corrupted = store.corrupted()?;
        assert_eq!(corrupted.len(), 1);
        assert_eq!(corrupted[0].0, victim.abspath);
        assert_eq!(corrupted[0].1.id, digest_bytes(Algorithm::Sha256, b"tampered"));
        assert_eq!(corrupted[0].1.extension(), ".bin");

        let repaired = store.repair()?;
        assert_eq!(repaired.len(), 1);
        assert!(!repaired[0].is_duplicate);
        assert!(!victim.abspath.exists());
        assert_eq!(fs::read(&repaired[0].abspath)?, b"tampered");
        assert!(store.corrupted()?.is_empty());
        assert!(store.exists(&good.id)?);
        Ok(())
    }

    #[test]
    fn test_repair_dedups_against_existing() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        let keeper = store.put_bytes(b"same", None)?;
        let victim = store.put_bytes(b"different", None)?;
        fs::write(&victim.abspath, b"same")?;

        let repaired = store.repair()?;
        assert_eq!(repaired.len(), 1);
        assert!(repaired[0].is_duplicate);
        assert_eq!(repaired[0].id, keeper.id);
        assert_eq!(store.count()?, 1);
        Ok(())
    }

    #[test]
    fn test_size_and_check_skip_deleted_entries() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        let kept = store.put_bytes(b"kept", None)?;
        let gone = store.put_bytes(b"gone", None)?;

        let listed = store.files()?;
        assert_eq!(listed.len(), 2);
        store.delete(&gone.id)?;

        assert_eq!(total_size(&listed)?, 4);
        assert!(store.check(listed)?.is_empty());
        assert!(store.exists(&kept.id)?);
        Ok(())
    }

    #[test]
    fn test_collect_files_skips_vanished_shard_dir() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        let mut out = Vec::new();
        collect_files(&store.root().join("f"), false, &mut out)?;
        assert!(out.is_empty());
        assert!(collect_files(&store.root().join("missing-root"), true, &mut out).is_err());
        Ok(())
    }

    #[test]
    fn test_whole_store_scans_during_deletes() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        let store = Arc::new(store);
        let addresses: Vec<Address> = (0..200)
            .map(|i| store.put_bytes(format!("scan item {i}").as_bytes(), None))
            .collect::<crate::Result<_>>()?;

        let deleter = {
            let store = store.clone();
            thread::spawn(move || {
                for address in addresses {
                    store.delete(&address.id).expect("delete failed");
                }
            })
        };

        while !deleter.is_finished() {
            store.size()?;
            store.corrupted()?;
            store.repair()?;
        }
        deleter.join().unwrap();

        assert_eq!(store.count()?, 0);
        assert_eq!(store.size()?, 0);
        Ok(())
    }

    #[test]
    fn test_concurrent_writes() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        let store = Arc::new(store);
        let expected = digest_bytes(Algorithm::Sha256, b"Concurrent Data");

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.put_bytes(b"Concurrent Data", None).expect("write failed"))
            })
            .collect();

        for handle in handles {
            let address = handle.join().unwrap();
            assert_eq!(address.id, expected);
        }

        assert_eq!(store.read(&expected)?.expect("should exist"), b"Concurrent Data");
        assert_eq!(store.count()?, 1);
        // Only the shard tree remains; every staging file was committed or discarded.
        assert_eq!(root_entries(&store).len(), 1);
        Ok(())
    }

    #[test]
    fn test_concurrent_put_and_delete() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        let data = format!("thread {t} item {i}");
                        let address = store.put_bytes(data.as_bytes(), None).expect("put failed");
                        if i % 2 == 0 {
                            store.delete(&address.id).expect("delete failed");
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count()?, 8 * 12);
        Ok(())
    }

    #[test]
    fn test_trait_object() -> Result<()> {
        let (store, _temp) = store_with(2, 1)?;
        let store: Arc<dyn ContentStore> = Arc::new(store);

        let address = store.put(&mut &b"via trait"[..], None)?;
        assert!(store.exists(Path::new(&address.id))?);

        let mut contents = String::new();
        store
            .open(Path::new(&address.relpath))?
            .expect("should open")
            .read_to_string(&mut contents)?;
        assert_eq!(contents, "via trait");

        assert!(store.delete(&address.abspath)?.is_some());
        assert!(!store.exists(&address.abspath)?);
        Ok(())
    }

    #[test]
    fn test_throughput() -> Result<()> {
        let (store, _temp) = store_with(4, 1)?;
        let data = vec![0u8; 1024 * 1024]; // 1MB

        let start = std::time::Instant::now();
        for i in 0..10u8 {
            let mut chunk = data.clone();
            chunk[0] = i;
            store.put_bytes(&chunk, None)?;
        }
        let duration = start.elapsed();

        println!("Wrote 10MB in {:?}", duration);
        assert!(duration.as_secs() < 10, "should write 10MB in under 10 seconds");
        Ok(())
    }
}
