//! Content-addressable file storage.
//!
//! Blobs are stored under a path derived from a digest of their contents,
//! split into fixed-width shard directories. Identical content always lands
//! at the same path and is stored once.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hashfs::{HashFs, HashFsConfig, UrlBuilder};
//!
//! let config = HashFsConfig::new("/srv/uploads")
//!     .with_depth(2)
//!     .with_width(1)
//!     .with_path_prefix("/uploads");
//! let store = HashFs::new(config.clone()).unwrap();
//!
//! // Store content (any `Read`, a file path, or bytes)
//! let address = store.put_bytes(b"Hello, World!", Some(".txt")).unwrap();
//! println!("Stored {} at {}", address.id, address.relpath);
//!
//! // Look it up by id, relative path, or absolute path
//! assert_eq!(store.get(&address.id).unwrap(), Some(address.clone()));
//! assert_eq!(store.get(&address.abspath).unwrap(), Some(address.clone()));
//!
//! // Public URL
//! let urls = UrlBuilder::new(&config).unwrap();
//! println!("{}", urls.url_for(&address.relpath));
//!
//! // Remove it, and any shard directories left empty
//! store.delete(&address.id).unwrap();
//! ```
//!
//! # Configuration
//!
//! [`HashFsConfig`] is built explicitly, loaded from a TOML file, or read
//! from `HASHFS_*` environment variables. It is validated once when the
//! store or URL builder is constructed.
//!
//! # Concurrency
//!
//! All operations are safe to call from many threads or processes against the
//! same root. Content is write-once and appears only through atomic renames;
//! there is no locking.

pub mod address;
pub mod config;
pub mod digest;
pub mod error;
mod staging;
pub mod store;
pub mod url;

// Re-exports for convenience
pub use address::{Address, AddressResolver, CandidateKind};
pub use config::HashFsConfig;
pub use digest::{Algorithm, HashingWriter, Hasher};
pub use error::{HashFsError, Result};
pub use store::{ContentStore, HashFs};
pub use url::UrlBuilder;
