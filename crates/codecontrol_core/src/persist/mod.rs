//! Graph persistence: manifest + per-entity JSON blobs.
//!
//! # Responsibility
//! - Save entities (optionally with everything they reach) into a [`Bundle`].
//! - Write bundles to, and load graphs from, pluggable [`BlobStore`]s.
//! - Load cooperatively in bounded steps, rolling back on failure.
//!
//! # Invariants
//! - Only types registered with `Registry::register_type` are persisted.
//! - A saved graph is a manifest under `__manifest__` plus one blob per entry.

pub mod bundle;
pub mod error;
pub mod load;
pub mod manifest;
pub mod save;
pub mod sqlite_store;
pub mod store;
pub(crate) mod types;

pub use bundle::{Bundle, BUNDLE_DELIMITER};
pub use error::{PersistError, PersistResult};
pub use load::{CancelToken, LoadProgress, LoadSequence, LoadStatus};
pub use manifest::{Manifest, ManifestEntry, ManifestValidationError, MANIFEST_VERSION};
pub use sqlite_store::SqliteBlobStore;
pub use store::{BlobStore, DirectoryBlobStore, MemoryBlobStore};
