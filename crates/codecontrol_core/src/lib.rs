//! Entity graph core: a message bus, an entity registry with counted owning
//! references, and manifest-based graph persistence.
//!
//! Everything here is single-threaded: registries, buses and handles are
//! `!Send` and meant to live on the thread that drives the host loop.

pub mod config;
pub mod db;
pub mod error;
pub mod listener;
pub mod logging;
pub mod message;
pub mod model;
pub mod persist;
pub mod reference;

pub use config::{ConfigError, RegistryConfig, DEFAULT_LOAD_BATCH_SIZE};
pub use error::{ModelError, ModelResult};
pub use listener::{ignore_model, ListenerId, Subscription};
pub use logging::{default_log_level, init_logging, logging_status};
pub use message::{default_bus, Message, MessageBus, MessageKey};
pub use model::{AnyModel, Model, ModelEvent, ModelHandle, ModelId, ModelIdError, Registry};
pub use persist::{
    BlobStore, Bundle, CancelToken, DirectoryBlobStore, LoadProgress, LoadSequence, LoadStatus,
    Manifest, MemoryBlobStore, PersistError, PersistResult, SqliteBlobStore,
};
pub use reference::{ModelRef, ModelReferencer, ModelRefs};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
