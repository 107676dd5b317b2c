//! Entity model: identity, handles and the registry context.
//!
//! # Responsibility
//! - Define the `Model` contract and the handles used to reach entities.
//! - Own the registry indices and the per-entity lifecycle.
//!
//! # Invariants
//! - Lifecycle is `created -> live -> deleted`; there is no way back.
//! - Every live entity appears exactly once in each registry index.

pub mod entity;
pub mod id;
pub mod registry;

pub use entity::{AnyModel, Model, ModelHandle};
pub use id::{ModelId, ModelIdError, MANIFEST_KEY};
pub use registry::{ModelEvent, Registry};
