//! Counted owning edges between entities.
//!
//! # Responsibility
//! - Hold typed references (`ModelRef`, `ModelRefs`) that keep targets alive.
//! - Keep target refcounts equal to the number of slots pointing at them.
//!
//! # Invariants
//! - Binding a slot increments the target before the previous target is
//!   released, so re-assigning the same target never deletes it.
//! - A target whose count drops to zero is deleted immediately.
//! - Dropping or overwriting a slot releases its bound edges.
//! - Deserialized slots start as pending ids and hold no count until the
//!   registry's `collect_references` pass binds them.
//! - Cycles keep their members alive; nothing detects them.

mod model_ref;
mod model_refs;

pub use model_ref::ModelRef;
pub use model_refs::ModelRefs;

use crate::model::{AnyModel, Model, ModelHandle, ModelId, Registry};
use log::warn;

/// A field that owns edges to other entities.
///
/// Entities expose their referencers through
/// [`Model::visit_references`](crate::model::Model::visit_references).
pub trait ModelReferencer {
    /// Ids held by this slot, bound or still pending.
    fn held_ids(&self) -> Vec<ModelId>;

    /// Live targets currently bound.
    fn targets(&self) -> Vec<AnyModel>;

    /// Drops every held edge; bound edges release their target.
    fn release_all(&self);

    /// Binds pending ids against `registry`, counting each bound edge.
    fn resolve_pending(&self, registry: &Registry);
}

pub(crate) enum Link<T: Model> {
    Pending(ModelId),
    Bound(ModelHandle<T>),
}

impl<T: Model> Link<T> {
    /// Id of a pending link or of a live bound target.
    fn held_id(&self) -> Option<ModelId> {
        match self {
            Self::Pending(id) => Some(id.clone()),
            Self::Bound(handle) if handle.is_alive() => Some(handle.id()),
            Self::Bound(_) => None,
        }
    }

    fn live_target(&self) -> Option<&ModelHandle<T>> {
        match self {
            Self::Bound(handle) if handle.is_alive() => Some(handle),
            _ => None,
        }
    }

    fn release(self) {
        if let Self::Bound(handle) = self {
            if let Some(registry) = handle.registry() {
                registry.release(&handle.erased());
            }
        }
    }
}

/// Counts one new edge to `handle`; `false` when the target is not live.
fn retain_target<T: Model>(handle: &ModelHandle<T>) -> bool {
    handle
        .registry()
        .is_some_and(|registry| registry.retain(&handle.erased()))
}

fn bind_pending<T: Model>(registry: &Registry, id: &ModelId) -> Option<ModelHandle<T>> {
    match registry.resolve::<T>(id) {
        Ok(handle) if registry.retain(&handle.erased()) => Some(handle),
        Ok(handle) => {
            warn!(
                "event=reference_resolve module=reference status=skip error_code=not_found id={} reason=deleting",
                handle.id()
            );
            None
        }
        Err(err) => {
            warn!(
                "event=reference_resolve module=reference status=skip error_code={} error={}",
                err.code(),
                err
            );
            None
        }
    }
}
