//! Ordered collection of owning edges.

use super::{bind_pending, retain_target, Link, ModelReferencer};
use crate::model::{AnyModel, Model, ModelHandle, ModelId, Registry};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};

/// Ordered owning references to entities of type `T`.
///
/// Adding the same target twice holds two edges. Serializes as a list of ids.
pub struct ModelRefs<T: Model> {
    links: RefCell<Vec<Link<T>>>,
}

impl<T: Model> ModelRefs<T> {
    pub fn new() -> Self {
        Self {
            links: RefCell::new(Vec::new()),
        }
    }

    /// Appends one edge. Returns `false` when `target` is not live.
    pub fn add(&self, target: &ModelHandle<T>) -> bool {
        if !retain_target(target) {
            warn!(
                "event=reference_add module=reference status=skip error_code=invalid_argument id={} reason=target_not_live",
                target.id()
            );
            return false;
        }
        self.links.borrow_mut().push(Link::Bound(target.clone()));
        true
    }

    /// Removes the first edge to `target`. Returns `false` when absent.
    pub fn remove(&self, target: &ModelHandle<T>) -> bool {
        let removed = {
            let mut links = self.links.borrow_mut();
            let position = links.iter().position(|link| match link {
                Link::Bound(handle) => handle.ptr_eq(target),
                Link::Pending(_) => false,
            });
            position.map(|index| links.remove(index))
        };
        match removed {
            Some(link) => {
                link.release();
                true
            }
            None => false,
        }
    }

    /// Releases every edge, in order.
    pub fn clear(&self) {
        self.release_all();
    }

    pub fn contains(&self, target: &ModelHandle<T>) -> bool {
        self.links.borrow().iter().any(|link| {
            link.live_target()
                .is_some_and(|handle| handle.ptr_eq(target))
        })
    }

    /// Snapshot of live targets in insertion order.
    pub fn to_vec(&self) -> Vec<ModelHandle<T>> {
        self.links
            .borrow()
            .iter()
            .filter_map(Link::live_target)
            .cloned()
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<ModelHandle<T>> {
        self.to_vec().into_iter().nth(index)
    }

    pub fn len(&self) -> usize {
        self.links
            .borrow()
            .iter()
            .filter(|link| link.live_target().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pending(ids: Vec<ModelId>) -> Self {
        Self {
            links: RefCell::new(ids.into_iter().map(Link::Pending).collect()),
        }
    }
}

impl<T: Model> Default for ModelRefs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Model> Drop for ModelRefs<T> {
    fn drop(&mut self) {
        for link in self.links.get_mut().drain(..) {
            link.release();
        }
    }
}

impl<T: Model> ModelReferencer for ModelRefs<T> {
    fn held_ids(&self) -> Vec<ModelId> {
        self.links.borrow().iter().filter_map(Link::held_id).collect()
    }

    fn targets(&self) -> Vec<AnyModel> {
        self.to_vec().iter().map(ModelHandle::as_any).collect()
    }

    fn release_all(&self) {
        let links = self.links.take();
        for link in links {
            link.release();
        }
    }

    fn resolve_pending(&self, registry: &Registry) {
        let links = self.links.take();
        let resolved = links
            .into_iter()
            .filter_map(|link| match link {
                Link::Pending(id) => bind_pending::<T>(registry, &id).map(Link::Bound),
                bound => Some(bound),
            })
            .collect::<Vec<_>>();
        let mut current = self.links.borrow_mut();
        let added_meanwhile = std::mem::replace(&mut *current, resolved);
        current.extend(added_meanwhile);
    }
}

impl<T: Model> Serialize for ModelRefs<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.held_ids().serialize(serializer)
    }
}

impl<'de, T: Model> Deserialize<'de> for ModelRefs<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<ModelId>::deserialize(deserializer).map(Self::pending)
    }
}

impl<T: Model> Debug for ModelRefs<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.held_ids()).finish()
    }
}
