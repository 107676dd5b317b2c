//! Single optional owning edge.

use super::{bind_pending, retain_target, Link, ModelReferencer};
use crate::model::{AnyModel, Model, ModelHandle, ModelId, Registry};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};

/// Optional owning reference to one entity of type `T`.
///
/// Serializes as the target id (or `null`).
pub struct ModelRef<T: Model> {
    link: RefCell<Option<Link<T>>>,
}

impl<T: Model> ModelRef<T> {
    pub fn new() -> Self {
        Self {
            link: RefCell::new(None),
        }
    }

    /// Creates a slot already bound to `target`.
    pub fn to(target: &ModelHandle<T>) -> Self {
        let slot = Self::new();
        slot.set(Some(target));
        slot
    }

    /// Live target, if any.
    pub fn get(&self) -> Option<ModelHandle<T>> {
        self.link
            .borrow()
            .as_ref()
            .and_then(Link::live_target)
            .cloned()
    }

    /// Id of the target, including a not yet resolved one after a load.
    pub fn id(&self) -> Option<ModelId> {
        self.link.borrow().as_ref().and_then(Link::held_id)
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }

    /// Points the slot at `target` (or nothing).
    ///
    /// The new target is counted before the old one is released. Targets that
    /// are no longer registered are rejected and the slot is left untouched.
    pub fn set(&self, target: Option<&ModelHandle<T>>) {
        let next = match target {
            Some(handle) => {
                if !retain_target(handle) {
                    warn!(
                        "event=reference_set module=reference status=skip error_code=invalid_argument id={} reason=target_not_live",
                        handle.id()
                    );
                    return;
                }
                Some(Link::Bound(handle.clone()))
            }
            None => None,
        };
        let previous = self.link.replace(next);
        if let Some(previous) = previous {
            previous.release();
        }
    }

    pub fn clear(&self) {
        self.set(None);
    }

    fn pending(id: Option<ModelId>) -> Self {
        Self {
            link: RefCell::new(id.map(Link::Pending)),
        }
    }
}

impl<T: Model> Default for ModelRef<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Model> Drop for ModelRef<T> {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.release();
        }
    }
}

impl<T: Model> ModelReferencer for ModelRef<T> {
    fn held_ids(&self) -> Vec<ModelId> {
        self.id().into_iter().collect()
    }

    fn targets(&self) -> Vec<AnyModel> {
        self.get().map(|handle| handle.as_any()).into_iter().collect()
    }

    fn release_all(&self) {
        let previous = self.link.take();
        if let Some(previous) = previous {
            previous.release();
        }
    }

    fn resolve_pending(&self, registry: &Registry) {
        let pending = match &*self.link.borrow() {
            Some(Link::Pending(id)) => id.clone(),
            _ => return,
        };
        let bound = bind_pending::<T>(registry, &pending).map(Link::Bound);
        self.link.replace(bound);
    }
}

impl<T: Model> Serialize for ModelRef<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.id().serialize(serializer)
    }
}

impl<'de, T: Model> Deserialize<'de> for ModelRef<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<ModelId>::deserialize(deserializer).map(Self::pending)
    }
}

impl<T: Model> Debug for ModelRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let pending = matches!(&*self.link.borrow(), Some(Link::Pending(_)));
        f.debug_struct("ModelRef")
            .field("id", &self.id())
            .field("pending", &pending)
            .finish()
    }
}
