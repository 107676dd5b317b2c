//! Model trait and entity handles.
//!
//! # Responsibility
//! - Define the `Model` contract every registered domain type implements.
//! - Provide typed (`ModelHandle<T>`) and type-erased (`AnyModel`) handles.
//!
//! # Invariants
//! - A handle never keeps an entity registered: liveness is decided by the
//!   registry record, handles only keep the allocation reachable.
//! - Two handles are equal iff they point at the same allocation.

use crate::listener::{ListenerId, Subscription};
use crate::model::id::ModelId;
use crate::model::registry::{Registry, WeakState};
use crate::reference::ModelReferencer;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::rc::Rc;

/// Contract for every registered domain entity.
///
/// Mutable attributes use interior mutability (`Cell`, `RefCell`), since
/// entities are shared through handles. Owning edges are declared by
/// implementing [`Model::visit_references`]:
///
/// ```
/// use codecontrol_core::{Model, ModelRef, ModelReferencer};
///
/// struct Cockpit;
/// impl Model for Cockpit {}
///
/// struct Mech {
///     cockpit: ModelRef<Cockpit>,
/// }
///
/// impl Model for Mech {
///     fn visit_references(&self, visit: &mut dyn FnMut(&dyn ModelReferencer)) {
///         visit(&self.cockpit);
///     }
/// }
/// ```
pub trait Model: Any {
    /// Visits every owning reference slot held by this entity.
    ///
    /// Used for cascade delete, reachability and post-load fixup. The
    /// default declares no edges.
    fn visit_references(&self, visit: &mut dyn FnMut(&dyn ModelReferencer)) {
        let _ = visit;
    }
}

pub(crate) struct Entity<T> {
    id: RefCell<ModelId>,
    value: T,
}

impl<T> Entity<T> {
    pub(crate) fn new(id: ModelId, value: T) -> Self {
        Self {
            id: RefCell::new(id),
            value,
        }
    }
}

/// Object-safe view over `Entity<T>` stored by the registry.
pub(crate) trait ErasedEntity {
    fn id(&self) -> ModelId;
    fn set_id(&self, id: ModelId);
    fn type_name(&self) -> &'static str;
    fn value_type_id(&self) -> TypeId;
    fn model(&self) -> &dyn Model;
    fn value_any(&self) -> &dyn Any;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T: Model> ErasedEntity for Entity<T> {
    fn id(&self) -> ModelId {
        self.id.borrow().clone()
    }

    fn set_id(&self, id: ModelId) {
        *self.id.borrow_mut() = id;
    }

    fn type_name(&self) -> &'static str {
        short_type_name::<T>()
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn model(&self) -> &dyn Model {
        &self.value
    }

    fn value_any(&self) -> &dyn Any {
        &self.value
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

pub(crate) fn same_entity(a: &Rc<dyn ErasedEntity>, b: &Rc<dyn ErasedEntity>) -> bool {
    std::ptr::eq(
        Rc::as_ptr(a) as *const u8,
        Rc::as_ptr(b) as *const u8,
    )
}

/// Type name without its module path, e.g. `Mech` for `game::units::Mech`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = match full.find('<') {
        Some(generic_start) => &full[..generic_start],
        None => full,
    };
    base.rsplit("::").next().unwrap_or(base)
}

/// Type-erased handle to a registered entity.
#[derive(Clone)]
pub struct AnyModel {
    entity: Rc<dyn ErasedEntity>,
    registry: WeakState,
}

impl AnyModel {
    pub(crate) fn new(entity: Rc<dyn ErasedEntity>, registry: WeakState) -> Self {
        Self { entity, registry }
    }

    pub(crate) fn erased(&self) -> &Rc<dyn ErasedEntity> {
        &self.entity
    }

    /// Current id of the entity.
    pub fn id(&self) -> ModelId {
        self.entity.id()
    }

    /// Concrete type name (without module path).
    pub fn type_name(&self) -> &'static str {
        self.entity.type_name()
    }

    /// Read access to the entity as its `Model` trait object.
    pub fn model(&self) -> &dyn Model {
        self.entity.model()
    }

    pub fn is<T: Model>(&self) -> bool {
        self.entity.value_any().is::<T>()
    }

    /// Typed view of this entity, `None` when the concrete type differs.
    pub fn downcast<T: Model>(&self) -> Option<ModelHandle<T>> {
        let entity = Rc::clone(&self.entity).into_any().downcast::<Entity<T>>().ok()?;
        Some(ModelHandle {
            entity,
            registry: self.registry.clone(),
        })
    }

    /// Registry this entity was created in, if it still exists.
    pub fn registry(&self) -> Option<Registry> {
        Registry::from_weak(&self.registry)
    }

    /// Whether the entity is still registered.
    pub fn is_alive(&self) -> bool {
        self.registry()
            .is_some_and(|registry| registry.is_registered(&self.entity))
    }

    /// Number of live reference slots targeting this entity (0 once deleted).
    pub fn ref_count(&self) -> usize {
        self.live_registry()
            .and_then(|registry| registry.ref_count(&self.id()))
            .unwrap_or(0)
    }

    pub fn notify_change(&self) {
        match self.live_registry() {
            Some(registry) => registry.notify_change(&self.id()),
            None => log::warn!(
                "event=model_notify module=model status=skip error_code=not_found id={}",
                self.id()
            ),
        }
    }

    /// Deletes the entity. No-op when already deleted.
    pub fn delete(&self) {
        if let Some(registry) = self.live_registry() {
            registry.delete(&self.id());
        }
    }

    /// Transitive closure of entities reachable through owning edges.
    pub fn references(&self) -> Vec<AnyModel> {
        self.live_registry()
            .map(|registry| registry.references(&self.id()))
            .unwrap_or_default()
    }

    pub fn add_change_listener<F>(&self, callback: F) -> Option<ListenerId>
    where
        F: Fn(&AnyModel) + 'static,
    {
        self.live_registry()?
            .add_change_listener(&self.id(), callback)
    }

    pub fn remove_change_listener(&self, listener: ListenerId) -> bool {
        self.live_registry()
            .is_some_and(|registry| registry.remove_change_listener(&self.id(), listener))
    }

    pub fn add_delete_listener<F>(&self, callback: F) -> Option<ListenerId>
    where
        F: Fn(&AnyModel) + 'static,
    {
        self.live_registry()?
            .add_delete_listener(&self.id(), callback)
    }

    pub fn remove_delete_listener(&self, listener: ListenerId) -> bool {
        self.live_registry()
            .is_some_and(|registry| registry.remove_delete_listener(&self.id(), listener))
    }

    /// Scoped change listener; dropping the guard unregisters it.
    pub fn subscribe_change<F>(&self, callback: F) -> Option<Subscription>
    where
        F: Fn(&AnyModel) + 'static,
    {
        let listener = self.add_change_listener(callback)?;
        let owner = self.clone();
        Some(Subscription::new(listener, move || {
            owner.remove_change_listener(listener);
        }))
    }

    /// Scoped delete listener; dropping the guard unregisters it.
    pub fn subscribe_delete<F>(&self, callback: F) -> Option<Subscription>
    where
        F: Fn(&AnyModel) + 'static,
    {
        let listener = self.add_delete_listener(callback)?;
        let owner = self.clone();
        Some(Subscription::new(listener, move || {
            owner.remove_delete_listener(listener);
        }))
    }

    fn live_registry(&self) -> Option<Registry> {
        self.registry()
            .filter(|registry| registry.is_registered(&self.entity))
    }
}

impl PartialEq for AnyModel {
    fn eq(&self, other: &Self) -> bool {
        same_entity(&self.entity, &other.entity)
    }
}

impl Eq for AnyModel {}

impl Debug for AnyModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyModel")
            .field("id", &self.id())
            .field("type", &self.type_name())
            .finish()
    }
}

/// Typed handle to a registered entity; dereferences to `T`.
pub struct ModelHandle<T: Model> {
    entity: Rc<Entity<T>>,
    registry: WeakState,
}

impl<T: Model> ModelHandle<T> {
    pub(crate) fn new(entity: Rc<Entity<T>>, registry: WeakState) -> Self {
        Self { entity, registry }
    }

    pub(crate) fn erased(&self) -> Rc<dyn ErasedEntity> {
        let erased: Rc<dyn ErasedEntity> = self.entity.clone();
        erased
    }

    pub fn id(&self) -> ModelId {
        self.entity.id()
    }

    /// Type-erased copy of this handle.
    pub fn as_any(&self) -> AnyModel {
        AnyModel::new(self.erased(), self.registry.clone())
    }

    pub fn registry(&self) -> Option<Registry> {
        Registry::from_weak(&self.registry)
    }

    pub fn is_alive(&self) -> bool {
        self.as_any().is_alive()
    }

    pub fn ref_count(&self) -> usize {
        self.as_any().ref_count()
    }

    pub fn notify_change(&self) {
        self.as_any().notify_change();
    }

    pub fn delete(&self) {
        self.as_any().delete();
    }

    pub fn references(&self) -> Vec<AnyModel> {
        self.as_any().references()
    }

    pub fn add_change_listener<F>(&self, callback: F) -> Option<ListenerId>
    where
        F: Fn(&AnyModel) + 'static,
    {
        self.as_any().add_change_listener(callback)
    }

    pub fn remove_change_listener(&self, listener: ListenerId) -> bool {
        self.as_any().remove_change_listener(listener)
    }

    pub fn add_delete_listener<F>(&self, callback: F) -> Option<ListenerId>
    where
        F: Fn(&AnyModel) + 'static,
    {
        self.as_any().add_delete_listener(callback)
    }

    pub fn remove_delete_listener(&self, listener: ListenerId) -> bool {
        self.as_any().remove_delete_listener(listener)
    }

    pub fn subscribe_change<F>(&self, callback: F) -> Option<Subscription>
    where
        F: Fn(&AnyModel) + 'static,
    {
        self.as_any().subscribe_change(callback)
    }

    pub fn subscribe_delete<F>(&self, callback: F) -> Option<Subscription>
    where
        F: Fn(&AnyModel) + 'static,
    {
        self.as_any().subscribe_delete(callback)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.entity, &other.entity)
    }
}

impl<T: Model> Clone for ModelHandle<T> {
    fn clone(&self) -> Self {
        Self {
            entity: Rc::clone(&self.entity),
            registry: self.registry.clone(),
        }
    }
}

impl<T: Model> Deref for ModelHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entity.value
    }
}

impl<T: Model> PartialEq for ModelHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: Model> Eq for ModelHandle<T> {}

impl<T: Model> Debug for ModelHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.id())
            .field("type", &short_type_name::<T>())
            .finish()
    }
}
