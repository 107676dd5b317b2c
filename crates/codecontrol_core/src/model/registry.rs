//! Entity registry: identity indices, listeners, refcounts and deletion.
//!
//! # Responsibility
//! - Register entities under a unique id, by concrete type and in creation order.
//! - Track incoming owning-edge counts and delete entities that drop to zero.
//! - Dispatch per-instance change/delete listeners over snapshots.
//!
//! # Invariants
//! - An id maps to at most one live entity.
//! - A deleted entity is never reachable from `find`/`get_all` again.
//! - No `RefCell` borrow of the registry state is held while user callbacks
//!   run or while cascades recurse.
//! - Deletion order: delete listeners, unregister, then release owned edges.

use crate::config::RegistryConfig;
use crate::error::{ModelError, ModelResult};
use crate::listener::{ListenerId, ListenerIdGen};
use crate::model::entity::{
    same_entity, short_type_name, AnyModel, Entity, ErasedEntity, Model, ModelHandle,
};
use crate::model::id::ModelId;
use crate::persist::types::TypeTable;
use log::{debug, trace, warn};
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

pub(crate) type SharedState = Rc<RefCell<RegistryState>>;
pub(crate) type WeakState = Weak<RefCell<RegistryState>>;

type ModelCallback = Rc<dyn Fn(&AnyModel)>;
type ModelHook = Rc<dyn Fn(ModelEvent, &AnyModel)>;

/// Observation emitted to the optional tooling hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEvent {
    Changed,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerKind {
    Change,
    Delete,
}

struct Record {
    entity: Rc<dyn ErasedEntity>,
    type_id: TypeId,
    ref_count: usize,
    collected: bool,
    deleting: bool,
    change_listeners: Vec<(ListenerId, ModelCallback)>,
    delete_listeners: Vec<(ListenerId, ModelCallback)>,
}

impl Record {
    fn listeners_mut(&mut self, kind: ListenerKind) -> &mut Vec<(ListenerId, ModelCallback)> {
        match kind {
            ListenerKind::Change => &mut self.change_listeners,
            ListenerKind::Delete => &mut self.delete_listeners,
        }
    }
}

pub(crate) struct RegistryState {
    records: HashMap<ModelId, Record>,
    by_type: HashMap<TypeId, Vec<ModelId>>,
    order: Vec<ModelId>,
    listener_ids: ListenerIdGen,
    hook: Option<ModelHook>,
    pub(crate) types: TypeTable,
    config: RegistryConfig,
}

impl RegistryState {
    fn register(&mut self, id: ModelId, entity: Rc<dyn ErasedEntity>, type_id: TypeId) {
        self.by_type.entry(type_id).or_default().push(id.clone());
        self.order.push(id.clone());
        self.records.insert(
            id,
            Record {
                entity,
                type_id,
                ref_count: 0,
                collected: false,
                deleting: false,
                change_listeners: Vec::new(),
                delete_listeners: Vec::new(),
            },
        );
    }

    fn unregister(&mut self, id: &ModelId) -> Option<Record> {
        let record = self.records.remove(id)?;
        if let Some(ids) = self.by_type.get_mut(&record.type_id) {
            ids.retain(|candidate| candidate != id);
            if ids.is_empty() {
                self.by_type.remove(&record.type_id);
            }
        }
        self.order.retain(|candidate| candidate != id);
        Some(record)
    }

    fn holds(&self, entity: &Rc<dyn ErasedEntity>) -> bool {
        self.records
            .get(&entity.id())
            .is_some_and(|record| same_entity(&record.entity, entity))
    }

    /// Record for `entity`, only when it is the allocation registered under its id.
    fn record_of(&mut self, entity: &Rc<dyn ErasedEntity>) -> Option<&mut Record> {
        self.records
            .get_mut(&entity.id())
            .filter(|record| same_entity(&record.entity, entity))
    }
}

/// Entity registry context.
///
/// Cheap to clone; clones share the same indices. Not `Send`: a registry and
/// every entity in it belong to one thread.
#[derive(Clone)]
pub struct Registry {
    pub(crate) state: SharedState,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(RegistryState {
                records: HashMap::new(),
                by_type: HashMap::new(),
                order: Vec::new(),
                listener_ids: ListenerIdGen::default(),
                hook: None,
                types: TypeTable::default(),
                config,
            })),
        }
    }

    pub(crate) fn from_weak(weak: &WeakState) -> Option<Self> {
        weak.upgrade().map(|state| Self { state })
    }

    pub(crate) fn downgrade(&self) -> WeakState {
        Rc::downgrade(&self.state)
    }

    pub fn config(&self) -> RegistryConfig {
        self.state.borrow().config.clone()
    }

    /// Registers `value` under a freshly generated id.
    pub fn create<T: Model>(&self, value: T) -> ModelHandle<T> {
        let entity = {
            let mut state = self.state.borrow_mut();
            let mut id = ModelId::generate();
            while state.records.contains_key(&id) {
                id = ModelId::generate();
            }
            let entity = Rc::new(Entity::new(id.clone(), value));
            let erased: Rc<dyn ErasedEntity> = entity.clone();
            state.register(id, erased, TypeId::of::<T>());
            entity
        };
        let handle = ModelHandle::new(entity, self.downgrade());
        debug!(
            "event=model_create module=model status=ok id={} type={}",
            handle.id(),
            short_type_name::<T>()
        );
        handle
    }

    /// Registers `value` under a caller-chosen id.
    ///
    /// # Errors
    /// - `DuplicateId` when a live entity already owns `id`.
    pub fn create_with_id<T: Model>(&self, id: ModelId, value: T) -> ModelResult<ModelHandle<T>> {
        let entity = {
            let mut state = self.state.borrow_mut();
            if state.records.contains_key(&id) {
                drop(state);
                warn!(
                    "event=model_create module=model status=error error_code=duplicate_id id={}",
                    id
                );
                // The rejected value never becomes an owner; give back its edges.
                value.visit_references(&mut |referencer| referencer.release_all());
                return Err(ModelError::DuplicateId(id));
            }
            let entity = Rc::new(Entity::new(id.clone(), value));
            let erased: Rc<dyn ErasedEntity> = entity.clone();
            state.register(id.clone(), erased, TypeId::of::<T>());
            entity
        };
        debug!(
            "event=model_create module=model status=ok id={} type={}",
            id,
            short_type_name::<T>()
        );
        Ok(ModelHandle::new(entity, self.downgrade()))
    }

    /// Moves a live entity to a new id, keeping its index positions.
    ///
    /// # Errors
    /// - `NotFound` when `model` is not registered here.
    /// - `DuplicateId` when `new_id` is taken by another entity.
    pub fn reassign_id(&self, model: &AnyModel, new_id: ModelId) -> ModelResult<()> {
        let old_id = model.id();
        let mut state = self.state.borrow_mut();
        if !state.holds(model.erased()) {
            return Err(ModelError::NotFound(old_id));
        }
        if old_id == new_id {
            return Ok(());
        }
        if state.records.contains_key(&new_id) {
            return Err(ModelError::DuplicateId(new_id));
        }
        let Some(record) = state.records.remove(&old_id) else {
            return Err(ModelError::NotFound(old_id));
        };
        if let Some(ids) = state.by_type.get_mut(&record.type_id) {
            replace_id(ids, &old_id, &new_id);
        }
        replace_id(&mut state.order, &old_id, &new_id);
        record.entity.set_id(new_id.clone());
        state.records.insert(new_id.clone(), record);
        debug!(
            "event=model_reassign module=model status=ok old_id={} new_id={}",
            old_id, new_id
        );
        Ok(())
    }

    /// Looks up a live entity; logs `not_found` on a miss.
    pub fn find(&self, id: &ModelId) -> Option<AnyModel> {
        let found = self.lookup(id);
        if found.is_none() {
            self.log_miss("model_find", &ModelError::NotFound(id.clone()));
        }
        found
    }

    /// Looks up a live entity of concrete type `T`.
    ///
    /// Logs `not_found` or `type_mismatch` and returns `None` on failure.
    pub fn find_as<T: Model>(&self, id: &ModelId) -> Option<ModelHandle<T>> {
        match self.resolve::<T>(id) {
            Ok(handle) => Some(handle),
            Err(err) => {
                self.log_miss("model_find", &err);
                None
            }
        }
    }

    pub fn contains(&self, id: &ModelId) -> bool {
        self.state.borrow().records.contains_key(id)
    }

    /// First registered live entity of exact type `T`.
    pub fn first<T: Model>(&self) -> Option<ModelHandle<T>> {
        let entity = {
            let state = self.state.borrow();
            let id = state.by_type.get(&TypeId::of::<T>())?.first()?;
            Rc::clone(&state.records.get(id)?.entity)
        };
        self.wrap(entity).downcast::<T>()
    }

    /// Snapshot of all live entities in registration order.
    pub fn get_all(&self) -> Vec<AnyModel> {
        let entities: Vec<Rc<dyn ErasedEntity>> = {
            let state = self.state.borrow();
            state
                .order
                .iter()
                .filter_map(|id| state.records.get(id))
                .map(|record| Rc::clone(&record.entity))
                .collect()
        };
        entities.into_iter().map(|entity| self.wrap(entity)).collect()
    }

    /// Snapshot of all live entities of exact type `T` in registration order.
    pub fn get_all_of<T: Model>(&self) -> Vec<ModelHandle<T>> {
        let entities: Vec<Rc<dyn ErasedEntity>> = {
            let state = self.state.borrow();
            match state.by_type.get(&TypeId::of::<T>()) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| state.records.get(id))
                    .map(|record| Rc::clone(&record.entity))
                    .collect(),
                None => Vec::new(),
            }
        };
        entities
            .into_iter()
            .filter_map(|entity| self.wrap(entity).downcast::<T>())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().records.is_empty()
    }

    /// Incoming owning-edge count, `None` for unknown ids.
    pub fn ref_count(&self, id: &ModelId) -> Option<usize> {
        self.state
            .borrow()
            .records
            .get(id)
            .map(|record| record.ref_count)
    }

    pub fn add_change_listener<F>(&self, id: &ModelId, callback: F) -> Option<ListenerId>
    where
        F: Fn(&AnyModel) + 'static,
    {
        self.add_listener(id, ListenerKind::Change, Rc::new(callback))
    }

    pub fn remove_change_listener(&self, id: &ModelId, listener: ListenerId) -> bool {
        self.remove_listener(id, ListenerKind::Change, listener)
    }

    pub fn add_delete_listener<F>(&self, id: &ModelId, callback: F) -> Option<ListenerId>
    where
        F: Fn(&AnyModel) + 'static,
    {
        self.add_listener(id, ListenerKind::Delete, Rc::new(callback))
    }

    pub fn remove_delete_listener(&self, id: &ModelId, listener: ListenerId) -> bool {
        self.remove_listener(id, ListenerKind::Delete, listener)
    }

    /// Installs the tooling hook observing change/delete notifications.
    pub fn set_model_hook<F>(&self, hook: F)
    where
        F: Fn(ModelEvent, &AnyModel) + 'static,
    {
        self.state.borrow_mut().hook = Some(Rc::new(hook));
    }

    pub fn clear_model_hook(&self) {
        let previous = self.state.borrow_mut().hook.take();
        drop(previous);
    }

    /// Invokes the change listeners of `id` in registration order.
    ///
    /// Listeners added or removed during dispatch only affect later calls.
    pub fn notify_change(&self, id: &ModelId) {
        let (model, listeners) = {
            let state = self.state.borrow();
            let Some(record) = state.records.get(id) else {
                warn!(
                    "event=model_notify module=model status=skip error_code=not_found id={}",
                    id
                );
                return;
            };
            let listeners: Vec<ModelCallback> = record
                .change_listeners
                .iter()
                .map(|(_, callback)| Rc::clone(callback))
                .collect();
            (self.wrap(Rc::clone(&record.entity)), listeners)
        };
        trace!(
            "event=model_notify module=model status=ok id={} listeners={}",
            id,
            listeners.len()
        );
        for callback in &listeners {
            callback(&model);
        }
        self.emit(ModelEvent::Changed, &model);
    }

    /// Deletes `id`: delete listeners, unregister, then release owned edges.
    ///
    /// Idempotent; releasing edges may cascade into further deletions.
    pub fn delete(&self, id: &ModelId) {
        let (model, listeners) = {
            let mut state = self.state.borrow_mut();
            let Some(record) = state.records.get_mut(id) else {
                trace!(
                    "event=model_delete module=model status=skip id={} reason=not_registered",
                    id
                );
                return;
            };
            if record.deleting {
                return;
            }
            record.deleting = true;
            let listeners = std::mem::take(&mut record.delete_listeners);
            (self.wrap(Rc::clone(&record.entity)), listeners)
        };

        for (_, callback) in &listeners {
            callback(&model);
        }
        drop(listeners);
        self.emit(ModelEvent::Deleted, &model);

        let removed = self.state.borrow_mut().unregister(&model.id());
        drop(removed);
        debug!(
            "event=model_delete module=model status=ok id={} type={}",
            model.id(),
            model.type_name()
        );

        model
            .model()
            .visit_references(&mut |referencer| referencer.release_all());
    }

    /// Deletes every live entity, tolerating cascades that reorder the index.
    pub fn delete_all(&self) {
        while let Some(id) = self.next_deletable(None) {
            self.delete(&id);
        }
    }

    /// Deletes every live entity of exact type `T`.
    pub fn delete_all_of<T: Model>(&self) {
        while let Some(id) = self.next_deletable(Some(TypeId::of::<T>())) {
            self.delete(&id);
        }
    }

    /// Distinct entities reachable from `id` through owning edges, breadth-first.
    ///
    /// The starting entity is never part of the result.
    pub fn references(&self, id: &ModelId) -> Vec<AnyModel> {
        let Some(root) = self.lookup(id) else {
            self.log_miss("model_references", &ModelError::NotFound(id.clone()));
            return Vec::new();
        };

        let mut seen = HashSet::from([root.id()]);
        let mut reachable = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            let mut targets = Vec::new();
            current
                .model()
                .visit_references(&mut |referencer| targets.extend(referencer.targets()));
            for target in targets {
                if !self.is_registered(target.erased()) || !seen.insert(target.id()) {
                    continue;
                }
                reachable.push(target.clone());
                queue.push_back(target);
            }
        }
        reachable
    }

    /// One-time fixup pass binding pending (deserialized) links of `id`.
    ///
    /// Returns `false` when the entity is unknown or was already collected.
    pub fn collect_references(&self, id: &ModelId) -> bool {
        let entity = {
            let mut state = self.state.borrow_mut();
            let Some(record) = state.records.get_mut(id) else {
                return false;
            };
            if record.collected {
                return false;
            }
            record.collected = true;
            Rc::clone(&record.entity)
        };
        entity
            .model()
            .visit_references(&mut |referencer| referencer.resolve_pending(self));
        trace!("event=model_collect module=model status=ok id={}", id);
        true
    }

    pub(crate) fn is_registered(&self, entity: &Rc<dyn ErasedEntity>) -> bool {
        self.state.borrow().holds(entity)
    }

    /// Adds one incoming edge. Returns `false` for entities that are not live.
    pub(crate) fn retain(&self, entity: &Rc<dyn ErasedEntity>) -> bool {
        let mut state = self.state.borrow_mut();
        match state.record_of(entity) {
            Some(record) if !record.deleting => {
                record.ref_count += 1;
                true
            }
            _ => false,
        }
    }

    /// Drops one incoming edge, deleting the entity when none remain.
    pub(crate) fn release(&self, entity: &Rc<dyn ErasedEntity>) {
        let id = entity.id();
        let reached_zero = {
            let mut state = self.state.borrow_mut();
            match state.record_of(entity) {
                Some(record) if !record.deleting => {
                    if record.ref_count == 0 {
                        warn!(
                            "event=model_release module=model status=skip error_code=unbalanced_release id={}",
                            id
                        );
                        false
                    } else {
                        record.ref_count -= 1;
                        record.ref_count == 0
                    }
                }
                _ => false,
            }
        };
        if reached_zero {
            debug!(
                "event=model_release module=model status=ok id={} ref_count=0 action=delete",
                id
            );
            self.delete(&id);
        }
    }

    /// Quiet typed lookup used by link resolution.
    pub(crate) fn resolve<T: Model>(&self, id: &ModelId) -> ModelResult<ModelHandle<T>> {
        let model = self
            .lookup(id)
            .ok_or_else(|| ModelError::NotFound(id.clone()))?;
        model.downcast::<T>().ok_or_else(|| ModelError::TypeMismatch {
            id: id.clone(),
            expected: short_type_name::<T>(),
            actual: model.type_name(),
        })
    }

    /// Unregisters without listeners or cascade. Used to roll back loads.
    pub(crate) fn discard(&self, model: &AnyModel) {
        let removed = {
            let mut state = self.state.borrow_mut();
            if state.holds(model.erased()) {
                state.unregister(&model.id())
            } else {
                None
            }
        };
        if removed.is_some() {
            debug!(
                "event=model_discard module=model status=ok id={}",
                model.id()
            );
        }
    }

    pub(crate) fn wrap(&self, entity: Rc<dyn ErasedEntity>) -> AnyModel {
        AnyModel::new(entity, self.downgrade())
    }

    fn lookup(&self, id: &ModelId) -> Option<AnyModel> {
        let entity = self
            .state
            .borrow()
            .records
            .get(id)
            .map(|record| Rc::clone(&record.entity))?;
        Some(self.wrap(entity))
    }

    fn add_listener(
        &self,
        id: &ModelId,
        kind: ListenerKind,
        callback: ModelCallback,
    ) -> Option<ListenerId> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match state.records.get_mut(id) {
            Some(record) if !record.deleting => {
                let listener = state.listener_ids.next_id();
                record.listeners_mut(kind).push((listener, callback));
                Some(listener)
            }
            _ => {
                warn!(
                    "event=model_listen module=model status=skip error_code=not_found id={} kind={:?}",
                    id, kind
                );
                None
            }
        }
    }

    fn remove_listener(&self, id: &ModelId, kind: ListenerKind, listener: ListenerId) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            state.records.get_mut(id).and_then(|record| {
                let listeners = record.listeners_mut(kind);
                let position = listeners.iter().position(|(candidate, _)| *candidate == listener)?;
                Some(listeners.remove(position))
            })
        };
        removed.is_some()
    }

    fn next_deletable(&self, type_id: Option<TypeId>) -> Option<ModelId> {
        let state = self.state.borrow();
        let ids = match type_id {
            Some(type_id) => state.by_type.get(&type_id)?,
            None => &state.order,
        };
        ids.iter()
            .find(|id| state.records.get(*id).is_some_and(|record| !record.deleting))
            .cloned()
    }

    fn emit(&self, event: ModelEvent, model: &AnyModel) {
        let hook = self.state.borrow().hook.clone();
        if let Some(hook) = hook {
            hook(event, model);
        }
    }

    fn log_miss(&self, event: &str, err: &ModelError) {
        if self.state.borrow().config.log_lookup_misses {
            warn!(
                "event={} module=model status=skip error_code={} error={}",
                event,
                err.code(),
                err
            );
        }
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

fn replace_id(ids: &mut [ModelId], old_id: &ModelId, new_id: &ModelId) {
    for id in ids.iter_mut().filter(|id| *id == old_id) {
        *id = new_id.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelEvent, Registry};
    use crate::model::entity::Model;
    use crate::model::id::ModelId;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Pilot;
    impl Model for Pilot {}

    struct Drone;
    impl Model for Drone {}

    fn id(raw: &str) -> ModelId {
        ModelId::parse(raw).expect("test id should parse")
    }

    #[test]
    fn create_registers_in_every_index() {
        let registry = Registry::new();
        let pilot = registry.create(Pilot);

        assert_eq!(registry.find(&pilot.id()), Some(pilot.as_any()));
        assert_eq!(registry.get_all(), vec![pilot.as_any()]);
        assert_eq!(registry.get_all_of::<Pilot>(), vec![pilot.clone()]);
        assert!(registry.get_all_of::<Drone>().is_empty());
    }

    #[test]
    fn create_with_id_rejects_duplicates() {
        let registry = Registry::new();
        registry
            .create_with_id(id("p1"), Pilot)
            .expect("first id should register");
        let err = registry
            .create_with_id(id("p1"), Drone)
            .expect_err("duplicate id must fail");
        assert_eq!(err.code(), "duplicate_id");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reassign_id_moves_entity_in_place() {
        let registry = Registry::new();
        let first = registry.create_with_id(id("p1"), Pilot).expect("register");
        let second = registry.create_with_id(id("p2"), Pilot).expect("register");

        registry
            .reassign_id(&first.as_any(), id("p9"))
            .expect("reassign should succeed");

        assert!(registry.find(&id("p1")).is_none());
        assert_eq!(first.id(), id("p9"));
        assert_eq!(registry.get_all_of::<Pilot>(), vec![first, second]);
    }

    #[test]
    fn find_as_reports_type_mismatch_as_none() {
        let registry = Registry::new();
        let pilot = registry.create(Pilot);
        assert!(registry.find_as::<Drone>(&pilot.id()).is_none());
        assert!(registry.find_as::<Pilot>(&pilot.id()).is_some());
    }

    #[test]
    fn first_follows_registration_order() {
        let registry = Registry::new();
        assert!(registry.first::<Pilot>().is_none());
        let a = registry.create(Pilot);
        let _b = registry.create(Pilot);
        assert_eq!(registry.first::<Pilot>(), Some(a));
    }

    #[test]
    fn hook_observes_change_and_delete() {
        let registry = Registry::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        registry.set_model_hook(move |event, _model| sink.borrow_mut().push(event));

        let pilot = registry.create(Pilot);
        pilot.notify_change();
        pilot.delete();

        assert_eq!(
            *events.borrow(),
            vec![ModelEvent::Changed, ModelEvent::Deleted]
        );
    }

    #[test]
    fn stale_handle_does_not_touch_reused_id() {
        let registry = Registry::new();
        let old = registry.create_with_id(id("p1"), Pilot).expect("register");
        old.delete();
        let fresh = registry.create_with_id(id("p1"), Pilot).expect("reuse id");

        assert!(!old.is_alive());
        old.delete();
        assert!(fresh.is_alive());
    }
}
