use codecontrol_core::{
    ignore_model, AnyModel, ListenerId, Model, ModelEvent, ModelId, ModelRef, ModelReferencer,
    ModelRefs, Registry, RegistryConfig,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Default)]
struct Unit {
    hp: Cell<u32>,
    target: ModelRef<Unit>,
}

impl Model for Unit {
    fn visit_references(&self, visit: &mut dyn FnMut(&dyn ModelReferencer)) {
        visit(&self.target);
    }
}

#[derive(Default)]
struct Squad {
    members: ModelRefs<Unit>,
}

impl Model for Squad {
    fn visit_references(&self, visit: &mut dyn FnMut(&dyn ModelReferencer)) {
        visit(&self.members);
    }
}

fn id(raw: &str) -> ModelId {
    ModelId::parse(raw).unwrap()
}

#[test]
fn generated_ids_are_unique_and_findable() {
    let registry = Registry::new();
    let a = registry.create(Unit::default());
    let b = registry.create(Unit::default());

    assert_ne!(a.id(), b.id());
    assert_eq!(registry.find_as::<Unit>(&a.id()), Some(a.clone()));
    assert_eq!(registry.len(), 2);
}

#[test]
fn get_all_is_a_snapshot_in_registration_order() {
    let registry = Registry::new();
    let unit = registry.create(Unit::default());
    let squad = registry.create(Squad::default());
    let second = registry.create(Unit::default());

    let snapshot = registry.get_all();
    assert_eq!(
        snapshot,
        vec![unit.as_any(), squad.as_any(), second.as_any()]
    );
    assert_eq!(registry.get_all_of::<Unit>(), vec![unit.clone(), second]);

    unit.delete();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(registry.get_all().len(), 2);
}

#[test]
fn find_misses_return_none() {
    let registry = Registry::with_config(RegistryConfig {
        log_lookup_misses: false,
        ..RegistryConfig::default()
    });
    let unit = registry.create(Unit::default());

    assert!(registry.find(&id("nobody")).is_none());
    assert!(registry.find_as::<Squad>(&unit.id()).is_none());
    assert!(registry.find(&unit.id()).unwrap().is::<Unit>());
}

#[test]
fn change_listeners_fire_in_order_until_removed() {
    let registry = Registry::new();
    let unit = registry.create(Unit::default());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let log = Rc::clone(&calls);
    let first = unit
        .add_change_listener(move |model: &AnyModel| {
            let hp = model.downcast::<Unit>().map(|unit| unit.hp.get());
            log.borrow_mut().push(("first", hp));
        })
        .unwrap();
    let log = Rc::clone(&calls);
    unit.add_change_listener(ignore_model(move || log.borrow_mut().push(("second", None))))
        .unwrap();

    unit.hp.set(40);
    unit.notify_change();
    assert_eq!(
        *calls.borrow(),
        vec![("first", Some(40)), ("second", None)]
    );

    assert!(unit.remove_change_listener(first));
    assert!(!unit.remove_change_listener(first));
    calls.borrow_mut().clear();
    unit.notify_change();
    assert_eq!(*calls.borrow(), vec![("second", None)]);
}

#[test]
fn change_listener_edits_during_notify_apply_to_the_next_notify() {
    let registry = Registry::new();
    let unit = registry.create(Unit::default());
    let calls = Rc::new(RefCell::new(Vec::new()));
    let third_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
    let edited = Rc::new(Cell::new(false));

    let log = Rc::clone(&calls);
    let third = Rc::clone(&third_id);
    let once = Rc::clone(&edited);
    unit.add_change_listener(move |model: &AnyModel| {
        log.borrow_mut().push("L1");
        if once.replace(true) {
            return;
        }
        if let Some(listener) = third.get() {
            assert!(model.remove_change_listener(listener));
        }
        let late = Rc::clone(&log);
        assert!(model
            .add_change_listener(move |_: &AnyModel| late.borrow_mut().push("L4"))
            .is_some());
    })
    .unwrap();
    let log = Rc::clone(&calls);
    unit.add_change_listener(move |_: &AnyModel| log.borrow_mut().push("L2"))
        .unwrap();
    let log = Rc::clone(&calls);
    third_id.set(unit.add_change_listener(move |_: &AnyModel| log.borrow_mut().push("L3")));

    unit.notify_change();
    assert_eq!(*calls.borrow(), vec!["L1", "L2", "L3"]);

    calls.borrow_mut().clear();
    unit.notify_change();
    assert_eq!(*calls.borrow(), vec!["L1", "L2", "L4"]);
}

#[test]
fn delete_listener_edits_during_delete_do_not_change_the_dispatch() {
    let registry = Registry::new();
    let unit = registry.create(Unit::default());
    let calls = Rc::new(RefCell::new(Vec::new()));
    let second_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
    let outcome = Rc::new(Cell::new((true, true)));

    let log = Rc::clone(&calls);
    let second = Rc::clone(&second_id);
    let result = Rc::clone(&outcome);
    unit.add_delete_listener(move |model: &AnyModel| {
        log.borrow_mut().push("L1");
        let removed = second
            .get()
            .is_some_and(|listener| model.remove_delete_listener(listener));
        let late = Rc::clone(&log);
        let added = model
            .add_delete_listener(move |_: &AnyModel| late.borrow_mut().push("late"))
            .is_some();
        result.set((removed, added));
    })
    .unwrap();
    let log = Rc::clone(&calls);
    second_id.set(unit.add_delete_listener(move |_: &AnyModel| log.borrow_mut().push("L2")));
    let log = Rc::clone(&calls);
    unit.add_delete_listener(move |_: &AnyModel| log.borrow_mut().push("L3"))
        .unwrap();

    unit.delete();
    assert_eq!(*calls.borrow(), vec!["L1", "L2", "L3"]);
    assert_eq!(outcome.get(), (false, false));

    unit.delete();
    assert_eq!(calls.borrow().len(), 3);
}

#[test]
fn delete_listeners_run_before_unregistering() {
    let registry = Registry::new();
    let unit = registry.create(Unit::default());
    let seen_registered = Rc::new(Cell::new(false));

    let probe = registry.clone();
    let flag = Rc::clone(&seen_registered);
    unit.add_delete_listener(move |model: &AnyModel| flag.set(probe.contains(&model.id())))
        .unwrap();

    unit.delete();
    assert!(seen_registered.get());
    assert!(!unit.is_alive());
    assert!(registry.find(&unit.id()).is_none());
}

#[test]
fn delete_is_idempotent_and_listeners_fire_once() {
    let registry = Registry::new();
    let unit = registry.create(Unit::default());
    let deletions = Rc::new(Cell::new(0));

    let counter = Rc::clone(&deletions);
    let _guard = unit
        .subscribe_delete(move |_: &AnyModel| counter.set(counter.get() + 1))
        .unwrap();

    unit.delete();
    unit.delete();
    registry.delete(&unit.id());
    assert_eq!(deletions.get(), 1);
}

#[test]
fn deleted_entities_reject_new_listeners() {
    let registry = Registry::new();
    let unit = registry.create(Unit::default());
    unit.delete();

    assert!(unit.add_change_listener(|_: &AnyModel| {}).is_none());
    assert!(unit.subscribe_delete(|_: &AnyModel| {}).is_none());
    unit.notify_change();
    assert_eq!(unit.ref_count(), 0);
}

#[test]
fn scoped_change_listener_detach_keeps_it() {
    let registry = Registry::new();
    let unit = registry.create(Unit::default());
    let count = Rc::new(Cell::new(0));

    let counter = Rc::clone(&count);
    let detached = unit
        .subscribe_change(move |_: &AnyModel| counter.set(counter.get() + 1))
        .unwrap()
        .detach();
    let counter = Rc::clone(&count);
    drop(unit.subscribe_change(move |_: &AnyModel| counter.set(counter.get() + 100)));

    unit.notify_change();
    assert_eq!(count.get(), 1);
    assert!(unit.remove_change_listener(detached));
}

#[test]
fn delete_all_of_type_leaves_other_types() {
    let registry = Registry::new();
    registry.create(Unit::default());
    registry.create(Unit::default());
    let squad = registry.create(Squad::default());

    registry.delete_all_of::<Unit>();
    assert!(registry.get_all_of::<Unit>().is_empty());
    assert!(squad.is_alive());

    registry.delete_all();
    assert!(registry.is_empty());
}

#[test]
fn model_hook_sees_cascaded_deletes() {
    let registry = Registry::new();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    registry.set_model_hook(move |event, model: &AnyModel| {
        sink.borrow_mut().push((event, model.id()))
    });

    let a = registry.create_with_id(id("a"), Unit::default()).unwrap();
    let b = registry.create_with_id(id("b"), Unit::default()).unwrap();
    a.target.set(Some(&b));
    a.delete();

    assert_eq!(
        *events.borrow(),
        vec![(ModelEvent::Deleted, id("a")), (ModelEvent::Deleted, id("b"))]
    );

    registry.clear_model_hook();
    registry.create(Unit::default()).delete();
    assert_eq!(events.borrow().len(), 2);
}

#[test]
fn reassigned_ids_resolve_through_find() {
    let registry = Registry::new();
    let unit = registry.create(Unit::default());
    let taken = registry.create_with_id(id("taken"), Unit::default()).unwrap();

    let err = registry
        .reassign_id(&unit.as_any(), taken.id())
        .unwrap_err();
    assert_eq!(err.code(), "duplicate_id");

    registry.reassign_id(&unit.as_any(), id("scout")).unwrap();
    assert_eq!(registry.find_as::<Unit>(&id("scout")), Some(unit));
}
