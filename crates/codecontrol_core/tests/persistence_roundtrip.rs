use codecontrol_core::{
    Bundle, DirectoryBlobStore, Model, ModelId, ModelRef, ModelReferencer, ModelRefs,
    PersistError, Registry, SqliteBlobStore,
};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};

#[derive(Default, Serialize, Deserialize)]
struct Node {
    label: RefCell<String>,
    next: ModelRef<Node>,
}

impl Model for Node {
    fn visit_references(&self, visit: &mut dyn FnMut(&dyn ModelReferencer)) {
        visit(&self.next);
    }
}

#[derive(Default, Serialize, Deserialize)]
struct Rack {
    slots: ModelRefs<Node>,
    heat: Cell<u32>,
}

impl Model for Rack {
    fn visit_references(&self, visit: &mut dyn FnMut(&dyn ModelReferencer)) {
        visit(&self.slots);
    }
}

struct Scratch;
impl Model for Scratch {}

fn id(raw: &str) -> ModelId {
    ModelId::parse(raw).unwrap()
}

fn node(label: &str) -> Node {
    Node {
        label: RefCell::new(label.to_string()),
        next: ModelRef::new(),
    }
}

fn persistent_registry() -> Registry {
    let registry = Registry::new();
    registry.register_type::<Node>("Node").unwrap();
    registry.register_type::<Rack>("Rack").unwrap();
    registry
}

/// Builds A -> B -> C and returns the registry.
fn chain() -> Registry {
    let registry = persistent_registry();
    let a = registry.create_with_id(id("A"), node("alpha")).unwrap();
    let b = registry.create_with_id(id("B"), node("bravo")).unwrap();
    let c = registry.create_with_id(id("C"), node("charlie")).unwrap();
    a.next.set(Some(&b));
    b.next.set(Some(&c));
    registry
}

fn assert_chain(registry: &Registry) {
    let a = registry.find_as::<Node>(&id("A")).unwrap();
    let b = a.next.get().unwrap();
    let c = b.next.get().unwrap();
    assert_eq!(b.id(), id("B"));
    assert_eq!(c.id(), id("C"));
    assert!(c.next.get().is_none());
    assert_eq!(*a.label.borrow(), "alpha");
    assert_eq!(*c.label.borrow(), "charlie");
    assert_eq!((a.ref_count(), b.ref_count(), c.ref_count()), (0, 1, 1));
}

#[test]
fn three_entity_chain_survives_save_and_load() {
    let source = chain();
    let root = source.find(&id("A")).unwrap();
    let bundle = source.save(&root).unwrap();

    let ids: Vec<_> = bundle.manifest().ids().cloned().collect();
    assert_eq!(ids, vec![id("A"), id("B"), id("C")]);

    let target = persistent_registry();
    let loaded = target.load_bundle(&bundle).run_to_end().unwrap();
    assert_eq!(loaded.len(), 3);
    assert_chain(&target);

    target.find(&id("A")).unwrap().delete();
    assert!(target.is_empty());
}

#[test]
fn encoded_bundle_loads_into_fresh_registry() {
    let source = chain();
    let encoded = source.save_all().unwrap().encode().unwrap();
    assert!(encoded.starts_with("__manifest__\u{1f}"));

    let target = persistent_registry();
    let nodes = target.load_encoded(&encoded).run_to_end_as::<Node>().unwrap();
    assert_eq!(nodes.len(), 3);
    assert_chain(&target);
}

#[test]
fn saving_a_middle_entity_omits_its_owners() {
    let source = chain();
    let b = source.find(&id("B")).unwrap();
    let bundle = source.save(&b).unwrap();

    let ids: Vec<_> = bundle.manifest().ids().cloned().collect();
    assert_eq!(ids, vec![id("B"), id("C")]);
}

#[test]
fn save_models_without_referenced_keeps_dangling_ids() {
    let source = chain();
    let a = source.find(&id("A")).unwrap();
    let bundle = source.save_models(&[a.clone(), a], false).unwrap();
    assert_eq!(bundle.len(), 1);
    assert_eq!(bundle.payload(&id("A")), Some(r#"{"label":"alpha","next":"B"}"#));

    let target = persistent_registry();
    target.load_bundle(&bundle).run_to_end().unwrap();
    let a = target.find_as::<Node>(&id("A")).unwrap();
    assert!(a.next.get().is_none());
    assert_eq!(a.next.id(), None);
}

#[test]
fn empty_model_list_yields_empty_bundle() {
    let registry = persistent_registry();
    let bundle = registry.save_models(&[], true).unwrap();
    assert!(bundle.is_empty());
    assert!(bundle.manifest().is_empty());
}

#[test]
fn unregistered_types_cannot_be_saved() {
    let registry = persistent_registry();
    let scratch = registry.create(Scratch);
    let err = registry.save(&scratch.as_any()).unwrap_err();
    assert!(matches!(err, PersistError::UnregisteredType(ref name) if name == "Scratch"));
}

#[test]
fn collections_and_plain_fields_round_trip() {
    let source = persistent_registry();
    let rack = source.create_with_id(id("rack"), Rack::default()).unwrap();
    rack.heat.set(12);
    let x = source.create_with_id(id("x"), node("x")).unwrap();
    let y = source.create_with_id(id("y"), node("y")).unwrap();
    rack.slots.add(&x);
    rack.slots.add(&y);
    rack.slots.add(&x);

    let bundle = source.save(&rack.as_any()).unwrap();
    let target = persistent_registry();
    target.load_bundle(&bundle).run_to_end().unwrap();

    let rack = target.first::<Rack>().unwrap();
    assert_eq!(rack.heat.get(), 12);
    let slot_ids: Vec<_> = rack.slots.to_vec().iter().map(|node| node.id()).collect();
    assert_eq!(slot_ids, vec![id("x"), id("y"), id("x")]);
    assert_eq!(target.ref_count(&id("x")), Some(2));
    assert_eq!(target.ref_count(&id("y")), Some(1));
}

#[test]
fn directory_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = chain();
    let mut store = DirectoryBlobStore::open(dir.path().join("save")).unwrap();
    let all = source.get_all();
    source.save_to(&mut store, &all, false).unwrap();

    assert!(store.has_manifest());
    assert!(dir.path().join("save").join("B.json").is_file());

    let target = persistent_registry();
    target
        .load_directory(dir.path().join("save"))
        .run_to_end()
        .unwrap();
    assert_chain(&target);
}

#[test]
fn sqlite_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.sqlite3");
    let source = chain();
    {
        let mut store = SqliteBlobStore::open(&path).unwrap();
        source.save_all().unwrap().write_to(&mut store).unwrap();
    }

    let target = persistent_registry();
    let store = SqliteBlobStore::open(&path).unwrap();
    assert_eq!(store.keys().unwrap(), vec!["A", "B", "C", "__manifest__"]);
    target.load_from(store).run_to_end().unwrap();
    assert_chain(&target);
}

#[test]
fn decoded_bundle_matches_the_original() {
    let source = chain();
    let bundle = source.save_all().unwrap();
    let decoded = Bundle::decode(&bundle.encode().unwrap()).unwrap();
    assert_eq!(decoded, bundle);
}
