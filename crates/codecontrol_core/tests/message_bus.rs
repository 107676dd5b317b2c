use codecontrol_core::message;
use codecontrol_core::{ListenerId, Message, MessageBus, MessageKey};
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

struct PingMessage;
impl Message for PingMessage {}

struct DamageMessage {
    amount: u32,
}
impl Message for DamageMessage {}

fn recorder() -> Rc<RefCell<Vec<&'static str>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn listeners_run_in_registration_order_and_self_removal_keeps_later_ones() {
    let bus = MessageBus::new();
    let calls = recorder();
    let second_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));

    let log = Rc::clone(&calls);
    bus.add_listener(move |_: &PingMessage| log.borrow_mut().push("L1"));

    let log = Rc::clone(&calls);
    let own_id = Rc::clone(&second_id);
    let remover = bus.clone();
    let id = bus.add_listener(move |_: &PingMessage| {
        log.borrow_mut().push("L2");
        if let Some(id) = own_id.get() {
            remover.remove_listener::<PingMessage>(id);
        }
    });
    second_id.set(Some(id));

    let log = Rc::clone(&calls);
    bus.add_listener(move |_: &PingMessage| log.borrow_mut().push("L3"));

    bus.send(&PingMessage);
    assert_eq!(*calls.borrow(), vec!["L1", "L2", "L3"]);

    calls.borrow_mut().clear();
    bus.send(&PingMessage);
    assert_eq!(*calls.borrow(), vec!["L1", "L3"]);
}

#[test]
fn listener_added_during_dispatch_waits_for_next_send() {
    let bus = MessageBus::new();
    let late_calls = Rc::new(Cell::new(0));

    let adder = bus.clone();
    let counter = Rc::clone(&late_calls);
    bus.add_listener(move |_: &PingMessage| {
        let counter = Rc::clone(&counter);
        adder.add_listener(move |_: &PingMessage| counter.set(counter.get() + 1));
    });

    bus.send(&PingMessage);
    assert_eq!(late_calls.get(), 0);
    bus.send(&PingMessage);
    assert_eq!(late_calls.get(), 1);
}

#[test]
fn named_send_only_reaches_matching_name() {
    let bus = MessageBus::new();
    let calls = Rc::new(RefCell::new(Vec::new()));

    let log = Rc::clone(&calls);
    bus.add_named_listener("hit", move |message: &DamageMessage| {
        log.borrow_mut().push(("hit", message.amount))
    })
    .unwrap();
    let log = Rc::clone(&calls);
    bus.add_named_listener("crit", move |message: &DamageMessage| {
        log.borrow_mut().push(("crit", message.amount))
    })
    .unwrap();

    bus.send_named("hit", &DamageMessage { amount: 7 });
    assert_eq!(*calls.borrow(), vec![("hit", 7)]);

    bus.send(&DamageMessage { amount: 1 });
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn unnamed_and_named_keys_are_distinct() {
    let bus = MessageBus::new();
    let unnamed = bus.add_listener(|_: &DamageMessage| {});
    bus.add_named_listener("hit", |_: &DamageMessage| {}).unwrap();

    assert_eq!(bus.listener_count(&MessageKey::of::<DamageMessage>()), 1);
    assert_eq!(bus.listener_count(&MessageKey::named::<DamageMessage>("hit")), 1);
    assert_eq!(bus.listener_count(&MessageKey::of::<PingMessage>()), 0);

    assert!(!bus.remove_named_listener::<DamageMessage>("hit", unnamed));
    assert!(bus.remove_listener::<DamageMessage>(unnamed));
    assert!(!bus.remove_listener::<DamageMessage>(unnamed));
}

#[test]
fn sending_without_listeners_is_a_no_op() {
    let bus = MessageBus::new();
    bus.send_named("greet", &PingMessage);
    bus.send(&PingMessage);
    bus.send_named("   ", &PingMessage);
}

#[test]
fn listener_panic_reaches_sender_and_bus_stays_usable() {
    let bus = MessageBus::new();
    let after = Rc::new(Cell::new(0));

    let sub = bus.subscribe(|_: &PingMessage| panic!("listener failure"));
    let counter = Rc::clone(&after);
    bus.add_listener(move |_: &PingMessage| counter.set(counter.get() + 1));

    let result = catch_unwind(AssertUnwindSafe(|| bus.send(&PingMessage)));
    assert!(result.is_err());
    assert_eq!(after.get(), 0);

    drop(sub);
    bus.send(&PingMessage);
    assert_eq!(after.get(), 1);
}

#[test]
fn default_bus_free_functions_share_one_bus_per_thread() {
    let total = Rc::new(Cell::new(0));
    let counter = Rc::clone(&total);
    let id = message::add_named_listener("hit", move |message: &DamageMessage| {
        counter.set(counter.get() + message.amount)
    })
    .unwrap();

    message::send_named("hit", &DamageMessage { amount: 3 });
    message::default_bus().send_named("hit", &DamageMessage { amount: 4 });
    assert_eq!(total.get(), 7);

    assert!(message::remove_named_listener::<DamageMessage>("hit", id));
    message::send_named("hit", &DamageMessage { amount: 100 });
    assert_eq!(total.get(), 7);
}
