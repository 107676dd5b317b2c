//! Typed messaging.
//!
//! # Responsibility
//! - Define the `Message` marker and the `(type, name)` routing key.
//! - Provide bus instances plus a per-thread default bus for code that has no
//!   bus handle at hand.
//!
//! # Invariants
//! - A message is only routed to listeners of its exact type and name.
//! - Sending with no listeners is a silent no-op.

mod bus;
mod key;

pub use bus::MessageBus;
pub use key::MessageKey;

use crate::listener::ListenerId;
use std::any::Any;

/// Marker for payloads that travel over a [`MessageBus`].
pub trait Message: Any {}

thread_local! {
    static DEFAULT_BUS: MessageBus = MessageBus::new();
}

/// Default bus of the calling thread.
pub fn default_bus() -> MessageBus {
    DEFAULT_BUS.with(MessageBus::clone)
}

/// Sends on the default bus. See [`MessageBus::send`].
pub fn send<T: Message>(message: &T) {
    default_bus().send(message);
}

/// Sends a named message on the default bus. See [`MessageBus::send_named`].
pub fn send_named<T: Message>(name: &str, message: &T) {
    default_bus().send_named(name, message);
}

pub fn add_listener<T, F>(callback: F) -> ListenerId
where
    T: Message,
    F: Fn(&T) + 'static,
{
    default_bus().add_listener(callback)
}

pub fn add_named_listener<T, F>(name: &str, callback: F) -> Option<ListenerId>
where
    T: Message,
    F: Fn(&T) + 'static,
{
    default_bus().add_named_listener(name, callback)
}

pub fn remove_listener<T: Message>(listener: ListenerId) -> bool {
    default_bus().remove_listener::<T>(listener)
}

pub fn remove_named_listener<T: Message>(name: &str, listener: ListenerId) -> bool {
    default_bus().remove_named_listener::<T>(name, listener)
}
