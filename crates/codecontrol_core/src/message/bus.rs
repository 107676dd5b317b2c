//! Typed publish/subscribe dispatcher.
//!
//! # Responsibility
//! - Route a message to every listener registered for its `MessageKey`.
//! - Keep dispatch synchronous and in registration order.
//!
//! # Invariants
//! - Dispatch iterates a snapshot taken when `send` starts; listeners added
//!   or removed during a dispatch only affect later sends.
//! - Listener panics are not caught and reach the caller of `send`.
//! - No `RefCell` borrow of bus state is held while a listener runs.

use super::{Message, MessageKey};
use crate::error::ModelError;
use crate::listener::{ListenerId, ListenerIdGen, Subscription};
use log::{trace, warn};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

type Callback = Rc<dyn Fn(&dyn Any)>;
type MessageHook = Rc<dyn Fn(&MessageKey, &dyn Any)>;

struct Route {
    id: ListenerId,
    callback: Callback,
}

#[derive(Default)]
struct BusState {
    routes: HashMap<MessageKey, Vec<Route>>,
    listener_ids: ListenerIdGen,
    hook: Option<MessageHook>,
}

impl BusState {
    fn remove(&mut self, key: &MessageKey, listener: ListenerId) -> Option<Route> {
        let routes = self.routes.get_mut(key)?;
        let position = routes.iter().position(|route| route.id == listener)?;
        let removed = routes.remove(position);
        if routes.is_empty() {
            self.routes.remove(key);
        }
        Some(removed)
    }
}

/// Message bus instance. Clones share the same listener table.
#[derive(Clone, Default)]
pub struct MessageBus {
    state: Rc<RefCell<BusState>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for unnamed messages of type `T`.
    pub fn add_listener<T, F>(&self, callback: F) -> ListenerId
    where
        T: Message,
        F: Fn(&T) + 'static,
    {
        self.insert(MessageKey::of::<T>(), typed_callback(callback))
    }

    /// Registers a listener for messages of type `T` sent under `name`.
    ///
    /// Names match exactly, whitespace included. Returns `None` (and logs
    /// `invalid_argument`) for a blank name.
    pub fn add_named_listener<T, F>(&self, name: &str, callback: F) -> Option<ListenerId>
    where
        T: Message,
        F: Fn(&T) + 'static,
    {
        let key = named_key::<T>("message_listen", name)?;
        Some(self.insert(key, typed_callback(callback)))
    }

    /// Unregisters an unnamed listener. `false` when it was not registered.
    pub fn remove_listener<T: Message>(&self, listener: ListenerId) -> bool {
        self.remove(&MessageKey::of::<T>(), listener)
    }

    pub fn remove_named_listener<T: Message>(&self, name: &str, listener: ListenerId) -> bool {
        match named_key::<T>("message_unlisten", name) {
            Some(key) => self.remove(&key, listener),
            None => false,
        }
    }

    /// Scoped variant of [`MessageBus::add_listener`].
    pub fn subscribe<T, F>(&self, callback: F) -> Subscription
    where
        T: Message,
        F: Fn(&T) + 'static,
    {
        let key = MessageKey::of::<T>();
        let listener = self.insert(key.clone(), typed_callback(callback));
        self.guard(key, listener)
    }

    /// Scoped variant of [`MessageBus::add_named_listener`].
    pub fn subscribe_named<T, F>(&self, name: &str, callback: F) -> Option<Subscription>
    where
        T: Message,
        F: Fn(&T) + 'static,
    {
        let key = named_key::<T>("message_listen", name)?;
        let listener = self.insert(key.clone(), typed_callback(callback));
        Some(self.guard(key, listener))
    }

    /// Delivers `message` to every unnamed listener of `T`.
    pub fn send<T: Message>(&self, message: &T) {
        self.dispatch(MessageKey::of::<T>(), message);
    }

    /// Delivers `message` to every listener of `T` registered under `name`.
    pub fn send_named<T: Message>(&self, name: &str, message: &T) {
        if let Some(key) = named_key::<T>("message_send", name) {
            self.dispatch(key, message);
        }
    }

    pub fn listener_count(&self, key: &MessageKey) -> usize {
        self.state.borrow().routes.get(key).map_or(0, Vec::len)
    }

    /// Installs the tooling hook called after every dispatch.
    pub fn set_message_hook<F>(&self, hook: F)
    where
        F: Fn(&MessageKey, &dyn Any) + 'static,
    {
        self.state.borrow_mut().hook = Some(Rc::new(hook));
    }

    pub fn clear_message_hook(&self) {
        let previous = self.state.borrow_mut().hook.take();
        drop(previous);
    }

    /// Drops every registered listener.
    pub fn clear(&self) {
        let routes = std::mem::take(&mut self.state.borrow_mut().routes);
        drop(routes);
    }

    fn insert(&self, key: MessageKey, callback: Callback) -> ListenerId {
        let mut state = self.state.borrow_mut();
        let id = state.listener_ids.next_id();
        trace!(
            "event=message_listen module=message status=ok key={} listener={}",
            key,
            id
        );
        state
            .routes
            .entry(key)
            .or_default()
            .push(Route { id, callback });
        id
    }

    fn remove(&self, key: &MessageKey, listener: ListenerId) -> bool {
        let removed = self.state.borrow_mut().remove(key, listener);
        removed.is_some()
    }

    fn guard(&self, key: MessageKey, listener: ListenerId) -> Subscription {
        let state: Weak<RefCell<BusState>> = Rc::downgrade(&self.state);
        Subscription::new(listener, move || {
            if let Some(state) = state.upgrade() {
                let removed = state.borrow_mut().remove(&key, listener);
                drop(removed);
            }
        })
    }

    fn dispatch(&self, key: MessageKey, payload: &dyn Any) {
        let (callbacks, hook) = {
            let state = self.state.borrow();
            let callbacks: Vec<Callback> = state
                .routes
                .get(&key)
                .map(|routes| routes.iter().map(|route| Rc::clone(&route.callback)).collect())
                .unwrap_or_default();
            (callbacks, state.hook.clone())
        };
        trace!(
            "event=message_send module=message status=ok key={} listeners={}",
            key,
            callbacks.len()
        );
        for callback in &callbacks {
            callback(payload);
        }
        if let Some(hook) = hook {
            hook(&key, payload);
        }
    }
}

impl Debug for MessageBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MessageBus")
            .field("keys", &state.routes.len())
            .field("hooked", &state.hook.is_some())
            .finish()
    }
}

fn typed_callback<T, F>(callback: F) -> Callback
where
    T: Message,
    F: Fn(&T) + 'static,
{
    Rc::new(move |payload: &dyn Any| {
        if let Some(message) = payload.downcast_ref::<T>() {
            callback(message);
        }
    })
}

fn named_key<T: Message>(operation: &'static str, name: &str) -> Option<MessageKey> {
    if name.trim().is_empty() {
        let err = ModelError::invalid_argument(operation, "message name must not be blank");
        warn!(
            "event={} module=message status=skip error_code={} error={}",
            operation,
            err.code(),
            err
        );
        return None;
    }
    Some(MessageKey::named::<T>(name))
}
