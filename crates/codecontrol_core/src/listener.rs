//! Listener tokens shared by the message bus and the model registry.
//!
//! # Responsibility
//! - Identify one registered callback so it can be removed again.
//! - Offer a scoped handle that removes its listener when dropped.
//!
//! # Invariants
//! - A `ListenerId` is never reused by the bus or registry that issued it.
//! - A `Subscription` runs its release action at most once.

use crate::model::AnyModel;
use std::fmt::{Debug, Display, Formatter};

/// Opaque token returned by every `add_*` listener call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub(crate) u64);

impl Display for ListenerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Monotonic listener id source.
#[derive(Debug, Default)]
pub(crate) struct ListenerIdGen {
    next: u64,
}

impl ListenerIdGen {
    pub(crate) fn next_id(&mut self) -> ListenerId {
        self.next += 1;
        ListenerId(self.next)
    }
}

/// Scoped listener registration.
///
/// Dropping the handle unregisters the listener. Call [`Subscription::detach`]
/// to keep the listener alive for the lifetime of its owner instead.
#[must_use = "dropping a Subscription removes its listener immediately"]
pub struct Subscription {
    id: ListenerId,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, release: impl FnOnce() + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    /// Returns the underlying listener token.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Releases the guard without unregistering, returning the raw token.
    pub fn detach(mut self) -> ListenerId {
        self.release = None;
        self.id
    }

    /// Unregisters now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("armed", &self.release.is_some())
            .finish()
    }
}

/// Adapts a zero-argument callback to the canonical model listener shape.
pub fn ignore_model<F>(callback: F) -> impl Fn(&AnyModel) + 'static
where
    F: Fn() + 'static,
{
    move |_model: &AnyModel| callback()
}
