//! Routing key of the message bus.

use std::any::TypeId;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use super::Message;
use crate::model::entity::short_type_name;

/// Compound `(message type, optional name)` routing key.
///
/// Equality and hashing ignore the cached type name.
#[derive(Debug, Clone)]
pub struct MessageKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<String>,
}

impl MessageKey {
    /// Key of unnamed messages of type `T`.
    pub fn of<T: Message>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            name: None,
        }
    }

    /// Key of messages of type `T` sent under `name`.
    pub fn named<T: Message>(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::of::<T>()
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for MessageKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for MessageKey {}

impl Hash for MessageKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl Display for MessageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", self.type_name, name),
            None => f.write_str(self.type_name),
        }
    }
}
