//! Persisted type table: maps concrete model types to stable names and codecs.
//!
//! # Invariants
//! - A name maps to exactly one type and a type to exactly one name.
//! - Registering the same `(type, name)` pair twice is a no-op.

use crate::error::ModelError;
use crate::model::{AnyModel, Model, ModelId, Registry};
use crate::persist::error::{PersistError, PersistResult};
use crate::persist::manifest::is_valid_type_name;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;

type SerializeFn = fn(&dyn Any) -> Result<String, String>;
type DeserializeFn = fn(&Registry, ModelId, &str) -> PersistResult<AnyModel>;

#[derive(Clone)]
pub(crate) struct TypeEntry {
    pub(crate) name: String,
    pub(crate) serialize: SerializeFn,
    pub(crate) deserialize: DeserializeFn,
}

#[derive(Default)]
pub(crate) struct TypeTable {
    by_type: HashMap<TypeId, TypeEntry>,
    by_name: HashMap<String, TypeId>,
}

impl TypeTable {
    fn insert<T>(&mut self, name: &str) -> PersistResult<()>
    where
        T: Model + Serialize + DeserializeOwned,
    {
        let type_id = TypeId::of::<T>();
        match (self.by_type.get(&type_id), self.by_name.get(name)) {
            (Some(existing), _) if existing.name == name => return Ok(()),
            (Some(existing), _) => return Err(PersistError::DuplicateTypeName(existing.name.clone())),
            (None, Some(_)) => return Err(PersistError::DuplicateTypeName(name.to_string())),
            (None, None) => {}
        }
        self.by_type.insert(
            type_id,
            TypeEntry {
                name: name.to_string(),
                serialize: serialize_value::<T>,
                deserialize: deserialize_value::<T>,
            },
        );
        self.by_name.insert(name.to_string(), type_id);
        Ok(())
    }

    pub(crate) fn by_type(&self, type_id: TypeId) -> Option<&TypeEntry> {
        self.by_type.get(&type_id)
    }

    pub(crate) fn by_name(&self, name: &str) -> Option<&TypeEntry> {
        self.by_name
            .get(name)
            .and_then(|type_id| self.by_type.get(type_id))
    }
}

fn serialize_value<T: Model + Serialize>(value: &dyn Any) -> Result<String, String> {
    let value = value
        .downcast_ref::<T>()
        .ok_or_else(|| "value does not match its registered type".to_string())?;
    serde_json::to_string(value).map_err(|err| err.to_string())
}

fn deserialize_value<T>(registry: &Registry, id: ModelId, payload: &str) -> PersistResult<AnyModel>
where
    T: Model + DeserializeOwned,
{
    let value: T = serde_json::from_str(payload)
        .map_err(|err| PersistError::deserialization(id.as_str(), err))?;
    match registry.create_with_id(id, value) {
        Ok(handle) => Ok(handle.as_any()),
        Err(ModelError::DuplicateId(id)) => Err(PersistError::DuplicateId(id)),
        Err(err) => Err(PersistError::deserialization(err.code(), err)),
    }
}

impl Registry {
    /// Makes `T` persistable under `name`, the type tag written to manifests.
    ///
    /// # Errors
    /// - `InvalidTypeName` when `name` is not an identifier.
    /// - `DuplicateTypeName` when `T` or `name` is already bound differently.
    pub fn register_type<T>(&self, name: &str) -> PersistResult<()>
    where
        T: Model + Serialize + DeserializeOwned,
    {
        let name = name.trim();
        if !is_valid_type_name(name) {
            return Err(PersistError::InvalidTypeName(name.to_string()));
        }
        self.state.borrow_mut().types.insert::<T>(name)?;
        debug!("event=type_register module=persist status=ok type={name}");
        Ok(())
    }

    /// Persisted name of `T`, if registered.
    pub fn type_name_of<T: Model>(&self) -> Option<String> {
        self.state
            .borrow()
            .types
            .by_type(TypeId::of::<T>())
            .map(|entry| entry.name.clone())
    }
}
