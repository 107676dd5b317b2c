//! Persistence errors.

use crate::model::ModelId;
use crate::persist::manifest::ManifestValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

pub type PersistResult<T> = Result<T, PersistError>;

#[derive(Debug)]
pub enum PersistError {
    /// A blob store read or write failed.
    Io { key: String, source: io::Error },
    /// A payload, manifest or bundle could not be decoded.
    Deserialization { key: String, message: String },
    /// An entity or manifest could not be encoded.
    Serialization { key: String, message: String },
    /// The entity type (or manifest type name) has no registered codec.
    UnregisteredType(String),
    /// A type name is already bound to another type, or vice versa.
    DuplicateTypeName(String),
    /// A type name is not usable inside a manifest.
    InvalidTypeName(String),
    InvalidManifest(ManifestValidationError),
    /// A loaded entity collides with a live one.
    DuplicateId(ModelId),
    Cancelled,
}

impl PersistError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io_error",
            Self::Deserialization { .. } => "deserialization_error",
            Self::Serialization { .. } => "serialization_error",
            Self::UnregisteredType(_) => "unregistered_type",
            Self::DuplicateTypeName(_) => "duplicate_type_name",
            Self::InvalidTypeName(_) => "invalid_type_name",
            Self::InvalidManifest(_) => "invalid_manifest",
            Self::DuplicateId(_) => "duplicate_id",
            Self::Cancelled => "cancelled",
        }
    }

    pub(crate) fn deserialization(key: impl Into<String>, message: impl Display) -> Self {
        Self::Deserialization {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

impl Display for PersistError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { key, source } => write!(f, "blob `{key}`: {source}"),
            Self::Deserialization { key, message } => {
                write!(f, "cannot decode `{key}`: {message}")
            }
            Self::Serialization { key, message } => write!(f, "cannot encode `{key}`: {message}"),
            Self::UnregisteredType(name) => write!(f, "type `{name}` is not registered for persistence"),
            Self::DuplicateTypeName(name) => write!(f, "type name `{name}` is already registered"),
            Self::InvalidTypeName(name) => write!(f, "invalid persisted type name `{name}`"),
            Self::InvalidManifest(err) => write!(f, "invalid manifest: {err}"),
            Self::DuplicateId(id) => write!(f, "model id already registered: {id}"),
            Self::Cancelled => write!(f, "load cancelled"),
        }
    }
}

impl Error for PersistError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::InvalidManifest(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ManifestValidationError> for PersistError {
    fn from(value: ManifestValidationError) -> Self {
        Self::InvalidManifest(value)
    }
}
