//! Model identity.

use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Key reserved for the manifest inside bundles and blob stores.
pub const MANIFEST_KEY: &str = "__manifest__";

/// Process-unique identifier of a registered model.
///
/// Freshly created models get a UUID v4 string; imported graphs keep whatever
/// ids were persisted, as long as they pass [`ModelId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Generates a new random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validates and normalizes a caller-provided id.
    ///
    /// # Errors
    /// - Blank input after trim.
    /// - Control characters (the bundle delimiter is one of them).
    /// - Path separators, since ids double as file names.
    /// - The reserved manifest key.
    pub fn parse(raw: &str) -> Result<Self, ModelIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelIdError::Empty);
        }
        if trimmed == MANIFEST_KEY {
            return Err(ModelIdError::Reserved(trimmed.to_string()));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| c.is_control() || *c == '/' || *c == '\\')
        {
            return Err(ModelIdError::InvalidCharacter {
                id: trimmed.escape_debug().to_string(),
                character: bad,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ModelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for ModelId {
    type Error = ModelIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl<'de> Deserialize<'de> for ModelId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Id validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelIdError {
    Empty,
    Reserved(String),
    InvalidCharacter { id: String, character: char },
}

impl Display for ModelIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "model id must not be empty"),
            Self::Reserved(value) => write!(f, "model id is reserved: {value}"),
            Self::InvalidCharacter { id, character } => write!(
                f,
                "model id `{id}` contains invalid character {:?}",
                character
            ),
        }
    }
}

impl Error for ModelIdError {}
