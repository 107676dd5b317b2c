//! Save manifest: the ordered list of persisted entities and their types.
//!
//! # Invariants
//! - Entry ids are unique.
//! - Type names are non-empty identifiers (`[A-Za-z_][A-Za-z0-9_.:]*`).
//! - Entries are listed in save order; loading materializes them in that order.

use crate::model::{ModelId, MANIFEST_KEY};
use crate::persist::error::{PersistError, PersistResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Manifest format written by this build.
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: ModelId,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub entries: Vec<ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, id: ModelId, type_name: impl Into<String>) {
        self.entries.push(ManifestEntry {
            id,
            type_name: type_name.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ModelId> {
        self.entries.iter().map(|entry| &entry.id)
    }

    /// Validates declaration-level invariants.
    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        if self.version == 0 || self.version > MANIFEST_VERSION {
            return Err(ManifestValidationError::UnsupportedVersion(self.version));
        }
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.type_name.trim().is_empty() {
                return Err(ManifestValidationError::EmptyTypeName(entry.id.clone()));
            }
            if !is_valid_type_name(&entry.type_name) {
                return Err(ManifestValidationError::InvalidTypeName(
                    entry.type_name.clone(),
                ));
            }
            if !seen.insert(&entry.id) {
                return Err(ManifestValidationError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> PersistResult<String> {
        serde_json::to_string(self).map_err(|err| PersistError::Serialization {
            key: MANIFEST_KEY.to_string(),
            message: err.to_string(),
        })
    }

    /// Parses and validates a manifest blob.
    pub fn from_json(raw: &str) -> PersistResult<Self> {
        let manifest: Self = serde_json::from_str(raw)
            .map_err(|err| PersistError::deserialization(MANIFEST_KEY, err))?;
        manifest.validate()?;
        Ok(manifest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestValidationError {
    UnsupportedVersion(u32),
    EmptyTypeName(ModelId),
    InvalidTypeName(String),
    DuplicateId(ModelId),
}

impl Display for ManifestValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedVersion(version) => write!(
                f,
                "manifest version {version} is not supported (latest {MANIFEST_VERSION})"
            ),
            Self::EmptyTypeName(id) => write!(f, "entry `{id}` has an empty type name"),
            Self::InvalidTypeName(name) => write!(f, "invalid type name `{name}`"),
            Self::DuplicateId(id) => write!(f, "entry `{id}` is listed twice"),
        }
    }
}

impl Error for ManifestValidationError {}

pub(crate) fn is_valid_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use super::{is_valid_type_name, Manifest, ManifestValidationError};
    use crate::model::ModelId;

    fn id(raw: &str) -> ModelId {
        ModelId::parse(raw).expect("test id should parse")
    }

    #[test]
    fn json_uses_type_key() {
        let mut manifest = Manifest::new();
        manifest.push(id("a"), "Mech");
        assert_eq!(
            manifest.to_json().expect("manifest json"),
            r#"{"version":1,"entries":[{"id":"a","type":"Mech"}]}"#
        );
    }

    #[test]
    fn validate_rejects_duplicate_entries() {
        let mut manifest = Manifest::new();
        manifest.push(id("a"), "Mech");
        manifest.push(id("a"), "Pilot");
        assert_eq!(
            manifest.validate(),
            Err(ManifestValidationError::DuplicateId(id("a")))
        );
    }

    #[test]
    fn validate_rejects_future_versions_and_bad_names() {
        let mut manifest = Manifest::new();
        manifest.version = 7;
        assert_eq!(
            manifest.validate(),
            Err(ManifestValidationError::UnsupportedVersion(7))
        );

        let mut manifest = Manifest::new();
        manifest.push(id("a"), "mech unit");
        assert!(matches!(
            manifest.validate(),
            Err(ManifestValidationError::InvalidTypeName(_))
        ));
    }

    #[test]
    fn from_json_reports_invalid_id() {
        let err = Manifest::from_json(r#"{"version":1,"entries":[{"id":"","type":"Mech"}]}"#)
            .expect_err("empty id must fail");
        assert_eq!(err.code(), "deserialization_error");
    }

    #[test]
    fn type_name_charset() {
        assert!(is_valid_type_name("game.units:Mech_2"));
        assert!(!is_valid_type_name("2Mech"));
        assert!(!is_valid_type_name(""));
    }
}
