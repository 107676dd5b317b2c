//! In-memory save result and its flat string encoding.
//!
//! The encoding joins `__manifest__`, the manifest JSON, then every
//! `id`, `payload` pair with U+001F. Ids cannot contain control characters
//! and JSON escapes them, so the delimiter never occurs inside a segment.

use crate::model::{ModelId, MANIFEST_KEY};
use crate::persist::error::{PersistError, PersistResult};
use crate::persist::manifest::Manifest;
use crate::persist::store::{BlobStore, MemoryBlobStore};
use std::collections::HashSet;

pub const BUNDLE_DELIMITER: char = '\u{1f}';

/// Manifest plus one JSON payload per entity, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    manifest: Manifest,
    payloads: Vec<(ModelId, String)>,
}

impl Bundle {
    pub(crate) fn new(manifest: Manifest, payloads: Vec<(ModelId, String)>) -> Self {
        Self { manifest, payloads }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn payload(&self, id: &ModelId) -> Option<&str> {
        self.payloads
            .iter()
            .find(|(candidate, _)| candidate == id)
            .map(|(_, payload)| payload.as_str())
    }

    pub fn payloads(&self) -> impl Iterator<Item = (&ModelId, &str)> {
        self.payloads
            .iter()
            .map(|(id, payload)| (id, payload.as_str()))
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn encode(&self) -> PersistResult<String> {
        let mut segments = vec![MANIFEST_KEY.to_string(), self.manifest.to_json()?];
        for (id, payload) in &self.payloads {
            segments.push(id.to_string());
            segments.push(payload.clone());
        }
        let delimiter = BUNDLE_DELIMITER.to_string();
        Ok(segments.join(delimiter.as_str()))
    }

    /// Parses an encoded bundle and checks it against its manifest.
    pub fn decode(raw: &str) -> PersistResult<Self> {
        let segments: Vec<&str> = raw.split(BUNDLE_DELIMITER).collect();
        if segments.len() % 2 != 0 {
            return Err(PersistError::deserialization(
                "bundle",
                format!("expected key/value pairs, found {} segments", segments.len()),
            ));
        }

        let mut manifest = None;
        let mut payloads = Vec::new();
        for pair in segments.chunks_exact(2) {
            let (key, value) = (pair[0], pair[1]);
            if key == MANIFEST_KEY {
                if manifest.is_some() {
                    return Err(PersistError::deserialization(key, "manifest listed twice"));
                }
                manifest = Some(Manifest::from_json(value)?);
                continue;
            }
            let id = ModelId::parse(key).map_err(|err| PersistError::deserialization(key, err))?;
            payloads.push((id, value.to_string()));
        }

        let manifest = manifest
            .ok_or_else(|| PersistError::deserialization(MANIFEST_KEY, "missing manifest"))?;
        let bundle = Self::new(manifest, payloads);
        bundle.check_consistency()?;
        Ok(bundle)
    }

    /// Clears `store`, then writes the manifest and every payload.
    pub fn write_to<S: BlobStore + ?Sized>(&self, store: &mut S) -> PersistResult<()> {
        store.clear().map_err(|source| PersistError::Io {
            key: "*".to_string(),
            source,
        })?;
        let manifest = self.manifest.to_json()?;
        write_blob(store, MANIFEST_KEY, &manifest)?;
        for (id, payload) in &self.payloads {
            write_blob(store, id.as_str(), payload)?;
        }
        Ok(())
    }

    pub(crate) fn to_memory_store(&self) -> PersistResult<MemoryBlobStore> {
        let mut store = MemoryBlobStore::new();
        self.write_to(&mut store)?;
        Ok(store)
    }

    fn check_consistency(&self) -> PersistResult<()> {
        let listed: HashSet<&ModelId> = self.manifest.ids().collect();
        let mut present = HashSet::new();
        for (id, _) in &self.payloads {
            if !listed.contains(id) {
                return Err(PersistError::deserialization(
                    id.as_str(),
                    "payload is not listed in the manifest",
                ));
            }
            if !present.insert(id) {
                return Err(PersistError::deserialization(id.as_str(), "payload listed twice"));
            }
        }
        if let Some(missing) = self.manifest.ids().find(|id| !present.contains(id)) {
            return Err(PersistError::deserialization(
                missing.as_str(),
                "manifest entry has no payload",
            ));
        }
        Ok(())
    }
}

fn write_blob<S: BlobStore + ?Sized>(store: &mut S, key: &str, value: &str) -> PersistResult<()> {
    store
        .write(key, value.as_bytes())
        .map_err(|source| PersistError::Io {
            key: key.to_string(),
            source,
        })
}
