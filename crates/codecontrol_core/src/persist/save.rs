//! Saving registry contents into bundles and blob stores.

use crate::error::ModelError;
use crate::model::{AnyModel, Registry};
use crate::persist::bundle::Bundle;
use crate::persist::error::{PersistError, PersistResult};
use crate::persist::manifest::Manifest;
use crate::persist::store::BlobStore;
use crate::persist::types::TypeEntry;
use log::{info, warn};
use std::collections::HashSet;
use std::time::Instant;

impl Registry {
    /// Saves every live entity in registration order.
    pub fn save_all(&self) -> PersistResult<Bundle> {
        let all = self.get_all();
        if all.is_empty() {
            return Ok(Bundle::default());
        }
        self.save_models(&all, false)
    }

    /// Saves `model` together with everything reachable from it.
    pub fn save(&self, model: &AnyModel) -> PersistResult<Bundle> {
        self.save_models(std::slice::from_ref(model), true)
    }

    /// Saves `models` (deduplicated, dead ones skipped) and optionally their
    /// reachable entities, roots first.
    ///
    /// An empty list is a recovered misuse: it is logged and yields an empty
    /// bundle.
    ///
    /// # Errors
    /// - `UnregisteredType` when an entity's type has no persisted name.
    /// - `Serialization` when an entity fails to encode.
    pub fn save_models(&self, models: &[AnyModel], save_referenced: bool) -> PersistResult<Bundle> {
        if models.is_empty() {
            let err = ModelError::invalid_argument("save_models", "empty model list");
            warn!(
                "event=model_save module=persist status=skip error_code={} error={}",
                err.code(),
                err
            );
            return Ok(Bundle::default());
        }
        let started_at = Instant::now();

        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for model in models {
            if !model.is_alive() {
                warn!(
                    "event=model_save module=persist status=skip error_code=not_found id={}",
                    model.id()
                );
                continue;
            }
            if seen.insert(model.id()) {
                ordered.push(model.clone());
            }
        }
        if save_referenced {
            let roots = ordered.clone();
            for root in &roots {
                for reachable in self.references(&root.id()) {
                    if seen.insert(reachable.id()) {
                        ordered.push(reachable);
                    }
                }
            }
        }

        let entries = self.type_entries(&ordered)?;
        let mut manifest = Manifest::new();
        let mut payloads = Vec::with_capacity(entries.len());
        for (model, entry) in entries {
            let id = model.id();
            let payload = (entry.serialize)(model.erased().value_any()).map_err(|message| {
                PersistError::Serialization {
                    key: id.to_string(),
                    message,
                }
            })?;
            manifest.push(id.clone(), entry.name);
            payloads.push((id, payload));
        }

        info!(
            "event=model_save module=persist status=ok roots={} models={} duration_ms={}",
            models.len(),
            payloads.len(),
            started_at.elapsed().as_millis()
        );
        Ok(Bundle::new(manifest, payloads))
    }

    /// Saves `models` straight into `store`, replacing its previous contents.
    pub fn save_to<S: BlobStore + ?Sized>(
        &self,
        store: &mut S,
        models: &[AnyModel],
        save_referenced: bool,
    ) -> PersistResult<()> {
        self.save_models(models, save_referenced)?.write_to(store)
    }

    fn type_entries(&self, models: &[AnyModel]) -> PersistResult<Vec<(AnyModel, TypeEntry)>> {
        let state = self.state.borrow();
        models
            .iter()
            .map(|model| {
                state
                    .types
                    .by_type(model.erased().value_type_id())
                    .cloned()
                    .map(|entry| (model.clone(), entry))
                    .ok_or_else(|| PersistError::UnregisteredType(model.type_name().to_string()))
            })
            .collect()
    }
}
