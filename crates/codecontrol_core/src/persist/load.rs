//! Cooperative, cancellable loading of saved graphs.
//!
//! # Responsibility
//! - Materialize manifest entries in bounded batches so hosts can interleave
//!   loading with other work.
//! - Bind deserialized references once every entity exists.
//!
//! # Invariants
//! - A failed or cancelled load leaves the registry as it found it.
//! - The error callback fires at most once per sequence.
//! - Reference fixup runs inside the final step and is never interrupted.

use crate::model::{AnyModel, Model, ModelHandle, Registry, MANIFEST_KEY};
use crate::persist::bundle::Bundle;
use crate::persist::error::{PersistError, PersistResult};
use crate::persist::manifest::{Manifest, ManifestEntry};
use crate::persist::store::{BlobStore, DirectoryBlobStore, MemoryBlobStore};
use log::{debug, error, info};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProgress {
    pub completed: usize,
    pub total: usize,
}

impl LoadProgress {
    /// Completed share in `0.0..=1.0`; an empty load counts as complete.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    InProgress(LoadProgress),
    Completed,
    Failed,
    Cancelled,
}

/// Shared cancellation flag, checked before every step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ReadManifest,
    Materialize,
    Completed,
    Failed,
    Cancelled,
}

type ProgressCallback = Box<dyn FnMut(LoadProgress)>;
type ErrorCallback = Box<dyn FnMut(&PersistError)>;

/// A load in flight. Drive it with [`LoadSequence::step`] or
/// [`LoadSequence::run_to_end`].
pub struct LoadSequence<S: BlobStore> {
    registry: Registry,
    store: S,
    phase: Phase,
    manifest: Manifest,
    cursor: usize,
    batch_size: usize,
    loaded: Vec<AnyModel>,
    cancel: CancelToken,
    deferred_error: Option<PersistError>,
    error: Option<PersistError>,
    on_progress: Option<ProgressCallback>,
    on_error: Option<ErrorCallback>,
    started_at: Instant,
}

impl<S: BlobStore> LoadSequence<S> {
    pub(crate) fn new(registry: Registry, store: S) -> Self {
        let batch_size = registry.config().load_batch_size.max(1);
        Self {
            registry,
            store,
            phase: Phase::ReadManifest,
            manifest: Manifest::new(),
            cursor: 0,
            batch_size,
            loaded: Vec::new(),
            cancel: CancelToken::new(),
            deferred_error: None,
            error: None,
            on_progress: None,
            on_error: None,
            started_at: Instant::now(),
        }
    }

    /// A sequence whose first step reports `err`, so setup failures reach
    /// the same error callback as load failures.
    pub(crate) fn failing(registry: Registry, store: S, err: PersistError) -> Self {
        let mut sequence = Self::new(registry, store);
        sequence.deferred_error = Some(err);
        sequence
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Overrides the registry's `load_batch_size` for this sequence.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Called after every materialized entity, not once per step.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(LoadProgress) + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&PersistError) + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> LoadProgress {
        LoadProgress {
            completed: self.cursor,
            total: self.manifest.len(),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.phase,
            Phase::Completed | Phase::Failed | Phase::Cancelled
        )
    }

    /// Entities materialized so far (all of them once completed).
    pub fn loaded(&self) -> &[AnyModel] {
        &self.loaded
    }

    pub fn error(&self) -> Option<&PersistError> {
        self.error.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Advances the load by at most one batch.
    ///
    /// Reading the manifest happens in the first step; the last step also
    /// binds every loaded reference. Finished sequences keep returning their
    /// terminal status.
    pub fn step(&mut self) -> LoadStatus {
        match self.phase {
            Phase::Completed => return LoadStatus::Completed,
            Phase::Failed => return LoadStatus::Failed,
            Phase::Cancelled => return LoadStatus::Cancelled,
            Phase::ReadManifest | Phase::Materialize => {}
        }
        if let Some(err) = self.deferred_error.take() {
            return self.fail(err);
        }
        if self.cancel.is_cancelled() {
            return self.abort();
        }

        if self.phase == Phase::ReadManifest {
            match self.read_manifest() {
                Ok(manifest) => {
                    info!(
                        "event=model_load module=persist status=start total={} batch_size={}",
                        manifest.len(),
                        self.batch_size
                    );
                    self.manifest = manifest;
                    self.phase = Phase::Materialize;
                }
                Err(err) => return self.fail(err),
            }
        }

        let end = (self.cursor + self.batch_size).min(self.manifest.len());
        while self.cursor < end {
            let entry = self.manifest.entries[self.cursor].clone();
            match self.materialize(&entry) {
                Ok(model) => self.loaded.push(model),
                Err(err) => return self.fail(err),
            }
            self.cursor += 1;
            let progress = self.progress();
            if let Some(callback) = self.on_progress.as_mut() {
                callback(progress);
            }
        }
        let progress = self.progress();
        if self.cursor < self.manifest.len() {
            debug!(
                "event=model_load module=persist status=progress completed={} total={}",
                progress.completed, progress.total
            );
            return LoadStatus::InProgress(progress);
        }

        for model in &self.loaded {
            self.registry.collect_references(&model.id());
        }
        self.phase = Phase::Completed;
        info!(
            "event=model_load module=persist status=ok models={} duration_ms={}",
            self.loaded.len(),
            self.started_at.elapsed().as_millis()
        );
        LoadStatus::Completed
    }

    /// Steps until the sequence finishes.
    pub fn run_to_end(mut self) -> PersistResult<Vec<AnyModel>> {
        loop {
            match self.step() {
                LoadStatus::InProgress(_) => continue,
                LoadStatus::Completed => return Ok(std::mem::take(&mut self.loaded)),
                LoadStatus::Cancelled => return Err(PersistError::Cancelled),
                LoadStatus::Failed => {
                    return Err(self.error.take().unwrap_or_else(|| {
                        PersistError::deserialization(MANIFEST_KEY, "load failed")
                    }))
                }
            }
        }
    }

    /// Like [`LoadSequence::run_to_end`], keeping only entities of type `T`.
    pub fn run_to_end_as<T: Model>(self) -> PersistResult<Vec<ModelHandle<T>>> {
        Ok(self
            .run_to_end()?
            .iter()
            .filter_map(AnyModel::downcast::<T>)
            .collect())
    }

    fn read_manifest(&self) -> PersistResult<Manifest> {
        let raw = read_text(&self.store, MANIFEST_KEY)?;
        Manifest::from_json(&raw)
    }

    fn materialize(&self, entry: &ManifestEntry) -> PersistResult<AnyModel> {
        let payload = read_text(&self.store, entry.id.as_str())?;
        let deserialize = self
            .registry
            .state
            .borrow()
            .types
            .by_name(&entry.type_name)
            .map(|codec| codec.deserialize)
            .ok_or_else(|| PersistError::UnregisteredType(entry.type_name.clone()))?;
        deserialize(&self.registry, entry.id.clone(), &payload)
    }

    fn fail(&mut self, err: PersistError) -> LoadStatus {
        error!(
            "event=model_load module=persist status=error error_code={} error={} completed={} total={}",
            err.code(),
            err,
            self.cursor,
            self.manifest.len()
        );
        self.rollback();
        self.phase = Phase::Failed;
        if let Some(callback) = self.on_error.as_mut() {
            callback(&err);
        }
        self.error = Some(err);
        LoadStatus::Failed
    }

    fn abort(&mut self) -> LoadStatus {
        info!(
            "event=model_load module=persist status=cancelled completed={} total={}",
            self.cursor,
            self.manifest.len()
        );
        self.rollback();
        self.phase = Phase::Cancelled;
        LoadStatus::Cancelled
    }

    fn rollback(&mut self) {
        for model in self.loaded.drain(..).rev() {
            self.registry.discard(&model);
        }
    }
}

fn read_text<S: BlobStore>(store: &S, key: &str) -> PersistResult<String> {
    let bytes = store.read(key).map_err(|source| PersistError::Io {
        key: key.to_string(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|err| PersistError::deserialization(key, err))
}

impl Registry {
    /// Starts loading the graph saved in `store`.
    pub fn load_from<S: BlobStore>(&self, store: S) -> LoadSequence<S> {
        LoadSequence::new(self.clone(), store)
    }

    /// Starts loading the graph saved under `dir` by a [`DirectoryBlobStore`].
    pub fn load_directory(&self, dir: impl AsRef<Path>) -> LoadSequence<DirectoryBlobStore> {
        self.load_from(DirectoryBlobStore::at(dir))
    }

    pub fn load_bundle(&self, bundle: &Bundle) -> LoadSequence<MemoryBlobStore> {
        match bundle.to_memory_store() {
            Ok(store) => self.load_from(store),
            Err(err) => LoadSequence::failing(self.clone(), MemoryBlobStore::new(), err),
        }
    }

    /// Starts loading an encoded bundle; decode errors surface on the first step.
    pub fn load_encoded(&self, raw: &str) -> LoadSequence<MemoryBlobStore> {
        match Bundle::decode(raw) {
            Ok(bundle) => self.load_bundle(&bundle),
            Err(err) => LoadSequence::failing(self.clone(), MemoryBlobStore::new(), err),
        }
    }
}
