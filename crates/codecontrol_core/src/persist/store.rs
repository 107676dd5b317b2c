//! Key/blob backends used by save and load.
//!
//! # Invariants
//! - Keys are model ids or the manifest key; both are free of path separators.
//! - `clear` removes only the manifest and the blobs it lists.

use crate::model::MANIFEST_KEY;
use crate::persist::manifest::Manifest;
use log::warn;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extension of per-key files written by [`DirectoryBlobStore`].
pub const BLOB_EXTENSION: &str = "json";

/// Flat key to bytes storage.
pub trait BlobStore {
    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()>;
    /// Fails with `io::ErrorKind::NotFound` for unknown keys.
    fn read(&self, key: &str) -> io::Result<Vec<u8>>;
    fn clear(&mut self) -> io::Result<()>;
}

impl<S: BlobStore + ?Sized> BlobStore for &mut S {
    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()> {
        (**self).write(key, bytes)
    }

    fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        (**self).read(key)
    }

    fn clear(&mut self) -> io::Result<()> {
        (**self).clear()
    }
}

pub(crate) fn missing_blob(key: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no blob stored under `{key}`"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBlobStore {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        self.blobs
            .get(key)
            .cloned()
            .ok_or_else(|| missing_blob(key))
    }

    fn clear(&mut self) -> io::Result<()> {
        self.blobs.clear();
        Ok(())
    }
}

/// One `<key>.json` file per blob inside a directory.
#[derive(Debug, Clone)]
pub struct DirectoryBlobStore {
    dir: PathBuf,
}

impl DirectoryBlobStore {
    /// Uses `dir` as the store, creating it when missing.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self::at(dir))
    }

    /// Uses `dir` without touching the filesystem; reads fail if it is absent.
    pub fn at(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Whether a saved graph (its manifest) is present.
    pub fn has_manifest(&self) -> bool {
        self.blob_path(MANIFEST_KEY).is_file()
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{BLOB_EXTENSION}"))
    }
}

impl BlobStore for DirectoryBlobStore {
    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()> {
        fs::write(self.blob_path(key), bytes)
    }

    fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        match fs::read(self.blob_path(key)) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(missing_blob(key)),
            other => other,
        }
    }

    /// Removes the saved graph: the manifest and every blob it lists.
    ///
    /// Other files in the directory are left alone. An unreadable manifest
    /// is removed on its own since the blobs it owned cannot be known.
    fn clear(&mut self) -> io::Result<()> {
        let raw = match fs::read_to_string(self.blob_path(MANIFEST_KEY)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        match Manifest::from_json(&raw) {
            Ok(manifest) => {
                for id in manifest.ids() {
                    remove_if_present(&self.blob_path(id.as_str()))?;
                }
            }
            Err(err) => warn!(
                "event=store_clear module=persist status=degraded error_code={} dir={}",
                err.code(),
                self.dir.display()
            ),
        }
        remove_if_present(&self.blob_path(MANIFEST_KEY))
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::{BlobStore, DirectoryBlobStore, MemoryBlobStore};
    use crate::model::{ModelId, MANIFEST_KEY};
    use crate::persist::manifest::Manifest;
    use std::fs;
    use std::io::ErrorKind;

    #[test]
    fn memory_store_overwrites_and_clears() {
        let mut store = MemoryBlobStore::new();
        store.write("a", b"1").expect("write");
        store.write("a", b"2").expect("overwrite");
        assert_eq!(store.read("a").expect("read"), b"2");
        store.clear().expect("clear");
        assert_eq!(
            store.read("a").expect_err("cleared").kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn directory_clear_removes_only_listed_blobs() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = DirectoryBlobStore::open(dir.path().join("save")).expect("open store");
        let mut manifest = Manifest::new();
        manifest.push(ModelId::parse("mech-1").expect("id"), "Mech");
        store
            .write(MANIFEST_KEY, manifest.to_json().expect("manifest json").as_bytes())
            .expect("write manifest");
        store.write("mech-1", b"{}").expect("write blob");
        fs::write(store.path().join("notes.txt"), "keep me").expect("foreign file");
        fs::write(store.path().join("settings.json"), "{}").expect("foreign json");

        assert!(store.has_manifest());
        store.clear().expect("clear");

        assert!(!store.has_manifest());
        assert!(store.path().join("notes.txt").exists());
        assert!(store.path().join("settings.json").exists());
        assert_eq!(
            store.read("mech-1").expect_err("blob removed").kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn directory_clear_with_corrupt_manifest_removes_only_the_manifest() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = DirectoryBlobStore::open(dir.path()).expect("open store");
        store.write(MANIFEST_KEY, b"not json").expect("write manifest");
        store.write("mech-1", b"{}").expect("write blob");

        store.clear().expect("clear");
        assert!(!store.has_manifest());
        assert_eq!(store.read("mech-1").expect("blob kept"), b"{}");
    }

    #[test]
    fn directory_clear_without_manifest_is_a_no_op() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = DirectoryBlobStore::open(dir.path()).expect("open store");
        store.write("mech-1", b"{}").expect("write blob");
        store.clear().expect("clear");
        assert!(store.read("mech-1").is_ok());
    }

    #[test]
    fn missing_directory_reads_as_not_found() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = DirectoryBlobStore::at(dir.path().join("absent"));
        assert_eq!(
            store.read("__manifest__").expect_err("absent").kind(),
            ErrorKind::NotFound
        );
    }
}
