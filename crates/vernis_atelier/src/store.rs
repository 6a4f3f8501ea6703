//! Build state storage.
//!
//! Everything the engine persists or reads back (compiled templates,
//! fingerprint records, loader fragments, assets and script includes) goes
//! through a [`BuildStore`], keyed by paths relative to the project root.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use vernis_carton::{normalize_path, to_slash, FxHashMap};

use crate::error::StoreError;

/// A key-value blob store keyed by path.
pub trait BuildStore {
    /// Read a blob. A missing blob is `Ok(None)`.
    fn read(&self, path: &Path) -> Result<Option<String>, StoreError>;

    /// Write a blob, creating parents as needed. Returns once the data is
    /// durable.
    fn write(&mut self, path: &Path, contents: &str) -> Result<(), StoreError>;
}

impl<S: BuildStore + ?Sized> BuildStore for &mut S {
    fn read(&self, path: &Path) -> Result<Option<String>, StoreError> {
        (**self).read(path)
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<(), StoreError> {
        (**self).write(path, contents)
    }
}

/// Store backed by the filesystem under `root`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl BuildStore for FsStore {
    fn read(&self, path: &Path) -> Result<Option<String>, StoreError> {
        let full = self.resolve(path);
        match fs::read_to_string(&full) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read { path: full, source }),
        }
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<(), StoreError> {
        let full = self.resolve(path);
        write_durable(&full, contents).map_err(|source| StoreError::Write { path: full, source })
    }
}

fn write_durable(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

/// In-memory store, keyed by normalized `/`-separated paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: FxHashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path) -> String {
        to_slash(&normalize_path(path))
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, contents: impl Into<String>) {
        self.blobs.insert(Self::key(path.as_ref()), contents.into());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.blobs.get(&Self::key(path.as_ref())).map(String::as_str)
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<String> {
        self.blobs.remove(&Self::key(path.as_ref()))
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.blobs.contains_key(&Self::key(path.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.blobs.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

impl BuildStore for MemoryStore {
    fn read(&self, path: &Path) -> Result<Option<String>, StoreError> {
        Ok(self.get(path).map(str::to_string))
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<(), StoreError> {
        self.insert(path, contents);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_normalizes_keys() {
        let mut store = MemoryStore::new();
        store
            .write(Path::new("public/./css/../css/a.css"), "a{}")
            .unwrap();
        assert_eq!(store.get("public/css/a.css"), Some("a{}"));
        assert_eq!(
            store.read(Path::new("public/css/a.css")).unwrap().as_deref(),
            Some("a{}")
        );
        assert_eq!(store.read(Path::new("missing")).unwrap(), None);
    }

    #[test]
    fn test_fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::new(dir.path());

        assert_eq!(store.read(Path::new("nested/out.txt")).unwrap(), None);
        store.write(Path::new("nested/out.txt"), "hello").unwrap();
        assert_eq!(
            store.read(Path::new("nested/out.txt")).unwrap().as_deref(),
            Some("hello")
        );
        assert!(dir.path().join("nested/out.txt").is_file());

        store.write(Path::new("nested/out.txt"), "again").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("nested/out.txt")).unwrap(),
            "again"
        );
    }

    #[test]
    fn test_store_through_mutable_reference() {
        fn write_one<S: BuildStore>(mut store: S) {
            store.write(Path::new("a"), "1").unwrap();
        }

        let mut store = MemoryStore::new();
        write_one(&mut store);
        assert_eq!(store.len(), 1);
    }
}
