// ── File-backed JSON collection ──
//
// One JSON array per file. Every read-modify-write runs under a single
// writer lock so concurrent appends cannot lose each other's updates.

use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::StoreError;

pub struct JsonStore<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _entries: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _entries: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The whole collection. Absent or unreadable files yield an empty one.
    pub fn load(&self) -> Vec<T> {
        let _guard = self.guard();
        self.read()
    }

    /// Overwrite the backing file with `entries`.
    pub fn save(&self, entries: &[T]) -> Result<(), StoreError> {
        let _guard = self.guard();
        self.write(entries)
    }

    /// Load, mutate, save -- as one step with respect to other callers.
    pub fn update<R>(&self, mutate: impl FnOnce(&mut Vec<T>) -> R) -> Result<R, StoreError> {
        let _guard = self.guard();
        let mut entries = self.read();
        let out = mutate(&mut entries);
        self.write(&entries)?;
        Ok(out)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> Vec<T> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "store unreadable, treating as empty");
                return Vec::new();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "store corrupt, treating as empty");
            Vec::new()
        })
    }

    fn write(&self, entries: &[T]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_vec_pretty(entries)?;

        // Write beside the target, then rename over it.
        let staging = staging_path(&self.path);
        fs::write(&staging, json).map_err(|source| StoreError::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), entries = entries.len(), "store saved");
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
