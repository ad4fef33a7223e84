// ── Delivered call-request history ──

use std::path::{Path, PathBuf};

use super::{JsonStore, StoreError};
use crate::model::CallRequest;

pub const AUDIT_LOG_FILE: &str = "audit_log.json";
pub const AUDIT_LOG_CAPACITY: usize = 100;

/// Append-only history of delivered requests, oldest evicted first once
/// the capacity is exceeded.
pub struct AuditLog {
    store: JsonStore<CallRequest>,
    capacity: usize,
}

impl AuditLog {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::at(data_dir.join(AUDIT_LOG_FILE))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
            capacity: AUDIT_LOG_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn load(&self) -> Vec<CallRequest> {
        self.store.load()
    }

    /// Overwrite the log, keeping only the newest `capacity` entries.
    pub fn save(&self, entries: &[CallRequest]) -> Result<(), StoreError> {
        let skip = entries.len().saturating_sub(self.capacity);
        self.store.save(entries.get(skip..).unwrap_or_default())
    }

    pub fn append(&self, entry: CallRequest) -> Result<(), StoreError> {
        let capacity = self.capacity;
        self.store.update(|log| {
            log.push(entry);
            let overflow = log.len().saturating_sub(capacity);
            log.drain(..overflow);
        })
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.save(&[])
    }

    pub fn len(&self) -> usize {
        self.store.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
