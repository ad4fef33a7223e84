// ── Offline call-request queue ──

use std::path::Path;

use tracing::debug;

use super::{JsonStore, StoreError};
use crate::model::CallRequest;

pub const PENDING_QUEUE_FILE: &str = "pending_call_requests.json";

/// Durable FIFO of requests made while no session was available.
///
/// Entries leave the queue only through [`remove_front`](Self::remove_front)
/// after a sweep processed them, or through [`clear`](Self::clear).
pub struct PendingQueue {
    store: JsonStore<CallRequest>,
}

impl PendingQueue {
    /// Queue backed by `pending_call_requests.json` inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::at(data_dir.join(PENDING_QUEUE_FILE))
    }

    pub fn at(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn load(&self) -> Vec<CallRequest> {
        self.store.load()
    }

    pub fn save(&self, requests: &[CallRequest]) -> Result<(), StoreError> {
        self.store.save(requests)
    }

    pub fn append(&self, request: CallRequest) -> Result<(), StoreError> {
        let len = self.store.update(|queue| {
            queue.push(request);
            queue.len()
        })?;
        debug!(pending = len, "call request queued");
        Ok(())
    }

    /// Drop the `count` oldest entries; returns how many were removed.
    pub fn remove_front(&self, count: usize) -> Result<usize, StoreError> {
        self.store.update(|queue| {
            let n = count.min(queue.len());
            queue.drain(..n);
            n
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
