// ── Durable request collections ──
//
// The pending queue (requests not yet delivered) and the audit log
// (requests that were delivered), each a JSON array on disk.

mod audit;
mod json_store;
mod pending;

use std::path::PathBuf;

use thiserror::Error;

pub use audit::{AUDIT_LOG_CAPACITY, AUDIT_LOG_FILE, AuditLog};
pub use json_store::JsonStore;
pub use pending::{PENDING_QUEUE_FILE, PendingQueue};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode store contents: {0}")]
    Encode(#[from] serde_json::Error),
}
