// ── Requeue sweeper ──
//
// Drains the pending queue after a reconnect. Entries are processed
// FIFO from a snapshot and removed afterwards whatever their outcome,
// so each queued request gets exactly one delivery attempt. Entries
// appended while a sweep runs stay for the next one.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::store::{PendingQueue, StoreError};

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sent: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn processed(&self) -> usize {
        self.sent + self.failed
    }
}

#[derive(Clone)]
pub struct RequeueSweeper {
    manager: ConnectionManager,
    queue: Arc<PendingQueue>,
    /// Serialises sweeps so two reconnect notifications cannot both
    /// send the same snapshot.
    running: Arc<Mutex<()>>,
}

impl RequeueSweeper {
    pub fn new(manager: ConnectionManager, queue: Arc<PendingQueue>) -> Self {
        Self {
            manager,
            queue,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Try every queued request once. No-op while disconnected.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let _running = self.running.lock().await;

        if !self.manager.is_connected() {
            debug!("sweep skipped: not connected");
            return Ok(SweepReport::default());
        }
        let snapshot = self.queue.load();
        if snapshot.is_empty() {
            return Ok(SweepReport::default());
        }

        let mut report = SweepReport::default();
        for request in &snapshot {
            let Some(call_type) = request.kind() else {
                warn!(call_type = %request.call_type, "dropping queued request with unknown call type");
                report.failed += 1;
                continue;
            };
            match self
                .manager
                .send_call_request(call_type, request.message.clone())
                .await
            {
                Ok(_) => report.sent += 1,
                Err(error) => {
                    warn!(%error, call_type = %call_type, "queued call request failed");
                    report.failed += 1;
                }
            }
        }

        self.queue.remove_front(snapshot.len())?;
        info!(
            sent = report.sent,
            failed = report.failed,
            "pending call requests processed"
        );
        Ok(report)
    }
}
