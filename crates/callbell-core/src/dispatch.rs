// ── Call dispatcher ──
//
// The one entry point for a patient pressing a call button: send now
// when a session exists, otherwise persist the request for the next
// reconnect sweep. Nothing is silently dropped.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::connection::ConnectionManager;
use crate::error::HealthcareError;
use crate::model::{CallRequest, CallType};
use crate::store::{PendingQueue, StoreError};

/// Where a dispatched request ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Sent(CallRequest),
    Queued(CallRequest),
}

impl Dispatch {
    pub fn request(&self) -> &CallRequest {
        match self {
            Self::Sent(request) | Self::Queued(request) => request,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Delivery(#[from] HealthcareError),

    #[error("could not queue call request: {0}")]
    Queue(#[from] StoreError),
}

#[derive(Clone)]
pub struct CallDispatcher {
    manager: ConnectionManager,
    queue: Arc<PendingQueue>,
}

impl CallDispatcher {
    pub fn new(manager: ConnectionManager, queue: Arc<PendingQueue>) -> Self {
        Self { manager, queue }
    }

    /// Send `call_type` now, or queue it while offline.
    ///
    /// A connected delivery failure is reported, not queued: the
    /// patient must learn that the call did not go through.
    pub async fn dispatch(
        &self,
        call_type: CallType,
        message: Option<String>,
    ) -> Result<Dispatch, DispatchError> {
        if self.manager.is_connected() {
            let request = self.manager.send_call_request(call_type, message).await?;
            return Ok(Dispatch::Sent(request));
        }

        let request = CallRequest::new(&self.manager.configuration(), call_type, message);
        self.queue.append(request.clone())?;
        info!(
            call_type = %call_type,
            priority = %call_type.priority(),
            "offline, call request queued"
        );
        Ok(Dispatch::Queued(request))
    }
}
