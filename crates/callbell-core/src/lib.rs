//! Connection, offline-queue, and audit core for bedside call-bell stations.
//!
//! A patient request flows through [`CallDispatcher`]: with a session it
//! goes to the nurse-call backend via [`ConnectionManager`], without one
//! it lands in the durable [`PendingQueue`]. After every reconnect the
//! [`RequeueSweeper`] gives each queued request one delivery attempt.
//! Delivered requests are kept in the capped [`AuditLog`].
//!
//! The backend sits behind [`CallTransport`] and secrets behind
//! [`SecretStore`]; both are injected, nothing here is global.

pub mod bell;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod secrets;
pub mod store;
pub mod sweep;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{Configuration, RetryPolicy};
pub use connection::ConnectionManager;
pub use dispatch::{CallDispatcher, Dispatch, DispatchError};
pub use error::HealthcareError;
pub use secrets::{MemorySecretStore, SecretError, SecretStore};
pub use store::{AuditLog, PendingQueue, StoreError};
pub use sweep::{RequeueSweeper, SweepReport};
pub use transport::{CallTransport, PlaceholderTransport, ScriptedTransport, SimulatedDelays};

pub use model::{
    AuthGrant, CallRequest, CallType, ConnectionInfo, ConnectionState, FacilityInfo, NetworkPath,
    Priority,
};
