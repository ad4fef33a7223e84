//! Bedside call-bell station.
//!
//! [`Station`] wires the connection manager, dispatcher, requeue
//! sweeper and stores from `callbell-core` together, sweeps the pending
//! queue whenever the session comes back, and publishes toasts, the
//! confirmation banner, and the connection status for a UI shell.

pub mod notice;
pub mod station;
pub mod telemetry;

pub use notice::{BANNER_SECONDS, Banner, Notice, TOAST_LIFETIME};
pub use station::{ConnectionStatus, Station, StationBuilder, StationError};
pub use telemetry::{LogFormat, init_tracing};
