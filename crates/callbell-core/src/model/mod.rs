// ── Domain model ──
//
// Canonical types shared by the connection manager, the stores, and
// the station layer.

mod call;
mod connection;

pub use call::{CallRequest, CallType, Priority};
pub use connection::{AuthGrant, ConnectionInfo, ConnectionState, FacilityInfo, NetworkPath};
