// ── Connection domain types ──

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::HealthcareError;

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Error,
    Suspended,
}

impl ConnectionState {
    /// Only `Connected` can carry call traffic.
    pub fn is_operational(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// States from which a new connect attempt may start.
    pub fn allows_connection(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    /// An attempt is in flight.
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Connecting | Self::Authenticating)
    }

    pub fn message_key(self) -> &'static str {
        match self {
            Self::Disconnected => "rauland_status_disconnected",
            Self::Connecting => "rauland_status_connecting",
            Self::Authenticating => "rauland_status_authenticating",
            Self::Connected => "rauland_status_connected",
            Self::Error => "rauland_status_error",
            Self::Suspended => "rauland_status_suspended",
        }
    }
}

/// Platform reachability report. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPath {
    Satisfied,
    Unsatisfied,
    RequiresConnection,
}

/// Facility metadata captured when a session is established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityInfo {
    pub name: String,
    pub timezone: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(rename = "maxSessionDuration", with = "duration_secs")]
    pub max_session_duration: Duration,
}

/// What a successful authenticate or refresh hands back.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub session_token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
    pub permissions: Vec<String>,
    pub facility: Option<FacilityInfo>,
}

/// Point-in-time view of the connection, for status screens and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub facility_id: String,
    pub device_id: String,
    pub session_active: bool,
    pub facility_name: Option<String>,
    pub last_error: Option<HealthcareError>,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
