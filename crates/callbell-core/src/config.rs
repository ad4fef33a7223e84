// ── Runtime connection configuration ──
//
// These types describe *how* to reach the nurse-call backend. They
// carry credential data and retry tuning, but never touch disk. The
// host (or `callbell-config`) builds a `Configuration` and hands it in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

pub const PLACEHOLDER_BASE_URL: &str = "https://placeholder.rauland.demo";
pub const PLACEHOLDER_FACILITY_ID: &str = "Demo-Healthcare-Facility";
const PLACEHOLDER_API_KEY: &str = "demo-api-key";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters for a single session.
///
/// Immutable once handed to the connection manager; reconfiguration
/// replaces the whole value.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub base_url: Url,
    pub api_key: SecretString,
    pub device_id: String,
    pub facility_id: String,
    pub room_number: Option<String>,
    /// Upper bound on every backend call.
    pub timeout: Duration,
}

impl Configuration {
    /// The demo configuration used when nothing has been set up yet.
    pub fn placeholder(device_id: impl Into<String>) -> Self {
        Self {
            base_url: Url::parse(PLACEHOLDER_BASE_URL).expect("placeholder URL is valid"),
            api_key: SecretString::from(PLACEHOLDER_API_KEY.to_owned()),
            device_id: device_id.into(),
            facility_id: PLACEHOLDER_FACILITY_ID.into(),
            room_number: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_room(mut self, room_number: impl Into<String>) -> Self {
        self.room_number = Some(room_number.into());
        self
    }

    pub fn with_facility(mut self, facility_id: impl Into<String>) -> Self {
        self.facility_id = facility_id.into();
        self
    }

    /// Both an API key and a facility are present.
    pub fn is_complete(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.facility_id.is_empty()
    }
}

/// Linear backoff for automatic reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}
