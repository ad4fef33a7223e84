// ── Healthcare error taxonomy ──
//
// Closed set of failures the connection manager can report. Each
// variant carries a static priority and a static retry flag; the
// manager's backoff scheduler keys off `should_retry()`.

use strum::EnumIter;
use thiserror::Error;

use crate::model::{CallType, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, EnumIter)]
pub enum HealthcareError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Network is unavailable")]
    NetworkUnavailable,

    #[error("Connection to the nurse-call system timed out")]
    ConnectionTimeout,

    #[error("Nurse-call server is unavailable")]
    ServerUnavailable,

    /// The attempt was superseded by a disconnect or a newer attempt.
    #[error("Connection attempt was cancelled")]
    Cancelled,

    // ── Authentication errors ────────────────────────────────────────
    #[error("Authentication with the nurse-call system failed")]
    AuthenticationFailed,

    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    #[error("Invalid API key")]
    ApiKeyInvalid,

    #[error("Facility not found")]
    FacilityNotFound,

    #[error("Device is not authorized for this facility")]
    DeviceNotAuthorized,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration is incomplete or invalid")]
    InvalidConfiguration,

    // ── Call errors ──────────────────────────────────────────────────
    #[error("Call request could not be delivered")]
    CallRequestFailed,

    #[error("Emergency call could not be delivered -- use backup communication")]
    EmergencyCallFailed,

    // ── Rate limiting ────────────────────────────────────────────────
    #[error("Too many requests -- rate limit exceeded")]
    RateLimitExceeded,
}

impl HealthcareError {
    pub fn priority(self) -> Priority {
        match self {
            Self::EmergencyCallFailed => Priority::Critical,
            Self::AuthenticationFailed | Self::SessionExpired | Self::CallRequestFailed => {
                Priority::Urgent
            }
            Self::NetworkUnavailable | Self::ConnectionTimeout | Self::ServerUnavailable => {
                Priority::Normal
            }
            Self::Cancelled
            | Self::ApiKeyInvalid
            | Self::FacilityNotFound
            | Self::DeviceNotAuthorized
            | Self::InvalidConfiguration
            | Self::RateLimitExceeded => Priority::Low,
        }
    }

    /// Whether the backoff scheduler may try again on its own.
    pub fn should_retry(self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable
                | Self::ConnectionTimeout
                | Self::ServerUnavailable
                | Self::RateLimitExceeded
                | Self::AuthenticationFailed
                | Self::SessionExpired
        )
    }

    /// The error reported for a failed delivery of `call_type`.
    pub fn for_failed_call(call_type: CallType) -> Self {
        if call_type == CallType::Emergency {
            Self::EmergencyCallFailed
        } else {
            Self::CallRequestFailed
        }
    }

    /// Localisation key for the host's string table.
    pub fn message_key(self) -> &'static str {
        match self {
            Self::NetworkUnavailable => "rauland_error_network",
            Self::ConnectionTimeout => "rauland_error_timeout",
            Self::ServerUnavailable => "rauland_error_server_unavailable",
            Self::Cancelled => "rauland_error_cancelled",
            Self::AuthenticationFailed => "rauland_error_auth_failed",
            Self::SessionExpired => "rauland_error_session_expired",
            Self::ApiKeyInvalid => "rauland_error_invalid_api_key",
            Self::FacilityNotFound => "rauland_error_facility_not_found",
            Self::DeviceNotAuthorized => "rauland_error_device_unauthorized",
            Self::InvalidConfiguration => "rauland_error_invalid_config",
            Self::CallRequestFailed => "rauland_error_call_failed",
            Self::EmergencyCallFailed => "rauland_error_emergency_failed",
            Self::RateLimitExceeded => "rauland_error_rate_limit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn emergency_failures_outrank_other_call_failures() {
        let emergency = HealthcareError::for_failed_call(CallType::Emergency);
        let general = HealthcareError::for_failed_call(CallType::General);

        assert_eq!(emergency, HealthcareError::EmergencyCallFailed);
        assert_eq!(general, HealthcareError::CallRequestFailed);
        assert!(emergency.priority() > general.priority());
    }

    #[test]
    fn retryable_subset() {
        let retryable: Vec<_> = HealthcareError::iter().filter(|e| e.should_retry()).collect();
        assert_eq!(
            retryable,
            vec![
                HealthcareError::NetworkUnavailable,
                HealthcareError::ConnectionTimeout,
                HealthcareError::ServerUnavailable,
                HealthcareError::AuthenticationFailed,
                HealthcareError::SessionExpired,
                HealthcareError::RateLimitExceeded,
            ]
        );
    }

    #[test]
    fn configuration_and_call_errors_are_terminal() {
        assert!(!HealthcareError::InvalidConfiguration.should_retry());
        assert!(!HealthcareError::EmergencyCallFailed.should_retry());
        assert!(!HealthcareError::Cancelled.should_retry());
    }

    #[test]
    fn every_error_has_a_distinct_message_key() {
        let mut keys: Vec<_> = HealthcareError::iter().map(HealthcareError::message_key).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }
}
