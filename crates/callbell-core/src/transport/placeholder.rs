// Simulated backend for stations that run before a real nurse-call
// integration is wired in. Always succeeds, after fixed delays.

use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use tracing::debug;
use uuid::Uuid;

use super::CallTransport;
use crate::config::Configuration;
use crate::error::HealthcareError;
use crate::model::{AuthGrant, CallRequest, FacilityInfo};

const SESSION_LIFETIME: Duration = Duration::from_secs(3600);
const DEMO_FACILITY_NAME: &str = "Demo Healthcare Facility";

/// How long each simulated step takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedDelays {
    pub open: Duration,
    pub authenticate: Duration,
    pub deliver: Duration,
    pub refresh: Duration,
}

impl Default for SimulatedDelays {
    fn default() -> Self {
        Self {
            open: Duration::from_millis(1500),
            authenticate: Duration::from_millis(1000),
            deliver: Duration::from_millis(500),
            refresh: Duration::from_millis(800),
        }
    }
}

impl SimulatedDelays {
    /// No delays at all.
    pub fn none() -> Self {
        Self {
            open: Duration::ZERO,
            authenticate: Duration::ZERO,
            deliver: Duration::ZERO,
            refresh: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlaceholderTransport {
    delays: SimulatedDelays,
}

impl PlaceholderTransport {
    pub fn new(delays: SimulatedDelays) -> Self {
        Self { delays }
    }

    fn grant(config: &Configuration) -> AuthGrant {
        let name = if config.facility_id.is_empty() {
            DEMO_FACILITY_NAME.to_owned()
        } else {
            config.facility_id.clone()
        };

        AuthGrant {
            session_token: mock_session_token(),
            expires_at: chrono::Duration::from_std(SESSION_LIFETIME)
                .ok()
                .map(|lifetime| Utc::now() + lifetime),
            permissions: vec![
                "call.emergency".into(),
                "call.nurse".into(),
                "call.general".into(),
            ],
            facility: Some(FacilityInfo {
                name,
                timezone: std::env::var("TZ").unwrap_or_else(|_| "UTC".into()),
                features: vec![
                    "Emergency Calls".into(),
                    "Nurse Station".into(),
                    "Multi-Language Support".into(),
                ],
                max_session_duration: SESSION_LIFETIME,
            }),
        }
    }
}

fn mock_session_token() -> SecretString {
    let id = Uuid::new_v4().simple().to_string();
    let short = id.get(..8).unwrap_or(&id);
    SecretString::from(format!("mock_session_{short}"))
}

impl CallTransport for PlaceholderTransport {
    fn open<'a>(&'a self, config: &'a Configuration) -> BoxFuture<'a, Result<(), HealthcareError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delays.open).await;
            debug!(url = %config.base_url, "placeholder backend reachable");
            Ok(())
        })
    }

    fn authenticate<'a>(
        &'a self,
        config: &'a Configuration,
    ) -> BoxFuture<'a, Result<AuthGrant, HealthcareError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delays.authenticate).await;
            Ok(Self::grant(config))
        })
    }

    fn deliver<'a>(
        &'a self,
        request: &'a CallRequest,
        _session: &'a SecretString,
    ) -> BoxFuture<'a, Result<(), HealthcareError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delays.deliver).await;
            debug!(call_type = %request.call_type, "placeholder backend accepted call");
            Ok(())
        })
    }

    fn refresh<'a>(
        &'a self,
        config: &'a Configuration,
        _session: &'a SecretString,
    ) -> BoxFuture<'a, Result<AuthGrant, HealthcareError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delays.refresh).await;
            Ok(Self::grant(config))
        })
    }
}
