// Deterministic transport whose outcomes are queued up front.
//
// Each operation pops the next scripted outcome; an empty script means
// success. Call counters and the list of delivered requests let tests
// assert exactly what reached the "backend".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use secrecy::SecretString;

use super::CallTransport;
use crate::config::Configuration;
use crate::error::HealthcareError;
use crate::model::{AuthGrant, CallRequest, FacilityInfo};

#[derive(Debug, Default)]
struct Script {
    open: VecDeque<HealthcareError>,
    authenticate: VecDeque<HealthcareError>,
    deliver: VecDeque<Option<HealthcareError>>,
    refresh: VecDeque<HealthcareError>,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    delivered: Mutex<Vec<CallRequest>>,
    latency: Duration,
    delivery_latency: Option<Duration>,
    open_calls: AtomicUsize,
    authenticate_calls: AtomicUsize,
    deliver_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    sessions_issued: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Deliveries sleep this long instead of the common latency.
    pub fn with_delivery_latency(mut self, latency: Duration) -> Self {
        self.delivery_latency = Some(latency);
        self
    }

    /// The next `times` opens fail with `error`.
    pub fn fail_open(&self, error: HealthcareError, times: usize) -> &Self {
        self.script().open.extend(std::iter::repeat_n(error, times));
        self
    }

    pub fn fail_authenticate(&self, error: HealthcareError, times: usize) -> &Self {
        self.script()
            .authenticate
            .extend(std::iter::repeat_n(error, times));
        self
    }

    /// The next delivery fails with `error`.
    pub fn fail_next_delivery(&self, error: HealthcareError) -> &Self {
        self.script().deliver.push_back(Some(error));
        self
    }

    /// The next delivery succeeds (useful between scripted failures).
    pub fn succeed_next_delivery(&self) -> &Self {
        self.script().deliver.push_back(None);
        self
    }

    pub fn fail_refresh(&self, error: HealthcareError) -> &Self {
        self.script().refresh.push_back(error);
        self
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    pub fn deliver_calls(&self) -> usize {
        self.deliver_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Requests the backend accepted, in arrival order.
    pub fn delivered(&self) -> Vec<CallRequest> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        Self::sleep(self.latency).await;
    }

    async fn sleep(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn grant(&self, config: &Configuration) -> AuthGrant {
        let n = self.sessions_issued.fetch_add(1, Ordering::SeqCst) + 1;
        AuthGrant {
            session_token: SecretString::from(format!("scripted_session_{n}")),
            expires_at: None,
            permissions: Vec::new(),
            facility: Some(FacilityInfo {
                name: config.facility_id.clone(),
                timezone: "UTC".into(),
                features: Vec::new(),
                max_session_duration: Duration::from_secs(3600),
            }),
        }
    }
}

impl CallTransport for ScriptedTransport {
    fn open<'a>(&'a self, _config: &'a Configuration) -> BoxFuture<'a, Result<(), HealthcareError>> {
        Box::pin(async move {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            match self.script().open.pop_front() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }

    fn authenticate<'a>(
        &'a self,
        config: &'a Configuration,
    ) -> BoxFuture<'a, Result<AuthGrant, HealthcareError>> {
        Box::pin(async move {
            self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            let scripted = self.script().authenticate.pop_front();
            match scripted {
                Some(error) => Err(error),
                None => Ok(self.grant(config)),
            }
        })
    }

    fn deliver<'a>(
        &'a self,
        request: &'a CallRequest,
        _session: &'a SecretString,
    ) -> BoxFuture<'a, Result<(), HealthcareError>> {
        Box::pin(async move {
            self.deliver_calls.fetch_add(1, Ordering::SeqCst);
            Self::sleep(self.delivery_latency.unwrap_or(self.latency)).await;
            let scripted = self.script().deliver.pop_front().flatten();
            if let Some(error) = scripted {
                return Err(error);
            }
            self.delivered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());
            Ok(())
        })
    }

    fn refresh<'a>(
        &'a self,
        config: &'a Configuration,
        _session: &'a SecretString,
    ) -> BoxFuture<'a, Result<AuthGrant, HealthcareError>> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            let scripted = self.script().refresh.pop_front();
            match scripted {
                Some(error) => Err(error),
                None => Ok(self.grant(config)),
            }
        })
    }
}
