// ── Connection manager ──
//
// Owns the session with the nurse-call backend: the connect /
// authenticate handshake, session refresh, call delivery and the
// linear-backoff reconnect scheduler. State is published on a watch
// channel so the station and any UI can follow it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Configuration, RetryPolicy};
use crate::error::HealthcareError;
use crate::model::{
    AuthGrant, CallRequest, CallType, ConnectionInfo, ConnectionState, FacilityInfo, NetworkPath,
    Priority,
};
use crate::secrets::{SecretStore, API_KEY_KEY, SESSION_TOKEN_KEY};
use crate::store::{AuditLog, StoreError};
use crate::transport::CallTransport;

// ── ConnectionManager ────────────────────────────────────────────

/// Session lifecycle against the nurse-call backend.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. Every collaborator is
/// injected at construction; nothing is global.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    transport: Arc<dyn CallTransport>,
    secrets: Arc<dyn SecretStore>,
    audit: Arc<AuditLog>,
    retry_policy: RetryPolicy,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Session>,
}

/// Mutable manager state. Never held across an await.
struct Session {
    config: Configuration,
    /// Bumped by every new attempt and every disconnect. Completions
    /// carrying an older value are discarded.
    generation: u64,
    retry_count: u32,
    retry_timer: Option<CancellationToken>,
    attempt: Option<CancellationToken>,
    expires_at: Option<DateTime<Utc>>,
    facility: Option<FacilityInfo>,
    last_error: Option<HealthcareError>,
    /// Session token held here only when the secret store refused it.
    unstored_token: Option<SecretString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    User,
    Retry,
}

/// What `start_attempt` decided while holding the session lock.
enum Start {
    Done(Result<(), HealthcareError>),
    AwaitInFlight,
    Run {
        config: Configuration,
        generation: u64,
        cancel: CancellationToken,
    },
}

impl ConnectionManager {
    pub fn new(
        config: Configuration,
        transport: Arc<dyn CallTransport>,
        secrets: Arc<dyn SecretStore>,
        audit: Arc<AuditLog>,
        retry_policy: RetryPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(ManagerInner {
                transport,
                secrets,
                audit,
                retry_policy,
                state,
                session: Mutex::new(Session {
                    config,
                    generation: 0,
                    retry_count: 0,
                    retry_timer: None,
                    attempt: None,
                    expires_at: None,
                    facility: None,
                    last_error: None,
                    unstored_token: None,
                }),
            }),
        }
    }

    /// Replace the configuration wholesale. Takes effect on the next
    /// connect; an established session is left alone.
    pub fn configure(&self, config: Configuration) {
        if let Err(e) = self.inner.secrets.set(API_KEY_KEY, config.api_key.clone()) {
            warn!(error = %e, "could not store API key");
        }

        let mut session = self.session();
        if config.facility_id.is_empty() {
            session.last_error = Some(HealthcareError::InvalidConfiguration);
        }
        info!(
            facility = %config.facility_id,
            device = %config.device_id,
            "nurse-call configuration updated"
        );
        session.config = config;
    }

    pub fn configuration(&self) -> Configuration {
        self.session().config.clone()
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect and authenticate.
    ///
    /// Returns immediately when already connected. If an attempt is
    /// already in flight, waits for it and reports its outcome. A
    /// user-initiated connect restores the full retry budget.
    pub async fn connect(&self) -> Result<(), HealthcareError> {
        self.start_attempt(Trigger::User).await
    }

    /// Tear down the session. Always safe, idempotent.
    ///
    /// Cancels the in-flight attempt and any scheduled retry; their
    /// completions are discarded.
    pub fn disconnect(&self) {
        let mut session = self.session();
        session.generation += 1;
        session.retry_count = 0;
        if let Some(attempt) = session.attempt.take() {
            attempt.cancel();
        }
        if let Some(timer) = session.retry_timer.take() {
            timer.cancel();
        }
        session.expires_at = None;
        session.facility = None;
        session.unstored_token = None;

        if let Err(e) = self.inner.secrets.remove(SESSION_TOKEN_KEY) {
            warn!(error = %e, "could not remove session token");
        }
        self.set_state(ConnectionState::Disconnected);
        debug!(generation = session.generation, "disconnected");
    }

    /// Exchange the current session for a fresh one without changing
    /// state.
    pub async fn refresh_session(&self) -> Result<(), HealthcareError> {
        let (config, token, generation) = {
            let mut session = self.session();
            let token = self
                .current_state()
                .is_operational()
                .then(|| self.session_token(&session))
                .flatten();
            let Some(token) = token else {
                session.last_error = Some(HealthcareError::AuthenticationFailed);
                return Err(HealthcareError::AuthenticationFailed);
            };
            (session.config.clone(), token, session.generation)
        };

        let result = within(config.timeout, self.inner.transport.refresh(&config, &token)).await;

        let mut session = self.session();
        if session.generation != generation {
            debug!(generation, "discarding stale session refresh");
            return Err(HealthcareError::Cancelled);
        }
        match result {
            Ok(grant) => {
                self.keep_session_token(&mut session, grant.session_token);
                session.expires_at = grant.expires_at;
                if let Some(facility) = grant.facility {
                    session.facility = Some(facility);
                }
                info!(priority = %Priority::Low, "session refreshed");
                Ok(())
            }
            Err(error) => Err(self.record_failure(&mut session, error)),
        }
    }

    // ── Call delivery ────────────────────────────────────────────

    /// Deliver one call request over the current session.
    ///
    /// On success the request is appended to the audit log and
    /// returned. Emergency failures surface as
    /// [`EmergencyCallFailed`](HealthcareError::EmergencyCallFailed).
    pub async fn send_call_request(
        &self,
        call_type: CallType,
        message: Option<String>,
    ) -> Result<CallRequest, HealthcareError> {
        let (request, token, timeout) = {
            let session = self.session();
            let token = self
                .current_state()
                .is_operational()
                .then(|| self.session_token(&session))
                .flatten();
            let Some(token) = token else {
                return Err(HealthcareError::for_failed_call(call_type));
            };
            let request = CallRequest::new(&session.config, call_type, message);
            (request, token, session.config.timeout)
        };

        if let Err(cause) = within(timeout, self.inner.transport.deliver(&request, &token)).await {
            let error = HealthcareError::for_failed_call(call_type);
            warn!(
                %cause,
                call_type = %call_type,
                priority = %error.priority(),
                "call request delivery failed"
            );
            self.session().last_error = Some(error);
            return Err(error);
        }

        if let Err(e) = self.inner.audit.append(request.clone()) {
            warn!(error = %e, "could not append call request to audit log");
        }
        info!(
            call_type = %call_type,
            priority = %call_type.priority(),
            "call request sent"
        );
        Ok(request)
    }

    /// Delivered requests, oldest first.
    pub fn call_history(&self) -> Vec<CallRequest> {
        self.inner.audit.load()
    }

    pub fn clear_call_history(&self) -> Result<(), StoreError> {
        self.inner.audit.clear()?;
        info!(priority = %Priority::Low, "call history cleared");
        Ok(())
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.current_state().is_operational()
    }

    pub fn last_error(&self) -> Option<HealthcareError> {
        self.session().last_error
    }

    pub fn facility_info(&self) -> Option<FacilityInfo> {
        self.session().facility.clone()
    }

    pub fn retry_count(&self) -> u32 {
        self.session().retry_count
    }

    pub fn session_expires_at(&self) -> Option<DateTime<Utc>> {
        self.session().expires_at
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        let session = self.session();
        ConnectionInfo {
            state: self.current_state(),
            facility_id: session.config.facility_id.clone(),
            device_id: session.config.device_id.clone(),
            session_active: self.session_token(&session).is_some(),
            facility_name: session.facility.as_ref().map(|f| f.name.clone()),
            last_error: session.last_error,
        }
    }

    /// Platform reachability report. Logged only; reconnects stay with
    /// the retry scheduler and the user.
    pub fn network_path_changed(&self, path: NetworkPath) {
        match path {
            NetworkPath::Satisfied => debug!("network path available"),
            NetworkPath::Unsatisfied | NetworkPath::RequiresConnection => {
                warn!(?path, state = %self.current_state(), "network path unavailable");
            }
        }
    }

    // ── Attempt machinery ────────────────────────────────────────

    async fn start_attempt(&self, trigger: Trigger) -> Result<(), HealthcareError> {
        let start = {
            let mut session = self.session();
            if session.config.facility_id.is_empty() {
                session.last_error = Some(HealthcareError::InvalidConfiguration);
                warn!("connect refused: no facility configured");
                Start::Done(Err(HealthcareError::InvalidConfiguration))
            } else {
                match self.current_state() {
                    ConnectionState::Connected => Start::Done(Ok(())),
                    ConnectionState::Connecting | ConnectionState::Authenticating => {
                        Start::AwaitInFlight
                    }
                    ConnectionState::Suspended => Start::Done(Err(HealthcareError::Cancelled)),
                    ConnectionState::Disconnected | ConnectionState::Error => {
                        if let Some(timer) = session.retry_timer.take() {
                            timer.cancel();
                        }
                        if trigger == Trigger::User {
                            session.retry_count = 0;
                        }
                        session.generation += 1;
                        let cancel = CancellationToken::new();
                        session.attempt = Some(cancel.clone());
                        self.set_state(ConnectionState::Connecting);
                        debug!(
                            generation = session.generation,
                            ?trigger,
                            facility = %session.config.facility_id,
                            "connect attempt started"
                        );
                        Start::Run {
                            config: session.config.clone(),
                            generation: session.generation,
                            cancel,
                        }
                    }
                }
            }
        };

        match start {
            Start::Done(result) => result,
            Start::AwaitInFlight => self.await_in_flight().await,
            Start::Run {
                config,
                generation,
                cancel,
            } => {
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(HealthcareError::Cancelled),
                    result = self.handshake(&config, generation) => result,
                };
                match result {
                    Ok(grant) => self.complete(generation, grant),
                    Err(HealthcareError::Cancelled) => Err(HealthcareError::Cancelled),
                    Err(error) => self.fail(generation, error),
                }
            }
        }
    }

    async fn handshake(
        &self,
        config: &Configuration,
        generation: u64,
    ) -> Result<AuthGrant, HealthcareError> {
        let transport = &self.inner.transport;
        within(config.timeout, transport.open(config)).await?;

        if !self.advance(generation, ConnectionState::Authenticating) {
            return Err(HealthcareError::Cancelled);
        }
        within(config.timeout, transport.authenticate(config)).await
    }

    /// Move to `next` only if `generation` is still current.
    fn advance(&self, generation: u64, next: ConnectionState) -> bool {
        let session = self.session();
        if session.generation != generation {
            return false;
        }
        self.set_state(next);
        true
    }

    fn complete(&self, generation: u64, grant: AuthGrant) -> Result<(), HealthcareError> {
        let mut session = self.session();
        if session.generation != generation {
            debug!(generation, "discarding stale connect completion");
            return Err(HealthcareError::Cancelled);
        }
        session.attempt = None;

        self.keep_session_token(&mut session, grant.session_token);
        session.expires_at = grant.expires_at;
        session.facility = grant.facility;
        session.retry_count = 0;
        session.last_error = None;
        self.set_state(ConnectionState::Connected);

        info!(
            priority = %Priority::Normal,
            facility = %session.config.facility_id,
            device = %session.config.device_id,
            "connected to nurse-call system"
        );
        Ok(())
    }

    fn fail(&self, generation: u64, error: HealthcareError) -> Result<(), HealthcareError> {
        let mut session = self.session();
        if session.generation != generation {
            debug!(generation, %error, "discarding stale connect failure");
            return Err(HealthcareError::Cancelled);
        }
        session.attempt = None;
        Err(self.record_failure(&mut session, error))
    }

    /// Enter `Error`, remember `error`, and schedule a reconnect if the
    /// error is retryable and the budget allows.
    fn record_failure(&self, session: &mut Session, error: HealthcareError) -> HealthcareError {
        session.last_error = Some(error);
        self.set_state(ConnectionState::Error);
        warn!(%error, priority = %error.priority(), "nurse-call connection failed");

        let policy = self.inner.retry_policy;
        if !error.should_retry() {
            return error;
        }
        if session.retry_count >= policy.max_retries {
            warn!(retries = session.retry_count, "reconnect budget exhausted");
            return error;
        }

        session.retry_count += 1;
        let delay = policy.delay_for(session.retry_count);
        let timer = CancellationToken::new();
        if let Some(previous) = session.retry_timer.replace(timer.clone()) {
            previous.cancel();
        }
        info!(
            attempt = session.retry_count,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        tokio::spawn(retry_after(self.clone(), delay, timer, session.generation));
        error
    }

    /// Clear the retry timer if it still belongs to `generation`.
    fn take_retry_timer(&self, generation: u64) -> bool {
        let mut session = self.session();
        if session.generation != generation {
            return false;
        }
        session.retry_timer = None;
        true
    }

    async fn await_in_flight(&self) -> Result<(), HealthcareError> {
        let mut rx = self.inner.state.subscribe();
        let settled = rx
            .wait_for(|state| !state.is_transitional())
            .await
            .map_or(ConnectionState::Disconnected, |state| *state);

        match settled {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Error => {
                Err(self.last_error().unwrap_or(HealthcareError::ConnectionTimeout))
            }
            _ => Err(HealthcareError::Cancelled),
        }
    }

    /// Store `token`, or hold it in the session when the secret store
    /// refuses it. Never fails the connection.
    fn keep_session_token(&self, session: &mut Session, token: SecretString) {
        match self.inner.secrets.set(SESSION_TOKEN_KEY, token.clone()) {
            Ok(()) => session.unstored_token = None,
            Err(e) => {
                warn!(error = %e, "secret store refused session token, keeping it in memory");
                session.unstored_token = Some(token);
            }
        }
    }

    fn session_token(&self, session: &Session) -> Option<SecretString> {
        session
            .unstored_token
            .clone()
            .or_else(|| self.inner.secrets.get(SESSION_TOKEN_KEY))
    }

    fn set_state(&self, next: ConnectionState) {
        self.inner.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "connection state changed");
            *current = next;
            true
        });
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Wait out the backoff delay, then try again unless cancelled.
///
/// Boxed so the spawned future's type does not contain itself.
fn retry_after(
    manager: ConnectionManager,
    delay: Duration,
    timer: CancellationToken,
    generation: u64,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        tokio::select! {
            biased;
            () = timer.cancelled() => debug!("scheduled reconnect cancelled"),
            () = tokio::time::sleep(delay) => {
                if !manager.take_retry_timer(generation) {
                    return;
                }
                if let Err(error) = manager.start_attempt(Trigger::Retry).await {
                    debug!(%error, "scheduled reconnect failed");
                }
            }
        }
    })
}

/// Bound a transport call by the configured timeout.
async fn within<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, HealthcareError>>,
) -> Result<T, HealthcareError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(HealthcareError::ConnectionTimeout))
}
