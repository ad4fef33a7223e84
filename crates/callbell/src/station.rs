// ── Station ──
//
// Application root for one bedside station. Builds every manager once
// and threads them through constructors; the UI shell binds to the
// observable state exposed here.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use callbell_config::{ConfigError, KeyringSecretStore, Settings};
use callbell_core::bell::{BellManager, BellPeripheral};
use callbell_core::{
    AuditLog, CallDispatcher, CallRequest, CallTransport, CallType, Configuration,
    ConnectionManager, ConnectionState, Dispatch, DispatchError, HealthcareError,
    MemorySecretStore, PendingQueue, PlaceholderTransport, RequeueSweeper, RetryPolicy,
    SecretStore, StoreError, SweepReport,
};

use crate::notice::{Banner, Notice, Notifier};

pub const CONFIRMATION_KEY: &str = "help_on_the_way_confirmation";
pub const QUEUED_KEY: &str = "call_request_queued";
pub const CONFIGURED_KEY: &str = "rauland_configured";
pub const SENT_AFTER_RECONNECT_KEY: &str = "call_requests_sent_after_reconnect";
pub const FAILED_AFTER_RECONNECT_KEY: &str = "call_requests_failed_after_reconnect";

#[derive(Debug, Error)]
pub enum StationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ── ConnectionStatus ─────────────────────────────────────────────

/// The persistent status indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    NotConfigured,
    ConnectedTo(String),
    State(ConnectionState),
}

impl ConnectionStatus {
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::NotConfigured => "rauland_not_configured",
            Self::ConnectedTo(_) => "rauland_connected_to",
            Self::State(state) => state.message_key(),
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => f.write_str("Not configured"),
            Self::ConnectedTo(facility) => write!(f, "Connected to {facility}"),
            Self::State(state) => write!(f, "{state}"),
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────

/// Explicit wiring for a [`Station`]. Defaults: placeholder transport,
/// in-memory secrets, default retry policy, no call-bell radio.
pub struct StationBuilder {
    config: Configuration,
    data_dir: PathBuf,
    transport: Arc<dyn CallTransport>,
    secrets: Arc<dyn SecretStore>,
    retry_policy: RetryPolicy,
    radio: Option<Arc<dyn BellPeripheral>>,
}

impl StationBuilder {
    pub fn transport(mut self, transport: Arc<dyn CallTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// BLE central driving the bedside call-bell button.
    pub fn bell_radio(mut self, radio: Arc<dyn BellPeripheral>) -> Self {
        self.radio = Some(radio);
        self
    }

    pub fn build(self) -> Station {
        let queue = Arc::new(PendingQueue::in_dir(&self.data_dir));
        let audit = Arc::new(AuditLog::in_dir(&self.data_dir));
        let configured = self.config.is_complete();
        let manager = ConnectionManager::new(
            self.config,
            self.transport,
            self.secrets,
            audit,
            self.retry_policy,
        );
        let shutdown = CancellationToken::new();

        Station {
            inner: Arc::new(StationInner {
                dispatcher: CallDispatcher::new(manager.clone(), queue.clone()),
                sweeper: RequeueSweeper::new(manager.clone(), queue.clone()),
                manager,
                bell: self.radio.map(BellManager::new),
                queue,
                notifier: Notifier::new(shutdown.clone()),
                configured: AtomicBool::new(configured),
                shutdown,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }
}

// ── Station ──────────────────────────────────────────────────────

/// Cheaply cloneable via `Arc<StationInner>`.
#[derive(Clone)]
pub struct Station {
    inner: Arc<StationInner>,
}

struct StationInner {
    manager: ConnectionManager,
    dispatcher: CallDispatcher,
    sweeper: RequeueSweeper,
    bell: Option<BellManager>,
    queue: Arc<PendingQueue>,
    notifier: Notifier,
    configured: AtomicBool,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Station {
    pub fn builder(config: Configuration, data_dir: impl Into<PathBuf>) -> StationBuilder {
        StationBuilder {
            config,
            data_dir: data_dir.into(),
            transport: Arc::new(PlaceholderTransport::default()),
            secrets: Arc::new(MemorySecretStore::new()),
            retry_policy: RetryPolicy::default(),
            radio: None,
        }
    }

    /// Build a station from settings: platform data dir, persisted
    /// device id, keyring secrets, placeholder backend. Without an API
    /// key the station starts on the demo configuration.
    pub fn open(settings: &Settings) -> Result<Self, StationError> {
        let data_dir = callbell_config::data_dir(settings);
        let device_id = callbell_config::resolve_device_id(settings, &data_dir)?;

        let config = match callbell_config::to_configuration(settings, &device_id) {
            Ok(config) => config,
            Err(ConfigError::NoCredentials) => {
                info!(device = %device_id, "no API key configured, using demo configuration");
                Configuration::placeholder(device_id)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self::builder(config, data_dir)
            .secrets(Arc::new(KeyringSecretStore::default()))
            .retry_policy(callbell_config::retry_policy(settings))
            .build())
    }

    /// Spawn the reconnect watcher. Call once, inside a runtime.
    pub fn start(&self) {
        let rx = self.inner.manager.state();
        let was_connected = rx.borrow().is_operational();
        let handle = tokio::spawn(reconnect_watcher(
            self.clone(),
            rx,
            was_connected,
            self.inner.shutdown.clone(),
        ));
        self.tasks().push(handle);
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.inner.manager
    }

    /// The call-bell manager, when the station was built with a radio.
    pub fn bell(&self) -> Option<&BellManager> {
        self.inner.bell.as_ref()
    }

    pub async fn connect(&self) -> Result<(), HealthcareError> {
        self.inner.manager.connect().await
    }

    /// Replace the connection configuration.
    pub fn configure(&self, config: Configuration) {
        let complete = config.is_complete();
        self.inner.configured.store(complete, Ordering::SeqCst);
        self.inner.manager.configure(config);

        if complete {
            self.inner.notifier.toast(CONFIGURED_KEY, false);
        } else {
            self.inner
                .notifier
                .toast(HealthcareError::InvalidConfiguration.message_key(), true);
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.configured.load(Ordering::SeqCst)
    }

    // ── Requests ─────────────────────────────────────────────────

    /// A patient pressed a call button.
    pub async fn request_assistance(
        &self,
        call_type: CallType,
        message: Option<String>,
    ) -> Result<Dispatch, DispatchError> {
        let notifier = &self.inner.notifier;
        match self.inner.dispatcher.dispatch(call_type, message).await {
            Ok(dispatch) => {
                match dispatch {
                    Dispatch::Sent(_) => notifier.show_banner(CONFIRMATION_KEY),
                    Dispatch::Queued(_) => {
                        notifier.toast(QUEUED_KEY, false);
                    }
                }
                Ok(dispatch)
            }
            Err(e) => {
                let key = match &e {
                    DispatchError::Delivery(error) => error.message_key(),
                    DispatchError::Queue(_) => HealthcareError::CallRequestFailed.message_key(),
                };
                notifier.toast(key, true);
                Err(e)
            }
        }
    }

    /// Give every queued request one delivery attempt and report the
    /// non-zero outcome counts as toasts.
    pub async fn send_queued_requests(&self) -> Result<SweepReport, StoreError> {
        let report = self.inner.sweeper.sweep().await?;
        let notifier = &self.inner.notifier;
        if report.sent > 0 {
            notifier.toast(format!("{} {SENT_AFTER_RECONNECT_KEY}", report.sent), false);
        }
        if report.failed > 0 {
            notifier.toast(format!("{} {FAILED_AFTER_RECONNECT_KEY}", report.failed), true);
        }
        Ok(report)
    }

    pub fn pending_requests(&self) -> Vec<CallRequest> {
        self.inner.queue.load()
    }

    pub fn call_history(&self) -> Vec<CallRequest> {
        self.inner.manager.call_history()
    }

    // ── Observation ──────────────────────────────────────────────

    pub fn connection_status(&self) -> ConnectionStatus {
        if !self.is_configured() {
            return ConnectionStatus::NotConfigured;
        }
        let manager = &self.inner.manager;
        match (manager.current_state(), manager.facility_info()) {
            (ConnectionState::Connected, Some(facility)) => {
                ConnectionStatus::ConnectedTo(facility.name)
            }
            (state, _) => ConnectionStatus::State(state),
        }
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notifier.subscribe()
    }

    pub fn banner(&self) -> watch::Receiver<Option<Banner>> {
        self.inner.notifier.banner()
    }

    pub fn dismiss_banner(&self) {
        self.inner.notifier.dismiss_banner();
    }

    /// Stop background tasks and disconnect.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handles: Vec<_> = self.tasks().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "station task ended abnormally");
            }
        }
        self.inner.manager.disconnect();
        if let Some(bell) = &self.inner.bell {
            bell.disconnect();
        }
        debug!("station shut down");
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Sweep the pending queue on every transition into `Connected`.
///
/// A disconnect and reconnect that both land while a sweep is running
/// collapse into one wakeup, so requests still pending while connected
/// count as a reconnect too.
async fn reconnect_watcher(
    station: Station,
    mut rx: watch::Receiver<ConnectionState>,
    mut was_connected: bool,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let connected = rx.borrow_and_update().is_operational();
                if connected && (!was_connected || !station.inner.queue.is_empty()) {
                    if let Err(e) = station.send_queued_requests().await {
                        warn!(error = %e, "sending queued call requests failed");
                    }
                }
                was_connected = connected;
            }
        }
    }
}
