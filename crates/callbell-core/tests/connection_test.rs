#![allow(clippy::unwrap_used)]
// Integration tests for `ConnectionManager` against scripted and
// placeholder transports, on paused tokio time.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use callbell_core::config::PLACEHOLDER_FACILITY_ID;
use callbell_core::secrets::SESSION_TOKEN_KEY;
use callbell_core::{
    AuditLog, CallTransport, CallType, Configuration, ConnectionManager, ConnectionState,
    HealthcareError, MemorySecretStore, PlaceholderTransport, RetryPolicy, ScriptedTransport,
    SecretError, SecretStore,
};

// ── Helpers ─────────────────────────────────────────────────────────

struct Harness {
    manager: ConnectionManager,
    transport: Arc<ScriptedTransport>,
    secrets: Arc<MemorySecretStore>,
    audit: Arc<AuditLog>,
    _dir: TempDir,
}

fn harness(transport: ScriptedTransport) -> Harness {
    harness_with_config(transport, Configuration::placeholder("bed-12").with_room("4B"))
}

fn harness_with_config(transport: ScriptedTransport, config: Configuration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(transport);
    let secrets = Arc::new(MemorySecretStore::new());
    let audit = Arc::new(AuditLog::in_dir(dir.path()));
    let manager = ConnectionManager::new(
        config,
        transport.clone() as Arc<dyn CallTransport>,
        secrets.clone(),
        audit.clone(),
        RetryPolicy::default(),
    );
    Harness {
        manager,
        transport,
        secrets,
        audit,
        _dir: dir,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ── Connect ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_demo_connect_walks_through_states() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ConnectionManager::new(
        Configuration::placeholder("bed-12"),
        Arc::new(PlaceholderTransport::default()),
        Arc::new(MemorySecretStore::new()),
        Arc::new(AuditLog::in_dir(dir.path())),
        RetryPolicy::default(),
    );
    let mut rx = manager.state();

    let task = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect().await }
    });

    let mut seen = Vec::new();
    while rx.changed().await.is_ok() {
        let state = *rx.borrow_and_update();
        seen.push(state);
        if !state.is_transitional() {
            break;
        }
    }
    task.await.unwrap().unwrap();

    assert_eq!(
        seen,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Authenticating,
            ConnectionState::Connected,
        ]
    );
    assert_eq!(manager.retry_count(), 0);
    assert_eq!(manager.facility_info().unwrap().name, PLACEHOLDER_FACILITY_ID);
    assert!(manager.session_expires_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_connect_when_connected_is_a_no_op() {
    let h = harness(ScriptedTransport::new());

    h.manager.connect().await.unwrap();
    h.manager.connect().await.unwrap();

    assert_eq!(h.transport.open_calls(), 1);
    assert!(h.manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_attempt() {
    let h = harness(ScriptedTransport::new().with_latency(Duration::from_secs(1)));

    let (a, b) = tokio::join!(h.manager.connect(), h.manager.connect());

    assert_eq!(a, Ok(()));
    assert_eq!(b, Ok(()));
    assert_eq!(h.transport.open_calls(), 1);
    assert_eq!(h.transport.authenticate_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_facility_never_changes_state() {
    let h = harness_with_config(
        ScriptedTransport::new(),
        Configuration::placeholder("bed-12").with_facility(""),
    );
    let rx = h.manager.state();

    let err = h.manager.connect().await.unwrap_err();

    assert_eq!(err, HealthcareError::InvalidConfiguration);
    assert_eq!(h.manager.current_state(), ConnectionState::Disconnected);
    assert!(!rx.has_changed().unwrap());
    assert_eq!(h.transport.open_calls(), 0);
    assert_eq!(h.manager.last_error(), Some(HealthcareError::InvalidConfiguration));
}

#[tokio::test(start_paused = true)]
async fn test_transport_call_is_bounded_by_timeout() {
    let mut config = Configuration::placeholder("bed-12");
    config.timeout = Duration::from_secs(5);
    let h = harness_with_config(
        ScriptedTransport::new().with_latency(Duration::from_secs(60)),
        config,
    );

    let err = h.manager.connect().await.unwrap_err();

    assert_eq!(err, HealthcareError::ConnectionTimeout);
    assert_eq!(h.manager.current_state(), ConnectionState::Error);
    h.manager.disconnect();
}

// ── Retry scheduling ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_retryable_failures_stop_after_three_retries() {
    let h = harness(ScriptedTransport::new());
    h.transport.fail_open(HealthcareError::ServerUnavailable, 4);

    let err = h.manager.connect().await.unwrap_err();
    assert_eq!(err, HealthcareError::ServerUnavailable);
    assert_eq!(h.manager.retry_count(), 1);

    // 2 s + 4 s + 6 s of backoff, then a long quiet period.
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.transport.open_calls(), 4);
    assert_eq!(h.manager.retry_count(), 3);
    assert_eq!(h.manager.current_state(), ConnectionState::Error);
    assert_eq!(h.manager.last_error(), Some(HealthcareError::ServerUnavailable));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_linear() {
    let h = harness(ScriptedTransport::new());
    h.transport.fail_open(HealthcareError::NetworkUnavailable, 3);

    let _ = h.manager.connect().await;

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(h.transport.open_calls(), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.transport.open_calls(), 2);

    // Second retry waits 4 s.
    tokio::time::sleep(Duration::from_millis(3800)).await;
    assert_eq!(h.transport.open_calls(), 2);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.transport.open_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_and_resets_budget() {
    let h = harness(ScriptedTransport::new());
    h.transport.fail_open(HealthcareError::ConnectionTimeout, 2);

    assert!(h.manager.connect().await.is_err());
    tokio::time::sleep(Duration::from_secs(7)).await;

    assert_eq!(h.manager.current_state(), ConnectionState::Connected);
    assert_eq!(h.manager.retry_count(), 0);
    assert_eq!(h.manager.last_error(), None);
    assert_eq!(h.transport.open_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_is_terminal() {
    let h = harness(ScriptedTransport::new());
    h.transport.fail_authenticate(HealthcareError::ApiKeyInvalid, 1);

    let err = h.manager.connect().await.unwrap_err();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(err, HealthcareError::ApiKeyInvalid);
    assert_eq!(h.manager.current_state(), ConnectionState::Error);
    assert_eq!(h.manager.retry_count(), 0);
    assert_eq!(h.transport.open_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_user_connect_restores_retry_budget() {
    let h = harness(ScriptedTransport::new());
    h.transport.fail_open(HealthcareError::ServerUnavailable, 10);

    let _ = h.manager.connect().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.transport.open_calls(), 4);

    let _ = h.manager.connect().await;
    assert_eq!(h.manager.retry_count(), 1);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.transport.open_calls(), 8);
}

// ── Disconnect ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let h = harness(ScriptedTransport::new());

    h.manager.disconnect();
    h.manager.disconnect();
    assert_eq!(h.manager.current_state(), ConnectionState::Disconnected);

    h.manager.connect().await.unwrap();
    h.manager.disconnect();
    h.manager.disconnect();

    assert_eq!(h.manager.current_state(), ConnectionState::Disconnected);
    assert!(h.secrets.get(SESSION_TOKEN_KEY).is_none());
    assert!(!h.manager.connection_info().session_active);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_discards_in_flight_attempt() {
    let h = harness(ScriptedTransport::new().with_latency(Duration::from_secs(1)));

    let task = tokio::spawn({
        let manager = h.manager.clone();
        async move { manager.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.manager.current_state(), ConnectionState::Connecting);

    h.manager.disconnect();

    assert_eq!(task.await.unwrap(), Err(HealthcareError::Cancelled));
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.manager.current_state(), ConnectionState::Disconnected);
    assert_eq!(h.transport.authenticate_calls(), 0);
    assert!(h.secrets.get(SESSION_TOKEN_KEY).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_scheduled_retry() {
    let h = harness(ScriptedTransport::new());
    h.transport.fail_open(HealthcareError::ServerUnavailable, 1);

    let _ = h.manager.connect().await;
    h.manager.disconnect();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.transport.open_calls(), 1);
    assert_eq!(h.manager.current_state(), ConnectionState::Disconnected);
}

// ── Session refresh ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_refresh_requires_connection() {
    let h = harness(ScriptedTransport::new());

    let err = h.manager.refresh_session().await.unwrap_err();

    assert_eq!(err, HealthcareError::AuthenticationFailed);
    assert_eq!(h.manager.current_state(), ConnectionState::Disconnected);
    assert_eq!(h.manager.last_error(), Some(HealthcareError::AuthenticationFailed));
    assert_eq!(h.transport.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_keeps_state_and_replaces_token() {
    let h = harness(ScriptedTransport::new());
    h.manager.connect().await.unwrap();
    let before = secrecy::ExposeSecret::expose_secret(&h.secrets.get(SESSION_TOKEN_KEY).unwrap())
        .to_owned();

    h.manager.refresh_session().await.unwrap();

    let after = h.secrets.get(SESSION_TOKEN_KEY).unwrap();
    assert_ne!(secrecy::ExposeSecret::expose_secret(&after), before);
    assert_eq!(h.manager.current_state(), ConnectionState::Connected);
    assert_eq!(h.transport.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_enters_error_and_reconnects() {
    let h = harness(ScriptedTransport::new());
    h.manager.connect().await.unwrap();
    h.transport.fail_refresh(HealthcareError::SessionExpired);

    let err = h.manager.refresh_session().await.unwrap_err();
    assert_eq!(err, HealthcareError::SessionExpired);
    assert_eq!(h.manager.current_state(), ConnectionState::Error);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.manager.current_state(), ConnectionState::Connected);
    assert_eq!(h.transport.open_calls(), 2);
}

// ── Call delivery ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_delivered_request_is_audited() {
    let h = harness(ScriptedTransport::new());
    h.manager.connect().await.unwrap();

    let request = h
        .manager
        .send_call_request(CallType::Nurse, Some("pain".into()))
        .await
        .unwrap();

    assert_eq!(request.priority, 3);
    assert_eq!(request.room_number.as_deref(), Some("4B"));
    assert_eq!(h.transport.delivered(), vec![request.clone()]);
    assert_eq!(h.audit.load(), vec![request.clone()]);
    assert_eq!(h.manager.call_history(), vec![request]);

    h.manager.clear_call_history().unwrap();
    assert!(h.audit.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_emergency_delivery_is_critical() {
    let h = harness(ScriptedTransport::new());
    h.manager.connect().await.unwrap();
    h.transport.fail_next_delivery(HealthcareError::ServerUnavailable);

    let err = h
        .manager
        .send_call_request(CallType::Emergency, None)
        .await
        .unwrap_err();

    assert_eq!(err, HealthcareError::EmergencyCallFailed);
    assert!(h.audit.is_empty());
    assert_eq!(h.manager.current_state(), ConnectionState::Connected);
    settle().await;
    assert_eq!(h.transport.open_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_info_snapshot() {
    let h = harness(ScriptedTransport::new());
    h.manager.connect().await.unwrap();

    let info = h.manager.connection_info();

    assert_eq!(info.state, ConnectionState::Connected);
    assert_eq!(info.device_id, "bed-12");
    assert_eq!(info.facility_id, PLACEHOLDER_FACILITY_ID);
    assert_eq!(info.facility_name.as_deref(), Some(PLACEHOLDER_FACILITY_ID));
    assert!(info.session_active);
    assert_eq!(info.last_error, None);
}

// ── Secret store faults ─────────────────────────────────────────────

/// A keystore that refuses every write, like a host without a secret
/// service.
struct RefusingSecrets;

impl SecretStore for RefusingSecrets {
    fn get(&self, _key: &str) -> Option<secrecy::SecretString> {
        None
    }

    fn set(&self, _key: &str, _value: secrecy::SecretString) -> Result<(), SecretError> {
        Err(SecretError("no secret service".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), SecretError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_refused_session_token_still_connects_once() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(ScriptedTransport::new());
    let manager = ConnectionManager::new(
        Configuration::placeholder("bed-12"),
        transport.clone(),
        Arc::new(RefusingSecrets),
        Arc::new(AuditLog::in_dir(dir.path())),
        RetryPolicy::default(),
    );

    manager.connect().await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(transport.authenticate_calls(), 1);
    assert_eq!(manager.current_state(), ConnectionState::Connected);
    assert!(manager.connection_info().session_active);

    manager.send_call_request(CallType::Nurse, None).await.unwrap();
    manager.refresh_session().await.unwrap();
    assert_eq!(transport.delivered().len(), 1);

    manager.disconnect();
    assert!(!manager.connection_info().session_active);
}
