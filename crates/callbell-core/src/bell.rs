// ── Bedside call-bell peripheral ──
//
// Finds the BLE call-bell button by its service UUID, connects,
// locates the call characteristic and writes the one-byte call signal.
// Radio access sits behind `BellPeripheral` so hosts plug in their BLE
// stack and tests plug in a fake.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use strum::Display;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CALL_BELL_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_FFF0_0000_1000_8000_0080_5F9B_34FB);
pub const CALL_BELL_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_FFF1_0000_1000_8000_0080_5F9B_34FB);

/// Written to the call characteristic to raise a call.
pub const CALL_SIGNAL: [u8; 1] = [0x01];

pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

// ── Peripheral seam ──────────────────────────────────────────────

/// Opaque handle for a discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(pub String);

/// The subset of a BLE central the bell manager drives.
pub trait BellPeripheral: Send + Sync {
    fn is_powered_on(&self) -> bool;

    /// Scan until a peripheral advertising `service` shows up.
    fn scan(&self, service: Uuid) -> BoxFuture<'_, Result<PeripheralId, BellError>>;

    fn stop_scan(&self);

    fn connect<'a>(&'a self, peripheral: &'a PeripheralId) -> BoxFuture<'a, Result<(), BellError>>;

    /// Resolve `characteristic` inside `service` on a connected peripheral.
    fn discover<'a>(
        &'a self,
        peripheral: &'a PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> BoxFuture<'a, Result<(), BellError>>;

    /// Write with response.
    fn write<'a>(
        &'a self,
        peripheral: &'a PeripheralId,
        characteristic: Uuid,
        data: &'a [u8],
    ) -> BoxFuture<'a, Result<(), BellError>>;

    fn cancel(&self, peripheral: &PeripheralId);
}

// ── State & errors ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BellState {
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    Error,
}

impl BellState {
    pub fn is_operational(self) -> bool {
        self == Self::Connected
    }

    pub fn allows_scanning(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

/// Severity of a peripheral failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum ErrorPriority {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorPriority {
    pub fn requires_immediate_attention(self) -> bool {
        self >= Self::High
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BellError {
    #[error("Bluetooth is not available")]
    BluetoothUnavailable,

    #[error("Bluetooth permission denied")]
    BluetoothPermissionDenied,

    #[error("Connection to call bell device timed out")]
    DeviceConnectionTimeout,

    #[error("Call bell device not found")]
    CallBellDeviceNotFound,

    #[error("Call bell service unavailable on device")]
    CallBellServiceUnavailable,

    #[error("Call bell characteristic not found")]
    CallBellCharacteristicNotFound,

    #[error("Emergency call transmission failed")]
    EmergencyCallFailed,
}

impl BellError {
    pub fn priority(self) -> ErrorPriority {
        match self {
            Self::EmergencyCallFailed => ErrorPriority::Critical,
            Self::BluetoothUnavailable
            | Self::DeviceConnectionTimeout
            | Self::CallBellDeviceNotFound => ErrorPriority::High,
            Self::BluetoothPermissionDenied
            | Self::CallBellServiceUnavailable
            | Self::CallBellCharacteristicNotFound => ErrorPriority::Medium,
        }
    }

    /// Failures that must reach the compliance log.
    pub fn should_audit(self) -> bool {
        self == Self::EmergencyCallFailed
    }

    pub fn should_retry(self) -> bool {
        matches!(self, Self::DeviceConnectionTimeout | Self::CallBellDeviceNotFound)
    }

    pub fn recovery_suggestion(self) -> &'static str {
        match self {
            Self::BluetoothUnavailable => "Enable Bluetooth, then restart the app.",
            Self::BluetoothPermissionDenied => "Allow Bluetooth access for this app in system settings.",
            Self::DeviceConnectionTimeout => {
                "Move closer to the call bell device, make sure it is powered on, and try again."
            }
            Self::CallBellDeviceNotFound => {
                "Check that the call bell device is powered on and ask IT for pairing instructions."
            }
            Self::CallBellServiceUnavailable => "Check device compatibility with your IT administrator.",
            Self::CallBellCharacteristicNotFound => {
                "Restart the app and the call bell device, then connect again."
            }
            Self::EmergencyCallFailed => {
                "Use backup communication immediately and contact technical support if this persists."
            }
        }
    }
}

// ── BellManager ──────────────────────────────────────────────────

/// Scan / connect / trigger state machine for one call-bell button.
#[derive(Clone)]
pub struct BellManager {
    inner: Arc<BellInner>,
}

struct BellInner {
    radio: Arc<dyn BellPeripheral>,
    state: watch::Sender<BellState>,
    link: Mutex<Link>,
}

#[derive(Default)]
struct Link {
    peripheral: Option<PeripheralId>,
    characteristic_ready: bool,
    generation: u64,
    retry_count: u32,
    retry_timer: Option<CancellationToken>,
    attempt: Option<CancellationToken>,
    last_error: Option<BellError>,
}

impl BellManager {
    pub fn new(radio: Arc<dyn BellPeripheral>) -> Self {
        let (state, _) = watch::channel(BellState::Disconnected);
        Self {
            inner: Arc::new(BellInner {
                radio,
                state,
                link: Mutex::new(Link::default()),
            }),
        }
    }

    pub fn state(&self) -> watch::Receiver<BellState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> BellState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.current_state().is_operational()
    }

    pub fn last_error(&self) -> Option<BellError> {
        self.link().last_error
    }

    pub fn retry_count(&self) -> u32 {
        self.link().retry_count
    }

    /// Scan for the call bell and connect to the first one found.
    ///
    /// Scanning plus connecting is bounded by [`CONNECTION_TIMEOUT`].
    /// Timeouts and missing devices are retried up to three times.
    pub async fn start_scanning(&self) -> Result<(), BellError> {
        let state = self.current_state();
        if !state.allows_scanning() {
            debug!(%state, "scan ignored");
            return Err(BellError::BluetoothUnavailable);
        }

        let (generation, cancel) = {
            let mut link = self.link();
            if !self.inner.radio.is_powered_on() {
                return Err(self.handle_error(&mut link, BellError::BluetoothUnavailable));
            }
            if let Some(timer) = link.retry_timer.take() {
                timer.cancel();
            }
            link.generation += 1;
            let cancel = CancellationToken::new();
            link.attempt = Some(cancel.clone());
            self.set_state(BellState::Scanning);
            (link.generation, cancel)
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BellError::DeviceConnectionTimeout),
            result = tokio::time::timeout(CONNECTION_TIMEOUT, self.establish(generation)) => {
                result.unwrap_or(Err(BellError::DeviceConnectionTimeout))
            }
        };

        let mut link = self.link();
        if link.generation != generation {
            return Err(BellError::DeviceConnectionTimeout);
        }
        link.attempt = None;
        match result {
            Ok(peripheral) => {
                info!(peripheral = %peripheral.0, "call bell connected");
                link.peripheral = Some(peripheral);
                link.characteristic_ready = true;
                link.retry_count = 0;
                link.last_error = None;
                self.set_state(BellState::Connected);
                Ok(())
            }
            Err(error) => {
                self.inner.radio.stop_scan();
                Err(self.handle_error(&mut link, error))
            }
        }
    }

    pub fn stop_scanning(&self) {
        self.inner.radio.stop_scan();
        if self.current_state() == BellState::Scanning {
            let mut link = self.link();
            if let Some(attempt) = link.attempt.take() {
                attempt.cancel();
            }
            link.generation += 1;
            self.set_state(BellState::Disconnected);
        }
    }

    /// Raise a call by writing [`CALL_SIGNAL`] to the bell.
    pub async fn trigger_call_bell(&self) -> Result<(), BellError> {
        let peripheral = {
            let mut link = self.link();
            if !self.is_connected() {
                link.last_error = Some(BellError::CallBellDeviceNotFound);
                return Err(BellError::CallBellDeviceNotFound);
            }
            match (&link.peripheral, link.characteristic_ready) {
                (Some(peripheral), true) => peripheral.clone(),
                _ => {
                    link.last_error = Some(BellError::CallBellCharacteristicNotFound);
                    return Err(BellError::CallBellCharacteristicNotFound);
                }
            }
        };

        let written = self
            .inner
            .radio
            .write(&peripheral, CALL_BELL_CHARACTERISTIC_UUID, &CALL_SIGNAL)
            .await;
        if let Err(cause) = written {
            let error = BellError::EmergencyCallFailed;
            warn!(
                %cause,
                priority = %error.priority(),
                audit = error.should_audit(),
                "call bell write failed"
            );
            self.link().last_error = Some(error);
            return Err(error);
        }
        info!(peripheral = %peripheral.0, "call bell triggered");
        Ok(())
    }

    /// Drop the peripheral and return to `Disconnected`.
    pub fn disconnect(&self) {
        let mut link = self.link();
        if let Some(attempt) = link.attempt.take() {
            attempt.cancel();
        }
        if let Some(timer) = link.retry_timer.take() {
            timer.cancel();
        }
        self.inner.radio.stop_scan();
        if let Some(peripheral) = link.peripheral.take() {
            self.inner.radio.cancel(&peripheral);
        }
        link.characteristic_ready = false;
        link.retry_count = 0;
        link.generation += 1;
        self.set_state(BellState::Disconnected);
        debug!("call bell disconnected");
    }

    async fn establish(&self, generation: u64) -> Result<PeripheralId, BellError> {
        let radio = &self.inner.radio;
        let peripheral = radio.scan(CALL_BELL_SERVICE_UUID).await?;
        radio.stop_scan();

        {
            let mut link = self.link();
            if link.generation != generation {
                return Err(BellError::DeviceConnectionTimeout);
            }
            link.peripheral = Some(peripheral.clone());
            self.set_state(BellState::Connecting);
        }

        radio.connect(&peripheral).await?;
        radio
            .discover(&peripheral, CALL_BELL_SERVICE_UUID, CALL_BELL_CHARACTERISTIC_UUID)
            .await?;
        Ok(peripheral)
    }

    fn handle_error(&self, link: &mut Link, error: BellError) -> BellError {
        link.last_error = Some(error);
        if let Some(peripheral) = link.peripheral.take() {
            self.inner.radio.cancel(&peripheral);
        }
        link.characteristic_ready = false;
        self.set_state(BellState::Error);

        if error.should_audit() {
            warn!(%error, priority = %error.priority(), audit = true, "call bell failure");
        } else {
            warn!(%error, priority = %error.priority(), "call bell failure");
        }

        if !error.should_retry() || link.retry_count >= MAX_RETRIES {
            link.retry_count = 0;
            return error;
        }

        link.retry_count += 1;
        let delay = RETRY_BASE_DELAY.saturating_mul(link.retry_count);
        let timer = CancellationToken::new();
        link.retry_timer = Some(timer.clone());
        debug!(attempt = link.retry_count, ?delay, "call bell rescan scheduled");
        tokio::spawn(rescan_after(self.clone(), delay, timer));
        error
    }

    fn set_state(&self, next: BellState) {
        self.inner.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.inner.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn rescan_after(
    manager: BellManager,
    delay: Duration,
    timer: CancellationToken,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        tokio::select! {
            biased;
            () = timer.cancelled() => {}
            () = tokio::time::sleep(delay) => {
                if let Err(error) = manager.start_scanning().await {
                    debug!(%error, "call bell rescan failed");
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct FakeRadio {
        powered_off: AtomicBool,
        scans: AtomicUsize,
        scan_failures: Mutex<VecDeque<BellError>>,
        fail_writes: AtomicBool,
        written: Mutex<Vec<Vec<u8>>>,
    }

    impl BellPeripheral for FakeRadio {
        fn is_powered_on(&self) -> bool {
            !self.powered_off.load(Ordering::SeqCst)
        }

        fn scan(&self, service: Uuid) -> BoxFuture<'_, Result<PeripheralId, BellError>> {
            Box::pin(async move {
                assert_eq!(service, CALL_BELL_SERVICE_UUID);
                self.scans.fetch_add(1, Ordering::SeqCst);
                match self.scan_failures.lock().unwrap().pop_front() {
                    Some(error) => Err(error),
                    None => Ok(PeripheralId("bell-1".into())),
                }
            })
        }

        fn stop_scan(&self) {}

        fn connect<'a>(&'a self, _: &'a PeripheralId) -> BoxFuture<'a, Result<(), BellError>> {
            Box::pin(async { Ok(()) })
        }

        fn discover<'a>(
            &'a self,
            _: &'a PeripheralId,
            _: Uuid,
            _: Uuid,
        ) -> BoxFuture<'a, Result<(), BellError>> {
            Box::pin(async { Ok(()) })
        }

        fn write<'a>(
            &'a self,
            _: &'a PeripheralId,
            characteristic: Uuid,
            data: &'a [u8],
        ) -> BoxFuture<'a, Result<(), BellError>> {
            Box::pin(async move {
                assert_eq!(characteristic, CALL_BELL_CHARACTERISTIC_UUID);
                if self.fail_writes.load(Ordering::SeqCst) {
                    return Err(BellError::CallBellServiceUnavailable);
                }
                self.written.lock().unwrap().push(data.to_vec());
                Ok(())
            })
        }

        fn cancel(&self, _: &PeripheralId) {}
    }

    #[test]
    fn uuids_match_the_call_bell_profile() {
        assert_eq!(
            CALL_BELL_SERVICE_UUID.to_string(),
            "0000fff0-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CALL_BELL_CHARACTERISTIC_UUID.to_string(),
            "0000fff1-0000-1000-8000-00805f9b34fb"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scan_connect_and_trigger_writes_call_signal() {
        let radio = Arc::new(FakeRadio::default());
        let bell = BellManager::new(radio.clone());

        bell.start_scanning().await.unwrap();
        assert_eq!(bell.current_state(), BellState::Connected);

        bell.trigger_call_bell().await.unwrap();
        assert_eq!(*radio.written.lock().unwrap(), vec![vec![0x01]]);
    }

    #[tokio::test(start_paused = true)]
    async fn powered_off_radio_is_a_terminal_error() {
        let radio = Arc::new(FakeRadio::default());
        radio.powered_off.store(true, Ordering::SeqCst);
        let bell = BellManager::new(radio.clone());

        let err = bell.start_scanning().await.unwrap_err();

        assert_eq!(err, BellError::BluetoothUnavailable);
        assert_eq!(bell.current_state(), BellState::Error);
        assert_eq!(bell.retry_count(), 0);
        assert_eq!(radio.scans.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_device_is_rescanned_three_times() {
        let radio = Arc::new(FakeRadio::default());
        radio
            .scan_failures
            .lock()
            .unwrap()
            .extend([BellError::CallBellDeviceNotFound; 4]);
        let bell = BellManager::new(radio.clone());

        assert!(bell.start_scanning().await.is_err());
        // 2 s + 4 s + 6 s of backoff.
        tokio::time::sleep(Duration::from_secs(13)).await;

        assert_eq!(radio.scans.load(Ordering::SeqCst), 4);
        assert_eq!(bell.current_state(), BellState::Error);
        assert_eq!(bell.last_error(), Some(BellError::CallBellDeviceNotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_requires_connection() {
        let bell = BellManager::new(Arc::new(FakeRadio::default()));

        let err = bell.trigger_call_bell().await.unwrap_err();

        assert_eq!(err, BellError::CallBellDeviceNotFound);
        assert_eq!(bell.current_state(), BellState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_is_an_audited_emergency_failure() {
        let radio = Arc::new(FakeRadio::default());
        let bell = BellManager::new(radio.clone());
        bell.start_scanning().await.unwrap();
        radio.fail_writes.store(true, Ordering::SeqCst);

        let err = bell.trigger_call_bell().await.unwrap_err();

        assert_eq!(err, BellError::EmergencyCallFailed);
        assert!(err.should_audit());
        assert!(err.priority().requires_immediate_attention());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_resets_to_disconnected() {
        let bell = BellManager::new(Arc::new(FakeRadio::default()));
        bell.start_scanning().await.unwrap();

        bell.disconnect();
        bell.disconnect();

        assert_eq!(bell.current_state(), BellState::Disconnected);
        assert_eq!(
            bell.trigger_call_bell().await.unwrap_err(),
            BellError::CallBellDeviceNotFound
        );
    }
}
