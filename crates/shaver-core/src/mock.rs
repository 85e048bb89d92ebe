//! Mock transport for testing.
//!
//! [`MockTransport`] implements [`ShaverTransport`] without any Bluetooth
//! hardware. Tests script it from the outside: whether the shaver is in range,
//! which characteristics answer and with what, how many connects fail, and
//! when notifications arrive or the link drops.
//!
//! # Features
//!
//! - **Failure injection**: failing connects, failing reads per characteristic,
//!   failing writes
//! - **Latency simulation**: connect latency that interacts with the
//!   session timeout, plus read and unsubscribe latency
//! - **Remote events**: push notifications and remote disconnects into the
//!   active session

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use shaver_types::uuids;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::traits::{DisconnectCallback, GattSession, NotifyCallback, Presence, ShaverTransport};

struct MockState {
    address: String,
    observable: AtomicBool,
    rssi: AtomicI16,
    values: RwLock<HashMap<Uuid, Vec<u8>>>,
    failing_reads: RwLock<HashSet<Uuid>>,
    fail_writes: AtomicBool,
    connect_always_fails: AtomicBool,
    /// Number of connects to fail before succeeding.
    remaining_connect_failures: AtomicU32,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    read_latency_ms: AtomicU64,
    unsubscribe_latency_ms: AtomicU64,
    sessions_opened: AtomicU32,
    /// Sessions currently connected, and the most ever connected at once.
    connected_sessions: AtomicU32,
    peak_sessions: AtomicU32,
    disconnect_calls: AtomicU32,
    writes: RwLock<Vec<(Uuid, Vec<u8>)>>,
    active: RwLock<Option<Arc<MockSession>>>,
}

/// A scripted stand-in for the BLE stack.
///
/// Cloning yields another handle to the same scripted device.
///
/// # Example
///
/// ```
/// use shaver_core::{MockTransport, ShaverTransport};
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::builder().observable(false).build();
///     assert!(transport.is_device_observable("AA:BB").await.is_none());
/// }
/// ```
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("address", &self.state.address)
            .field("observable", &self.state.observable.load(Ordering::Relaxed))
            .field(
                "sessions_opened",
                &self.state.sessions_opened.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockTransport {
    /// A mock shaver in range with typical values for every characteristic.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::new()
    }

    /// Address of the scripted device.
    pub fn address(&self) -> &str {
        &self.state.address
    }

    // --- Scripting ---

    pub fn set_observable(&self, observable: bool) {
        self.state.observable.store(observable, Ordering::SeqCst);
    }

    pub fn set_rssi(&self, rssi: i16) {
        self.state.rssi.store(rssi, Ordering::SeqCst);
    }

    /// Fail the next `count` connects, then succeed.
    pub fn fail_next_connects(&self, count: u32) {
        self.state
            .remaining_connect_failures
            .store(count, Ordering::SeqCst);
    }

    /// Fail every connect until cleared.
    pub fn set_connect_failure(&self, fail: bool) {
        self.state.connect_always_fails.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_latency(&self, latency: Duration) {
        self.state
            .connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay every read by `latency`.
    pub fn set_read_latency(&self, latency: Duration) {
        self.state
            .read_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay every unsubscribe by `latency`.
    pub fn set_unsubscribe_latency(&self, latency: Duration) {
        self.state
            .unsubscribe_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_write_failure(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Value returned by reads of `characteristic`.
    pub async fn set_value(&self, characteristic: Uuid, data: &[u8]) {
        self.state
            .values
            .write()
            .await
            .insert(characteristic, data.to_vec());
    }

    /// Make reads of `characteristic` fail (or succeed again).
    pub async fn set_read_failure(&self, characteristic: Uuid, fail: bool) {
        let mut failing = self.state.failing_reads.write().await;
        if fail {
            failing.insert(characteristic);
        } else {
            failing.remove(&characteristic);
        }
    }

    // --- Remote events ---

    /// Deliver a notification to the active session.
    ///
    /// Returns `false` when no connected session is subscribed to it.
    pub async fn notify(&self, characteristic: Uuid, data: &[u8]) -> bool {
        match self.active_session().await {
            Some(session) => session.deliver(characteristic, data).await,
            None => false,
        }
    }

    /// Drop the link from the device side and fire the disconnect callback.
    pub async fn drop_link(&self) {
        if let Some(session) = self.state.active.write().await.take() {
            session.mark_disconnected();
            (session.on_disconnect)();
        }
    }

    // --- Inspection ---

    /// The currently open session, if any.
    pub async fn active_session(&self) -> Option<Arc<MockSession>> {
        self.state.active.read().await.clone()
    }

    pub fn sessions_opened(&self) -> u32 {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }

    /// Most sessions that were ever connected at the same time.
    pub fn peak_sessions(&self) -> u32 {
        self.state.peak_sessions.load(Ordering::SeqCst)
    }

    /// Number of explicit [`GattSession::disconnect`] calls.
    pub fn disconnect_calls(&self) -> u32 {
        self.state.disconnect_calls.load(Ordering::SeqCst)
    }

    /// All successful writes, in order.
    pub async fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.state.writes.read().await.clone()
    }
}

#[async_trait]
impl ShaverTransport for MockTransport {
    async fn is_device_observable(&self, _address: &str) -> Option<Presence> {
        if !self.state.observable.load(Ordering::SeqCst) {
            return None;
        }
        Some(Presence {
            rssi: Some(self.state.rssi.load(Ordering::SeqCst)),
            name: Some("Philips Shaver".to_string()),
        })
    }

    async fn open_session(
        &self,
        address: &str,
        on_disconnect: DisconnectCallback,
        timeout: Duration,
    ) -> Result<Arc<dyn GattSession>> {
        let latency = Duration::from_millis(self.state.connect_latency_ms.load(Ordering::SeqCst));
        if latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(Error::timeout("connect", timeout));
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if !self.state.observable.load(Ordering::SeqCst) {
            return Err(Error::connection_failed(
                Some(address.to_string()),
                ConnectionFailureReason::OutOfRange,
            ));
        }

        let scripted_failure = self
            .state
            .remaining_connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || self.state.connect_always_fails.load(Ordering::SeqCst) {
            return Err(Error::connection_failed(
                Some(address.to_string()),
                ConnectionFailureReason::Other("Mock connect failure".to_string()),
            ));
        }

        let session = Arc::new(MockSession {
            state: Arc::clone(&self.state),
            connected: AtomicBool::new(true),
            on_disconnect,
            subscriptions: Mutex::new(HashMap::new()),
        });
        *self.state.active.write().await = Some(Arc::clone(&session));
        self.state.sessions_opened.fetch_add(1, Ordering::SeqCst);
        let connected = self.state.connected_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_sessions.fetch_max(connected, Ordering::SeqCst);
        Ok(session)
    }
}

/// A session opened by [`MockTransport`].
pub struct MockSession {
    state: Arc<MockState>,
    connected: AtomicBool,
    on_disconnect: DisconnectCallback,
    subscriptions: Mutex<HashMap<Uuid, NotifyCallback>>,
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession")
            .field("address", &self.state.address)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockSession {
    /// Characteristics with an active subscription.
    pub async fn subscribed(&self) -> HashSet<Uuid> {
        self.subscriptions.lock().await.keys().copied().collect()
    }

    fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.state.connected_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn deliver(&self, characteristic: Uuid, data: &[u8]) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        match self.subscriptions.lock().await.get(&characteristic) {
            Some(callback) => {
                callback(data);
                true
            }
            None => false,
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl GattSession for MockSession {
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        delay(&self.state.read_latency_ms).await;
        self.ensure_connected()?;
        if self.state.failing_reads.read().await.contains(&characteristic) {
            return Err(Error::InvalidData(format!(
                "Mock read failure for {characteristic}"
            )));
        }
        self.state
            .values
            .read()
            .await
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(characteristic.to_string(), 0))
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.ensure_connected()?;
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::WriteFailed {
                uuid: characteristic.to_string(),
                reason: "Mock write failure".to_string(),
            });
        }
        self.state
            .values
            .write()
            .await
            .insert(characteristic, data.to_vec());
        self.state
            .writes
            .write()
            .await
            .push((characteristic, data.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid, on_notify: NotifyCallback) -> Result<()> {
        self.ensure_connected()?;
        self.subscriptions
            .lock()
            .await
            .insert(characteristic, on_notify);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        self.ensure_connected()?;
        delay(&self.state.unsubscribe_latency_ms).await;
        self.subscriptions.lock().await.remove(&characteristic);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.mark_disconnected();
        self.subscriptions.lock().await.clear();
        self.state.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        let mut active = self.state.active.write().await;
        if active
            .as_ref()
            .is_some_and(|s| std::ptr::eq(Arc::as_ptr(s), self))
        {
            *active = None;
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn delay(latency_ms: &AtomicU64) {
    let latency = latency_ms.load(Ordering::SeqCst);
    if latency > 0 {
        tokio::time::sleep(Duration::from_millis(latency)).await;
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug)]
pub struct MockTransportBuilder {
    address: String,
    observable: bool,
    rssi: i16,
    values: HashMap<Uuid, Vec<u8>>,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransportBuilder {
    /// A builder pre-filled with a typical shaver: model XP9201, 85 % battery,
    /// switched off, motion + pressure + light ring capabilities.
    pub fn new() -> Self {
        let values = HashMap::from([
            (uuids::BATTERY_LEVEL, vec![85]),
            (uuids::FIRMWARE_REVISION, b"1.4.2".to_vec()),
            (uuids::MODEL_NUMBER, b"XP9201".to_vec()),
            (uuids::SERIAL_NUMBER, b"MOCK0001".to_vec()),
            (uuids::HEAD_REMAINING, vec![92]),
            (uuids::DAYS_SINCE_LAST_USED, vec![0x02, 0x00]),
            (uuids::SHAVING_TIME, vec![0x2C, 0x01]),
            (uuids::DEVICE_STATE, vec![0x01]),
            (uuids::TRAVEL_LOCK, vec![0x00]),
            (uuids::MOTOR_CURRENT_MAX, vec![0xF4, 0x01]),
            (uuids::AMOUNT_OF_CHARGES, vec![0x2A, 0x00]),
            (uuids::AMOUNT_OF_OPERATIONAL_TURNS, vec![0x10, 0x27]),
            (uuids::TOTAL_AGE, vec![0x80, 0x51, 0x01, 0x00]),
            (uuids::SHAVING_MODE, vec![0x01]),
            (
                uuids::SHAVING_MODE_SETTINGS,
                vec![0xd0, 0x07, 0x00, 0x00, 0x00, 0x06, 0xa0, 0x0f, 0x00, 0x00],
            ),
            (
                uuids::CUSTOM_SHAVING_MODE_SETTINGS,
                vec![0xd0, 0x07, 0x00, 0x00, 0x00, 0x06, 0xa0, 0x0f, 0x00, 0x00],
            ),
            (uuids::CAPABILITIES, vec![0b100_1001, 0x00, 0x00, 0x00]),
            (uuids::LIGHTRING_COLOR_LOW, vec![0xFF, 0xFF, 0xFF, 0xFF]),
            (uuids::LIGHTRING_COLOR_OK, vec![0x37, 0xFF, 0x00, 0xFF]),
            (uuids::LIGHTRING_COLOR_HIGH, vec![0xFF, 0x00, 0x00, 0xFF]),
            (uuids::LIGHTRING_COLOR_MOTION, vec![0x00, 0x80, 0xFF, 0xFF]),
            (uuids::LIGHTRING_BRIGHTNESS, vec![80]),
        ]);
        Self {
            address: format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF),
            observable: true,
            rssi: -60,
            values,
        }
    }

    #[must_use]
    pub fn address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    #[must_use]
    pub fn observable(mut self, observable: bool) -> Self {
        self.observable = observable;
        self
    }

    #[must_use]
    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// Set the value read from a characteristic.
    #[must_use]
    pub fn value(mut self, characteristic: Uuid, data: &[u8]) -> Self {
        self.values.insert(characteristic, data.to_vec());
        self
    }

    /// Remove a characteristic so reads of it fail as not found.
    #[must_use]
    pub fn without(mut self, characteristic: Uuid) -> Self {
        self.values.remove(&characteristic);
        self
    }

    /// Set the capability bitmask the device reports.
    #[must_use]
    pub fn capabilities(self, bits: u32) -> Self {
        self.value(uuids::CAPABILITIES, &bits.to_le_bytes())
    }

    pub fn build(self) -> MockTransport {
        MockTransport {
            state: Arc::new(MockState {
                address: self.address,
                observable: AtomicBool::new(self.observable),
                rssi: AtomicI16::new(self.rssi),
                values: RwLock::new(self.values),
                failing_reads: RwLock::new(HashSet::new()),
                fail_writes: AtomicBool::new(false),
                connect_always_fails: AtomicBool::new(false),
                remaining_connect_failures: AtomicU32::new(0),
                connect_latency_ms: AtomicU64::new(0),
                read_latency_ms: AtomicU64::new(0),
                unsubscribe_latency_ms: AtomicU64::new(0),
                sessions_opened: AtomicU32::new(0),
                connected_sessions: AtomicU32::new(0),
                peak_sessions: AtomicU32::new(0),
                disconnect_calls: AtomicU32::new(0),
                writes: RwLock::new(Vec::new()),
                active: RwLock::new(None),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn noop_disconnect() -> DisconnectCallback {
        Arc::new(|| {})
    }

    #[tokio::test]
    async fn test_presence_follows_script() {
        let transport = MockTransport::builder().rssi(-42).build();
        let presence = transport.is_device_observable("x").await.unwrap();
        assert_eq!(presence.rssi, Some(-42));

        transport.set_observable(false);
        assert!(transport.is_device_observable("x").await.is_none());
    }

    #[tokio::test]
    async fn test_read_write_round_trip() {
        let transport = MockTransport::new();
        let session = transport
            .open_session("x", noop_disconnect(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(session.read(uuids::BATTERY_LEVEL).await.unwrap(), vec![85]);
        session.write(uuids::SHAVING_MODE, &[0x04]).await.unwrap();
        assert_eq!(session.read(uuids::SHAVING_MODE).await.unwrap(), vec![0x04]);
        assert_eq!(
            transport.writes().await,
            vec![(uuids::SHAVING_MODE, vec![0x04])]
        );
    }

    #[tokio::test]
    async fn test_read_failures() {
        let transport = MockTransport::builder().without(uuids::PRESSURE).build();
        transport.set_read_failure(uuids::BATTERY_LEVEL, true).await;
        let session = transport
            .open_session("x", noop_disconnect(), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(session.read(uuids::BATTERY_LEVEL).await.is_err());
        assert!(matches!(
            session.read(uuids::PRESSURE).await,
            Err(Error::CharacteristicNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_scripted_connect_failures() {
        let transport = MockTransport::new();
        transport.fail_next_connects(2);
        for _ in 0..2 {
            assert!(
                transport
                    .open_session("x", noop_disconnect(), Duration::from_secs(1))
                    .await
                    .is_err()
            );
        }
        assert!(
            transport
                .open_session("x", noop_disconnect(), Duration::from_secs(1))
                .await
                .is_ok()
        );
        assert_eq!(transport.sessions_opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_latency_beyond_timeout() {
        let transport = MockTransport::new();
        transport.set_connect_latency(Duration::from_secs(30));
        let result = transport
            .open_session("x", noop_disconnect(), Duration::from_secs(15))
            .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_notifications_and_remote_disconnect() {
        let transport = MockTransport::new();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let on_disconnect: DisconnectCallback = {
            let disconnects = Arc::clone(&disconnects);
            Arc::new(move || {
                disconnects.fetch_add(1, Ordering::SeqCst);
            })
        };
        let session = transport
            .open_session("x", on_disconnect, Duration::from_secs(1))
            .await
            .unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = Arc::clone(&seen);
            session
                .subscribe(
                    uuids::DEVICE_STATE,
                    Box::new(move |data| {
                        seen.store(data[0] as usize, Ordering::SeqCst);
                    }),
                )
                .await
                .unwrap();
        }

        assert!(transport.notify(uuids::DEVICE_STATE, &[0x02]).await);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(!transport.notify(uuids::TRAVEL_LOCK, &[0x01]).await);

        transport.drop_link().await;
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(!session.is_connected().await);
        assert!(matches!(
            session.read(uuids::BATTERY_LEVEL).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peak_sessions_and_latency() {
        let transport = MockTransport::new();
        transport.set_read_latency(Duration::from_secs(2));
        let first = transport
            .open_session("x", noop_disconnect(), Duration::from_secs(1))
            .await
            .unwrap();
        let started = tokio::time::Instant::now();
        first.read(uuids::BATTERY_LEVEL).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));

        first.disconnect().await.unwrap();
        first.disconnect().await.unwrap();
        let second = transport
            .open_session("x", noop_disconnect(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(transport.peak_sessions(), 1);

        let _third = transport
            .open_session("x", noop_disconnect(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(transport.peak_sessions(), 2);
        second.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_explicit_disconnect_clears_active_session() {
        let transport = MockTransport::new();
        let session = transport
            .open_session("x", noop_disconnect(), Duration::from_secs(1))
            .await
            .unwrap();
        session.disconnect().await.unwrap();
        assert!(transport.active_session().await.is_none());
        assert_eq!(transport.disconnect_calls(), 1);
    }
}
