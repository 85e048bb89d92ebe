//! btleplug-backed transport.
//!
//! [`BleTransport`] owns one adapter and keeps it scanning. A background task
//! consumes the adapter's event stream: advertisements refresh a last-seen
//! table that answers [`ShaverTransport::is_device_observable`], and
//! `DeviceDisconnected` events are routed to the disconnect callback of the
//! session that owns that peripheral.
//!
//! [`BleSession`] is one connected peripheral with its characteristics
//! cached after service discovery. Every GATT operation is bounded by a
//! timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::traits::{DisconnectCallback, GattSession, NotifyCallback, Presence, ShaverTransport};

/// Default timeout for reads, writes and (un)subscribes.
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an advertisement keeps a device observable.
const DEFAULT_ADVERTISEMENT_TTL: Duration = Duration::from_secs(120);

/// Format a peripheral ID as a string.
///
/// On macOS peripheral IDs are UUIDs; elsewhere they wrap the MAC address.
fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// The identifier a device is addressed by: its MAC address, or the
/// peripheral ID where the platform hides addresses (macOS reports zeros).
fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == "00:00:00:00:00:00" {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

fn normalize(address: &str) -> String {
    address.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone)]
struct Sighting {
    id: PeripheralId,
    presence: Presence,
    seen_at: Instant,
}

type Sightings = Arc<RwLock<HashMap<String, Sighting>>>;
type DisconnectHooks = Arc<RwLock<HashMap<PeripheralId, DisconnectCallback>>>;

/// Transport over the first local Bluetooth adapter.
pub struct BleTransport {
    adapter: Adapter,
    sightings: Sightings,
    hooks: DisconnectHooks,
    advertisement_ttl: Duration,
    operation_timeout: Duration,
    event_task: JoinHandle<()>,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("advertisement_ttl", &self.advertisement_ttl)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Open the first adapter, start scanning and begin tracking
    /// advertisements.
    #[tracing::instrument(level = "info")]
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager.adapters().await?.into_iter().next().ok_or_else(|| {
            Error::connection_failed(None, ConnectionFailureReason::AdapterUnavailable)
        })?;

        let events = adapter.events().await?;
        adapter.start_scan(ScanFilter::default()).await?;
        info!("Bluetooth adapter scanning");

        let sightings: Sightings = Arc::default();
        let hooks: DisconnectHooks = Arc::default();
        let event_task = tokio::spawn(track_adapter_events(
            adapter.clone(),
            events,
            Arc::clone(&sightings),
            Arc::clone(&hooks),
        ));

        Ok(Self {
            adapter,
            sightings,
            hooks,
            advertisement_ttl: DEFAULT_ADVERTISEMENT_TTL,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            event_task,
        })
    }

    /// Set how long one advertisement keeps a device observable.
    #[must_use]
    pub fn advertisement_ttl(mut self, ttl: Duration) -> Self {
        self.advertisement_ttl = ttl;
        self
    }

    /// Set the timeout for per-characteristic operations of new sessions.
    #[must_use]
    pub fn operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        let key = normalize(address);
        if let Some(sighting) = self.sightings.read().await.get(&key) {
            return Ok(self.adapter.peripheral(&sighting.id).await?);
        }

        for peripheral in self.adapter.peripherals().await? {
            let Some(properties) = peripheral.properties().await? else {
                continue;
            };
            let identifier = create_identifier(&properties.address.to_string(), &peripheral.id());
            if normalize(&identifier) == key {
                return Ok(peripheral);
            }
        }
        Err(Error::device_not_found(address))
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

async fn track_adapter_events(
    adapter: Adapter,
    mut events: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
    sightings: Sightings,
    hooks: DisconnectHooks,
) {
    while let Some(event) = events.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(properties)) = peripheral.properties().await else {
                    continue;
                };
                let address = create_identifier(&properties.address.to_string(), &id);
                let sighting = Sighting {
                    id,
                    presence: Presence {
                        rssi: properties.rssi,
                        name: properties.local_name,
                    },
                    seen_at: Instant::now(),
                };
                sightings.write().await.insert(normalize(&address), sighting);
            }
            CentralEvent::DeviceDisconnected(id) => {
                let hook = hooks.write().await.remove(&id);
                if let Some(on_disconnect) = hook {
                    debug!(peripheral = %format_peripheral_id(&id), "Remote disconnect");
                    on_disconnect();
                }
            }
            _ => {}
        }
    }
    warn!("Adapter event stream ended");
}

#[async_trait]
impl ShaverTransport for BleTransport {
    async fn is_device_observable(&self, address: &str) -> Option<Presence> {
        let sightings = self.sightings.read().await;
        let sighting = sightings.get(&normalize(address))?;
        (sighting.seen_at.elapsed() <= self.advertisement_ttl).then(|| sighting.presence.clone())
    }

    #[tracing::instrument(level = "info", skip(self, on_disconnect), fields(timeout_secs = connect_timeout.as_secs()))]
    async fn open_session(
        &self,
        address: &str,
        on_disconnect: DisconnectCallback,
        connect_timeout: Duration,
    ) -> Result<Arc<dyn GattSession>> {
        let peripheral = self.find_peripheral(address).await?;

        let started = Instant::now();
        timeout(connect_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect to device", connect_timeout))?
            .map_err(|e| {
                Error::connection_failed(
                    Some(address.to_string()),
                    ConnectionFailureReason::BleError(e.to_string()),
                )
            })?;
        debug!("Connected, discovering services");

        let remaining = connect_timeout.saturating_sub(started.elapsed());
        let discovered = timeout(remaining, peripheral.discover_services()).await;
        if let Err(e) = discovered
            .map_err(|_| Error::timeout("discover services", connect_timeout))
            .and_then(|r| r.map_err(Error::from))
        {
            let _ = peripheral.disconnect().await;
            return Err(e);
        }

        let services = peripheral.services();
        let mut characteristics = HashMap::new();
        for service in &services {
            for characteristic in &service.characteristics {
                characteristics.insert(characteristic.uuid, characteristic.clone());
            }
        }
        debug!(
            services = services.len(),
            characteristics = characteristics.len(),
            "Cached characteristics"
        );

        self.hooks
            .write()
            .await
            .insert(peripheral.id(), on_disconnect);

        info!("Session open");
        Ok(Arc::new(BleSession {
            address: address.to_string(),
            peripheral,
            service_count: services.len(),
            characteristics,
            operation_timeout: self.operation_timeout,
            routes: Arc::default(),
            router: tokio::sync::Mutex::new(None),
            hooks: Arc::clone(&self.hooks),
            disconnected: AtomicBool::new(false),
        }))
    }
}

type Routes = Arc<RwLock<HashMap<Uuid, NotifyCallback>>>;

/// One connected peripheral.
pub struct BleSession {
    address: String,
    peripheral: Peripheral,
    service_count: usize,
    characteristics: HashMap<Uuid, Characteristic>,
    operation_timeout: Duration,
    /// Notification callbacks by characteristic.
    routes: Routes,
    /// Task draining the peripheral's notification stream into `routes`.
    router: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    hooks: DisconnectHooks,
    disconnected: AtomicBool,
}

impl std::fmt::Debug for BleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleSession")
            .field("address", &self.address)
            .field("characteristics", &self.characteristics.len())
            .finish_non_exhaustive()
    }
}

impl BleSession {
    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic> {
        self.characteristics
            .get(&uuid)
            .ok_or_else(|| Error::characteristic_not_found(uuid.to_string(), self.service_count))
    }

    async fn bounded<T, F>(&self, operation: String, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, btleplug::Error>>,
    {
        timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| Error::timeout(operation, self.operation_timeout))?
            .map_err(Error::from)
    }

    /// Start the notification router on first use.
    async fn ensure_router(&self) -> Result<()> {
        let mut router = self.router.lock().await;
        if router.is_some() {
            return Ok(());
        }
        let mut stream = self.peripheral.notifications().await?;
        let routes = Arc::clone(&self.routes);
        *router = Some(tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if let Some(callback) = routes.read().await.get(&notification.uuid) {
                    callback(&notification.value);
                }
            }
        }));
        Ok(())
    }
}

#[async_trait]
impl GattSession for BleSession {
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let target = self.characteristic(characteristic)?;
        self.bounded(
            format!("read characteristic {characteristic}"),
            self.peripheral.read(target),
        )
        .await
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let target = self.characteristic(characteristic)?;
        self.bounded(
            format!("write characteristic {characteristic}"),
            self.peripheral.write(target, data, WriteType::WithResponse),
        )
        .await
    }

    async fn subscribe(&self, characteristic: Uuid, on_notify: NotifyCallback) -> Result<()> {
        let target = self.characteristic(characteristic)?;
        self.ensure_router().await?;
        self.routes.write().await.insert(characteristic, on_notify);
        let subscribed = self
            .bounded(
                format!("subscribe to {characteristic}"),
                self.peripheral.subscribe(target),
            )
            .await;
        if subscribed.is_err() {
            self.routes.write().await.remove(&characteristic);
        }
        subscribed
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        self.routes.write().await.remove(&characteristic);
        let target = self.characteristic(characteristic)?;
        self.bounded(
            format!("unsubscribe from {characteristic}"),
            self.peripheral.unsubscribe(target),
        )
        .await
    }

    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    async fn disconnect(&self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        self.hooks.write().await.remove(&self.peripheral.id());
        if let Some(router) = self.router.lock().await.take() {
            router.abort();
        }
        self.routes.write().await.clear();
        self.bounded("disconnect".to_string(), self.peripheral.disconnect())
            .await
    }

    async fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
            && self.peripheral.is_connected().await.unwrap_or(false)
    }
}

impl Drop for BleSession {
    fn drop(&mut self) {
        if let Ok(mut router) = self.router.try_lock()
            && let Some(handle) = router.take()
        {
            handle.abort();
        }
        if self.disconnected.load(Ordering::SeqCst) {
            return;
        }
        warn!(
            address = %self.address,
            "Session dropped without disconnect(), disconnecting in background"
        );
        let peripheral = self.peripheral.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(error = %e, "Best-effort disconnect failed");
                }
            });
        }
    }
}
