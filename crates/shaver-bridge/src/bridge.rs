//! Runs one coordinator per configured shaver and publishes entity state.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shaver_core::{Coordinator, LinkState, ShaverTransport};

use crate::config::{Config, ConfigError, DeviceConfig};
use crate::entities::{self, DeviceEntities, DeviceView};

/// Errors raised by the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] shaver_core::Error),
    #[error("No configured device matches '{0}'")]
    UnknownDevice(String),
    #[error("{count} devices configured, choose one with --device")]
    AmbiguousDevice { count: usize },
    #[error("No live session with {address} within {timeout:?}")]
    NotLive { address: String, timeout: Duration },
}

/// A configured device and its coordinator.
pub struct BridgeDevice {
    pub config: DeviceConfig,
    pub coordinator: Arc<Coordinator>,
}

impl BridgeDevice {
    /// Current entity state of this device.
    pub async fn entities(&self) -> DeviceEntities {
        project_coordinator(&self.coordinator, self.config.alias.as_deref()).await
    }
}

/// Owns the coordinators of every configured device.
pub struct Bridge {
    devices: Vec<BridgeDevice>,
    cancel: CancellationToken,
    publishers: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Create coordinators for every configured device. Nothing connects
    /// until [`Bridge::start`].
    pub fn new(config: &Config, transport: Arc<dyn ShaverTransport>) -> Result<Self, BridgeError> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors).into());
        }

        let devices = config
            .devices
            .iter()
            .map(|device| {
                let options = device.coordinator_options(&config.timing);
                let coordinator =
                    Coordinator::new(device.address.clone(), Arc::clone(&transport), options)?;
                Ok(BridgeDevice {
                    config: device.clone(),
                    coordinator: Arc::new(coordinator),
                })
            })
            .collect::<Result<Vec<_>, BridgeError>>()?;

        Ok(Self {
            devices,
            cancel: CancellationToken::new(),
            publishers: Mutex::new(Vec::new()),
        })
    }

    pub fn devices(&self) -> &[BridgeDevice] {
        &self.devices
    }

    /// Look a device up by address or alias. Without a key, the only
    /// configured device is returned.
    pub fn device(&self, key: Option<&str>) -> Result<&BridgeDevice, BridgeError> {
        match key {
            Some(key) => self
                .devices
                .iter()
                .find(|d| {
                    d.config.address.eq_ignore_ascii_case(key)
                        || d.config.alias.as_deref() == Some(key)
                })
                .ok_or_else(|| BridgeError::UnknownDevice(key.to_string())),
            None => match self.devices.as_slice() {
                [only] => Ok(only),
                [] => Err(BridgeError::UnknownDevice("<none configured>".to_string())),
                devices => Err(BridgeError::AmbiguousDevice {
                    count: devices.len(),
                }),
            },
        }
    }

    /// Start every coordinator.
    pub async fn start(&self) {
        if self.devices.is_empty() {
            info!("No devices configured");
            return;
        }
        info!("Starting bridge for {} device(s)", self.devices.len());
        for device in &self.devices {
            info!(
                "Starting {} (alias: {}, poll interval: {}s, live updates: {})",
                device.config.address,
                device.config.alias.as_deref().unwrap_or("-"),
                device.config.poll_interval,
                device.config.enable_live_updates
            );
            device.coordinator.start().await;
        }
    }

    /// Stream entity state. Each device's entities are sent whenever its
    /// snapshot or link state changes and the projection differs from the
    /// last one sent. The stream ends on [`Bridge::shutdown`].
    pub async fn publish(&self) -> mpsc::Receiver<DeviceEntities> {
        let (tx, rx) = mpsc::channel(64);
        let mut publishers = self.publishers.lock().await;
        for device in &self.devices {
            publishers.push(tokio::spawn(publish_device(
                Arc::clone(&device.coordinator),
                device.config.alias.clone(),
                tx.clone(),
                self.cancel.child_token(),
            )));
        }
        rx
    }

    /// Stop publishing and shut every coordinator down.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let publishers: Vec<_> = self.publishers.lock().await.drain(..).collect();
        for handle in publishers {
            let _ = handle.await;
        }
        join_all(self.devices.iter().map(|d| d.coordinator.shutdown())).await;
        info!("Bridge stopped");
    }
}

/// Project a coordinator's current state.
pub async fn project_coordinator(coordinator: &Coordinator, alias: Option<&str>) -> DeviceEntities {
    let now = Instant::now();
    let snapshot = coordinator.snapshot();
    let view = DeviceView {
        address: coordinator.address(),
        alias,
        snapshot: &snapshot,
        capabilities: coordinator.capabilities(),
        available: coordinator.is_available(now).await,
        since_last_contact: coordinator
            .last_contact()
            .map(|at| now.saturating_duration_since(at)),
    };
    entities::project(&view)
}

/// Wait until the coordinator holds a live session.
pub async fn wait_until_live(coordinator: &Coordinator, limit: Duration) -> Result<(), BridgeError> {
    let mut link = coordinator.watch_link_state();
    match timeout(limit, link.wait_for(|s| *s == LinkState::LiveActive)).await {
        Ok(Ok(_)) => Ok(()),
        _ => Err(BridgeError::NotLive {
            address: coordinator.address().to_string(),
            timeout: limit,
        }),
    }
}

/// Margin past the staleness window before availability is re-read.
const STALENESS_SLACK: Duration = Duration::from_secs(1);

async fn publish_device(
    coordinator: Arc<Coordinator>,
    alias: Option<String>,
    tx: mpsc::Sender<DeviceEntities>,
    cancel: CancellationToken,
) {
    let mut snapshots = coordinator.subscribe();
    let mut link = coordinator.watch_link_state();
    let mut last: Option<DeviceEntities> = None;

    loop {
        let entities = project_coordinator(&coordinator, alias.as_deref()).await;
        if last.as_ref() != Some(&entities) {
            debug!("Publishing {} entities for {}", entities.entities.len(), coordinator.address());
            if tx.send(entities.clone()).await.is_err() {
                debug!("Entity receiver for {} dropped", coordinator.address());
                return;
            }
            last = Some(entities);
        }

        // Availability lapses without any channel changing.
        let stale_at = coordinator
            .last_contact()
            .map(|at| at + coordinator.options().staleness_window + STALENESS_SLACK)
            .filter(|deadline| *deadline > Instant::now());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("Snapshot channel for {} closed", coordinator.address());
                    return;
                }
            }
            changed = link.changed() => {
                if changed.is_err() {
                    warn!("Link state channel for {} closed", coordinator.address());
                    return;
                }
            }
            _ = tokio::time::sleep_until(stale_at.unwrap_or_else(Instant::now)), if stale_at.is_some() => {
                debug!("Staleness window for {} elapsed", coordinator.address());
            }
        }
    }
}
