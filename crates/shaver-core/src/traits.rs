//! Transport abstractions for shaver sessions.
//!
//! The coordinator only talks to the device through these two traits. The
//! btleplug-backed [`BleTransport`](crate::device::BleTransport) is the real
//! implementation; [`MockTransport`](crate::mock::MockTransport) stands in
//! for it in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Callback invoked with the payload of every notification for one
/// characteristic. Runs on the transport's notification task and must not
/// block.
pub type NotifyCallback = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Callback invoked once when the remote side drops the link.
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// What the transport knows about a device from its advertisements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Presence {
    /// Signal strength of the last advertisement, in dBm.
    pub rssi: Option<i16>,
    /// Advertised local name.
    pub name: Option<String>,
}

/// Entry point of a BLE stack: advertisement lookup and session creation.
#[async_trait]
pub trait ShaverTransport: Send + Sync {
    /// Last-seen advertisement lookup. `None` when the device has not been
    /// heard from recently.
    async fn is_device_observable(&self, address: &str) -> Option<Presence>;

    /// Open a GATT session to the device.
    ///
    /// `on_disconnect` fires when the remote side drops the link after the
    /// session was opened. It is not called for [`GattSession::disconnect`].
    async fn open_session(
        &self,
        address: &str,
        on_disconnect: DisconnectCallback,
        timeout: Duration,
    ) -> Result<Arc<dyn GattSession>>;
}

/// One physical connection to a shaver.
#[async_trait]
pub trait GattSession: Send + Sync {
    // --- Data ---

    /// Read the current value of a characteristic.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Write a value to a characteristic (with response).
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    // --- Notifications ---

    /// Subscribe to notifications, replacing any previous callback for the
    /// same characteristic.
    async fn subscribe(&self, characteristic: Uuid, on_notify: NotifyCallback) -> Result<()>;

    /// Stop notifications for a characteristic.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;

    // --- Connection Management ---

    /// Close the link.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the link is still up.
    async fn is_connected(&self) -> bool;
}
