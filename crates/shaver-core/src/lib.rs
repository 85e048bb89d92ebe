//! Connection coordinator and BLE transport for Philips shavers.
//!
//! This crate keeps one shaver's state current over Bluetooth Low Energy. A
//! [`Coordinator`] holds a live, notification-driven session whenever it can
//! and falls back to periodic connect-read-disconnect polls when it cannot.
//! Everything it reads lands in a [`Snapshot`] that consumers read without
//! blocking and can watch for changes.
//!
//! # Features
//!
//! - **Live sessions**: bulk read, then GATT notifications per characteristic
//! - **Polling fallback**: skipped while live data is flowing
//! - **Backoff**: 5 s floor, doubling to a 300 s ceiling
//! - **Capability gate**: optional features enabled from the device's bitmask
//! - **Writes**: light ring colours and shaving mode over the live session
//! - **Mock transport**: scripted device for tests without hardware
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use shaver_core::{BleTransport, Coordinator, CoordinatorOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BleTransport::new().await?);
//!     let coordinator = Coordinator::new("AA:BB:CC:DD:EE:FF", transport, CoordinatorOptions::default())?;
//!     coordinator.start().await;
//!
//!     let mut updates = coordinator.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let snapshot = updates.borrow_and_update().clone();
//!         println!("battery: {:?}", snapshot.battery());
//!     }
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod device;
pub mod error;
pub mod events;
pub mod lease;
pub mod mock;
pub mod reconnect;
pub mod snapshot;
pub mod table;
pub mod traits;

// Core exports
pub use coordinator::{
    Coordinator, CoordinatorOptions, DEFAULT_POLL_INTERVAL, LinkState, MAX_POLL_INTERVAL,
    MIN_POLL_INTERVAL, NotificationHandler, PollOutcome,
};
pub use device::{BleSession, BleTransport};
pub use error::{ConnectionFailureReason, Error, Result};
pub use events::{DeviceEvent, DisconnectReason, EventReceiver, EventSender, PollSkipReason};
pub use lease::{ConnectionLease, LeaseGuard};
pub use mock::{MockSession, MockTransport, MockTransportBuilder};
pub use reconnect::{Backoff, BackoffOptions};
pub use snapshot::{Field, FieldUpdates, FieldValue, Snapshot, SnapshotStore};
pub use table::{Access, CharacteristicSpec};
pub use traits::{DisconnectCallback, GattSession, NotifyCallback, Presence, ShaverTransport};

// Re-export from shaver-types
pub use shaver_types::uuid as uuids;
pub use shaver_types::{
    Activity, Capabilities, Capability, DeviceState, LightZone, PressureState, Rgb,
    SettingsRecord, ShavingMode, ShavingSettings,
};
