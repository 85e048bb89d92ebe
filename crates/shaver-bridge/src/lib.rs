//! Bridge Philips BLE shavers into a home-automation entity model.
//!
//! This crate provides a bridge that:
//! - Keeps one [`shaver_core::Coordinator`] per configured shaver
//! - Projects each device's snapshot into sensors, binary sensors, lights
//!   and a shaving mode select
//! - Streams entity state whenever it changes
//! - Forwards colour and shaving mode writes over the live session
//!
//! # Configuration
//!
//! The bridge reads configuration from `~/.config/shaver-bridge/config.toml`:
//!
//! ```toml
//! [timing]
//! connect_timeout = 15
//! keep_alive_interval = 30
//! staleness_window = 300
//!
//! [[devices]]
//! address = "AA:BB:CC:DD:EE:FF"
//! alias = "bathroom"
//! poll_interval = 60
//! enable_live_updates = true
//! capabilities = 0
//! ```

pub mod bridge;
pub mod config;
pub mod entities;

pub use bridge::{Bridge, BridgeDevice, BridgeError, project_coordinator, wait_until_live};
pub use config::{Config, ConfigError, DeviceConfig, TimingConfig, ValidationError};
pub use entities::{DeviceEntities, DeviceInfo, DeviceView, EntityKind, EntityState};
