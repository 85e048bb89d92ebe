//! Platform-agnostic types for Philips BLE shavers.
//!
//! This crate holds everything about the shaver that does not need a
//! Bluetooth stack: the characteristic UUIDs, the typed values they carry and
//! the pure decoders that turn raw payloads into those values.
//!
//! # Features
//!
//! - UUID constants for every known characteristic
//! - Typed device state, shaving mode, light ring colours and capabilities
//! - Bit-exact payload decoders that never panic
//! - Optional `serde` support (enabled by default)
//!
//! # Example
//!
//! ```
//! use shaver_types::{decode, DeviceState};
//!
//! assert_eq!(decode::device_state(&[0x02]), Some(DeviceState::Shaving));
//! assert_eq!(decode::motor_rpm(&[0xD0, 0x07]), Some(659));
//! ```

pub mod decode;
pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    Activity, Capabilities, Capability, DeviceState, LightZone, PressureRecord, PressureState,
    Rgb, SettingsRecord, ShavingMode, ShavingSettings,
};
pub use uuid as uuids;
