//! Core types for Philips shaver state.
//!
//! These types are transport-independent: they describe what a decoded
//! characteristic means, not how it was obtained.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Empirical divisor that turns the raw motor value into revolutions per minute.
pub const MOTOR_RPM_DIVISOR: f64 = 3.036;

/// Operating state reported by the shaver.
///
/// # Examples
///
/// ```
/// use shaver_types::DeviceState;
///
/// assert_eq!(DeviceState::from(2), DeviceState::Shaving);
/// assert_eq!(DeviceState::from(9), DeviceState::Unknown);
/// assert_eq!(DeviceState::Charging.to_string(), "charging");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DeviceState {
    /// Switched off.
    Off,
    /// Motor running.
    Shaving,
    /// On the charger.
    Charging,
    /// Any value the firmware reports that is not one of the above.
    Unknown,
}

impl DeviceState {
    /// Host-facing name of the state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Off => "off",
            DeviceState::Shaving => "shaving",
            DeviceState::Charging => "charging",
            DeviceState::Unknown => "unknown",
        }
    }
}

impl From<u8> for DeviceState {
    fn from(value: u8) -> Self {
        match value {
            1 => DeviceState::Off,
            2 => DeviceState::Shaving,
            3 => DeviceState::Charging,
            _ => DeviceState::Unknown,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shaving mode selected on the device.
///
/// Only the first five modes can be written. `BatterySaving` is reported by
/// some firmware but cannot be selected remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ShavingMode {
    Sensitive,
    Regular,
    Intense,
    Custom,
    Foam,
    BatterySaving,
    Unknown,
}

impl ShavingMode {
    /// Modes that can be selected through a write, in wire order.
    pub const WRITABLE: [ShavingMode; 5] = [
        ShavingMode::Sensitive,
        ShavingMode::Regular,
        ShavingMode::Intense,
        ShavingMode::Custom,
        ShavingMode::Foam,
    ];

    /// Map a decoded integer to a mode.
    #[must_use]
    pub fn from_value(value: u64) -> Self {
        match value {
            0 => ShavingMode::Sensitive,
            1 => ShavingMode::Regular,
            2 => ShavingMode::Intense,
            3 => ShavingMode::Custom,
            4 => ShavingMode::Foam,
            5 => ShavingMode::BatterySaving,
            _ => ShavingMode::Unknown,
        }
    }

    /// The single byte written to select this mode.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::NotWritable`] for `BatterySaving` and `Unknown`.
    pub fn write_value(self) -> ParseResult<u8> {
        match self {
            ShavingMode::Sensitive => Ok(0x00),
            ShavingMode::Regular => Ok(0x01),
            ShavingMode::Intense => Ok(0x02),
            ShavingMode::Custom => Ok(0x03),
            ShavingMode::Foam => Ok(0x04),
            other => Err(ParseError::NotWritable(other.to_string())),
        }
    }

    /// Host-facing name of the mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ShavingMode::Sensitive => "sensitive",
            ShavingMode::Regular => "regular",
            ShavingMode::Intense => "intense",
            ShavingMode::Custom => "custom",
            ShavingMode::Foam => "foam",
            ShavingMode::BatterySaving => "battery_saving",
            ShavingMode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ShavingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShavingMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sensitive" => Ok(ShavingMode::Sensitive),
            "regular" => Ok(ShavingMode::Regular),
            "intense" => Ok(ShavingMode::Intense),
            "custom" => Ok(ShavingMode::Custom),
            "foam" => Ok(ShavingMode::Foam),
            "battery_saving" => Ok(ShavingMode::BatterySaving),
            other => Err(ParseError::UnknownValue(other.to_string())),
        }
    }
}

/// An RGB colour as used by the light ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Create a colour from its components.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Wire payload for a colour write. Alpha is always `0xFF`.
    #[must_use]
    pub const fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 0xFF]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = ParseError;

    /// Accepts `r,g,b` decimal triples or `#rrggbb`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ParseError::UnknownValue(s.to_string());

        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(invalid());
            }
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
            return Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?));
        }

        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u8>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
            _ => Err(invalid()),
        }
    }
}

/// Light ring zone, one colour characteristic each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LightZone {
    /// Shown while pressure is too low.
    Low,
    /// Shown while pressure is in range.
    Ok,
    /// Shown while pressure is too high.
    High,
    /// Motion feedback.
    Motion,
}

impl LightZone {
    pub const ALL: [LightZone; 4] = [
        LightZone::Low,
        LightZone::Ok,
        LightZone::High,
        LightZone::Motion,
    ];

    /// The colour characteristic for this zone.
    #[must_use]
    pub fn characteristic(&self) -> uuid::Uuid {
        match self {
            LightZone::Low => crate::uuid::LIGHTRING_COLOR_LOW,
            LightZone::Ok => crate::uuid::LIGHTRING_COLOR_OK,
            LightZone::High => crate::uuid::LIGHTRING_COLOR_HIGH,
            LightZone::Motion => crate::uuid::LIGHTRING_COLOR_MOTION,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LightZone::Low => "low",
            LightZone::Ok => "ok",
            LightZone::High => "high",
            LightZone::Motion => "motion",
        }
    }
}

impl fmt::Display for LightZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LightZone {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(LightZone::Low),
            "ok" => Ok(LightZone::Ok),
            "high" => Ok(LightZone::High),
            "motion" => Ok(LightZone::Motion),
            other => Err(ParseError::UnknownValue(other.to_string())),
        }
    }
}

/// Length in bytes of a shaving mode settings payload.
pub const SHAVING_SETTINGS_LEN: usize = 10;

/// Decoded shaving mode settings.
///
/// The payload is five little-endian `u16` values. The pressure thresholds
/// drive the light ring feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShavingSettings {
    /// Motor speed as stored by the device.
    pub raw_motor_value: u16,
    /// Pressure reading with no skin contact.
    pub pressure_base_value: u16,
    /// Lower bound of the "ok" pressure band.
    pub pressure_limit_low: u16,
    /// Upper bound of the "ok" pressure band.
    pub pressure_limit_high: u16,
    /// Feedback analysis window.
    pub feedback_analysis_window: u16,
    /// `raw_motor_value / 3.036`, rounded.
    pub custom_motor_rpm: u32,
}

/// Result of decoding a settings characteristic.
///
/// A wrong-length payload is kept as an explicit error record rather than
/// dropped, so the host sees that the device answered with something odd.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SettingsRecord {
    Settings(ShavingSettings),
    Error { error: String },
}

impl SettingsRecord {
    /// The decoded settings, if the payload was well formed.
    #[must_use]
    pub fn settings(&self) -> Option<&ShavingSettings> {
        match self {
            SettingsRecord::Settings(s) => Some(s),
            SettingsRecord::Error { .. } => None,
        }
    }
}

/// One optional feature a shaver may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum Capability {
    Motion = 0,
    Brush = 1,
    MotionSpeed = 2,
    Pressure = 3,
    UnitCleaning = 4,
    CleaningMode = 5,
    LightRing = 6,
}

impl Capability {
    /// Bit mask of this capability in the capability value.
    #[must_use]
    pub const fn mask(self) -> u32 {
        1 << (self as u8)
    }
}

/// Set of optional features, decoded from the capability bitmask.
///
/// # Examples
///
/// ```
/// use shaver_types::{Capabilities, Capability};
///
/// let caps = Capabilities::from_bits(0b000_1001);
/// assert!(caps.motion);
/// assert!(caps.pressure);
/// assert!(!caps.supports(Capability::LightRing));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capabilities {
    pub motion: bool,
    pub brush: bool,
    pub motion_speed: bool,
    pub pressure: bool,
    pub unit_cleaning: bool,
    pub cleaning_mode: bool,
    pub light_ring: bool,
}

impl Capabilities {
    /// Decode from the raw bitmask. Bits above 6 are ignored.
    #[must_use]
    pub fn from_bits(bits: u64) -> Self {
        let has = |cap: Capability| bits & u64::from(cap.mask()) != 0;
        Self {
            motion: has(Capability::Motion),
            brush: has(Capability::Brush),
            motion_speed: has(Capability::MotionSpeed),
            pressure: has(Capability::Pressure),
            unit_cleaning: has(Capability::UnitCleaning),
            cleaning_mode: has(Capability::CleaningMode),
            light_ring: has(Capability::LightRing),
        }
    }

    /// Encode back to the bitmask, e.g. for storing in configuration.
    #[must_use]
    pub fn bits(&self) -> u32 {
        [
            (self.motion, Capability::Motion),
            (self.brush, Capability::Brush),
            (self.motion_speed, Capability::MotionSpeed),
            (self.pressure, Capability::Pressure),
            (self.unit_cleaning, Capability::UnitCleaning),
            (self.cleaning_mode, Capability::CleaningMode),
            (self.light_ring, Capability::LightRing),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |acc, (_, cap)| acc | cap.mask())
    }

    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Motion => self.motion,
            Capability::Brush => self.brush,
            Capability::MotionSpeed => self.motion_speed,
            Capability::Pressure => self.pressure,
            Capability::UnitCleaning => self.unit_cleaning,
            Capability::CleaningMode => self.cleaning_mode,
            Capability::LightRing => self.light_ring,
        }
    }
}

/// Size of one pressure history block.
pub const PRESSURE_RECORD_LEN: usize = 15;

/// One block of pressure history.
///
/// The block layout is reverse-engineered; only the byte contract
/// (`u8`, four `u16`, one `u32`, little-endian) is known. Those fields fill
/// the first 13 bytes of each 15-byte block, the last two are not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PressureRecord {
    /// Record type byte.
    pub kind: u8,
    pub values: [u16; 4],
    /// Device-relative time of the record.
    pub timestamp: u32,
}

/// Pressure feedback band, derived from the current pressure and the active
/// shaving settings thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PressureState {
    Low,
    Ok,
    High,
}

impl PressureState {
    /// Classify a pressure reading against the settings thresholds.
    #[must_use]
    pub fn classify(pressure: u64, settings: &ShavingSettings) -> Self {
        if pressure < u64::from(settings.pressure_limit_low) {
            PressureState::Low
        } else if pressure > u64::from(settings.pressure_limit_high) {
            PressureState::High
        } else {
            PressureState::Ok
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureState::Low => "low",
            PressureState::Ok => "ok",
            PressureState::High => "high",
        }
    }
}

impl fmt::Display for PressureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High-level activity shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Activity {
    Off,
    Shaving,
    Charging,
    Cleaning,
    Locked,
}

impl Activity {
    /// Derive the activity. Travel lock wins over a running cleaning cycle,
    /// which wins over the device state.
    #[must_use]
    pub fn derive(
        travel_lock: Option<bool>,
        cleaning_progress: Option<u8>,
        device_state: Option<DeviceState>,
    ) -> Self {
        if travel_lock == Some(true) {
            return Activity::Locked;
        }
        if matches!(cleaning_progress, Some(p) if p > 0 && p < 100) {
            return Activity::Cleaning;
        }
        match device_state {
            Some(DeviceState::Shaving) => Activity::Shaving,
            Some(DeviceState::Charging) => Activity::Charging,
            _ => Activity::Off,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Off => "off",
            Activity::Shaving => "shaving",
            Activity::Charging => "charging",
            Activity::Cleaning => "cleaning",
            Activity::Locked => "locked",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_state_from_u8() {
        assert_eq!(DeviceState::from(1), DeviceState::Off);
        assert_eq!(DeviceState::from(2), DeviceState::Shaving);
        assert_eq!(DeviceState::from(3), DeviceState::Charging);
        assert_eq!(DeviceState::from(0), DeviceState::Unknown);
        assert_eq!(DeviceState::from(9), DeviceState::Unknown);
    }

    #[test]
    fn test_shaving_mode_write_values() {
        let bytes: Vec<u8> = ShavingMode::WRITABLE
            .iter()
            .map(|m| m.write_value().unwrap())
            .collect();
        assert_eq!(bytes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shaving_mode_read_only_values() {
        assert!(matches!(
            ShavingMode::BatterySaving.write_value(),
            Err(ParseError::NotWritable(_))
        ));
        assert!(ShavingMode::Unknown.write_value().is_err());
        assert_eq!(ShavingMode::from_value(5), ShavingMode::BatterySaving);
        assert_eq!(ShavingMode::from_value(42), ShavingMode::Unknown);
    }

    #[test]
    fn test_shaving_mode_from_str() {
        assert_eq!("Foam".parse::<ShavingMode>().unwrap(), ShavingMode::Foam);
        assert!("turbo".parse::<ShavingMode>().is_err());
    }

    #[test]
    fn test_rgb_to_rgba() {
        assert_eq!(Rgb::new(55, 255, 0).to_rgba(), [0x37, 0xFF, 0x00, 0xFF]);
    }

    #[test]
    fn test_rgb_from_str() {
        assert_eq!("55,255,0".parse::<Rgb>().unwrap(), Rgb::new(55, 255, 0));
        assert_eq!("#37ff00".parse::<Rgb>().unwrap(), Rgb::new(55, 255, 0));
        assert!("1,2".parse::<Rgb>().is_err());
        assert!("256,0,0".parse::<Rgb>().is_err());
        assert!("#12345".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_capabilities_bits_round_trip() {
        let caps = Capabilities::from_bits(0b100_0101);
        assert!(caps.motion);
        assert!(caps.motion_speed);
        assert!(caps.light_ring);
        assert!(!caps.pressure);
        assert_eq!(caps.bits(), 0b100_0101);
    }

    #[test]
    fn test_capabilities_ignore_high_bits() {
        assert_eq!(Capabilities::from_bits(0xFF80), Capabilities::default());
    }

    #[test]
    fn test_pressure_state_classify() {
        let settings = ShavingSettings {
            raw_motor_value: 2000,
            pressure_base_value: 0,
            pressure_limit_low: 1536,
            pressure_limit_high: 4000,
            feedback_analysis_window: 0,
            custom_motor_rpm: 659,
        };
        assert_eq!(PressureState::classify(100, &settings), PressureState::Low);
        assert_eq!(PressureState::classify(1536, &settings), PressureState::Ok);
        assert_eq!(PressureState::classify(4000, &settings), PressureState::Ok);
        assert_eq!(PressureState::classify(4001, &settings), PressureState::High);
    }

    #[test]
    fn test_activity_priority() {
        use Activity::*;
        assert_eq!(
            Activity::derive(Some(true), Some(50), Some(DeviceState::Shaving)),
            Locked
        );
        assert_eq!(
            Activity::derive(Some(false), Some(50), Some(DeviceState::Shaving)),
            Cleaning
        );
        assert_eq!(
            Activity::derive(None, Some(100), Some(DeviceState::Shaving)),
            Shaving
        );
        assert_eq!(
            Activity::derive(None, Some(0), Some(DeviceState::Charging)),
            Charging
        );
        assert_eq!(Activity::derive(None, None, Some(DeviceState::Unknown)), Off);
        assert_eq!(Activity::derive(None, None, None), Off);
    }

    #[test]
    fn test_light_zone_characteristics() {
        assert_eq!(
            LightZone::Motion.characteristic(),
            crate::uuid::LIGHTRING_COLOR_MOTION
        );
        assert_eq!("OK".parse::<LightZone>().unwrap(), LightZone::Ok);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_settings_error_record_serialization() {
        let record = SettingsRecord::Error {
            error: "Invalid data length".to_string(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"error":"Invalid data length"}"#);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_enum_serialization_names() {
        assert_eq!(
            serde_json::to_string(&ShavingMode::BatterySaving).unwrap(),
            "\"battery_saving\""
        );
        assert_eq!(
            serde_json::to_string(&DeviceState::Charging).unwrap(),
            "\"charging\""
        );
    }
}
