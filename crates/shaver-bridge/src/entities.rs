//! Entity projection.
//!
//! Turns a [`Snapshot`] into the flat list of sensors, binary sensors, lights
//! and selects a home-automation host displays. Every entity is computed
//! from the snapshot on demand; nothing here keeps state between calls.
//! Entities for optional features only appear when the device's
//! capabilities include them.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;

use shaver_core::{
    Activity, Capabilities, DeviceState, Field, LightZone, PressureState, Rgb, ShavingMode,
    Snapshot,
};

/// Manufacturer reported for every device.
pub const MANUFACTURER: &str = "Philips";

/// Model reported before the model number characteristic has been read.
pub const DEFAULT_MODEL: &str = "i9000 / XP9201";

/// Colour shown for a light zone whose colour has not been read yet.
pub const DEFAULT_LIGHT_COLOR: Rgb = Rgb::new(0xFF, 0x00, 0x00);

/// Kind of host entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Sensor,
    BinarySensor,
    Light,
    Select,
}

/// Current state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    /// Stable id, `<address>_<key>`.
    pub unique_id: String,
    pub key: String,
    pub kind: EntityKind,
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub available: bool,
    /// Selectable values, for selects only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<&'static str>>,
}

/// Identity of the physical device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: String,
    pub sw_version: Option<String>,
    pub serial_number: Option<String>,
}

impl DeviceInfo {
    /// Build device info. The name prefers the alias, then the model number,
    /// then a generated name from the address tail.
    pub fn new(address: &str, alias: Option<&str>, snapshot: &Snapshot) -> Self {
        let model_number = snapshot.text(Field::ModelNumber).map(str::to_string);
        let name = alias
            .map(str::to_string)
            .or_else(|| model_number.clone())
            .unwrap_or_else(|| fallback_name(address));

        Self {
            identifier: address.to_string(),
            name,
            manufacturer: MANUFACTURER,
            model: model_number.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            sw_version: snapshot.text(Field::Firmware).map(str::to_string),
            serial_number: snapshot.text(Field::SerialNumber).map(str::to_string),
        }
    }
}

/// "Philips Shaver EEFF" for `AA:BB:CC:DD:EE:FF`.
pub fn fallback_name(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(5)..]
        .iter()
        .filter(|c| **c != ':')
        .collect();
    format!("Philips Shaver {}", tail.to_uppercase())
}

/// Everything the projection reads for one device.
#[derive(Debug, Clone, Copy)]
pub struct DeviceView<'a> {
    pub address: &'a str,
    pub alias: Option<&'a str>,
    pub snapshot: &'a Snapshot,
    /// `None` until the capabilities are known; treated as "nothing optional".
    pub capabilities: Option<Capabilities>,
    /// Whether the coordinator considers the device reachable.
    pub available: bool,
    /// Time since the device last delivered data.
    pub since_last_contact: Option<Duration>,
}

/// All entities of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEntities {
    pub device: DeviceInfo,
    pub available: bool,
    /// RFC 3339 time of the last snapshot change.
    pub updated_at: Option<String>,
    pub entities: Vec<EntityState>,
}

impl DeviceEntities {
    pub fn get(&self, key: &str) -> Option<&EntityState> {
        self.entities.iter().find(|e| e.key == key)
    }
}

/// Project a device view into host entities.
pub fn project(view: &DeviceView<'_>) -> DeviceEntities {
    let caps = view.capabilities.unwrap_or_default();
    let snapshot = view.snapshot;
    let mut out = Projection::new(view);

    let state = snapshot.device_state();
    let battery = snapshot.battery();
    out.sensor("battery", battery.map(Value::from), Some("%"))
        .icon(battery_icon(battery, state));
    out.raw_sensor("head_remaining", Field::HeadRemaining, Some("%"));
    out.raw_sensor("days_since_last_used", Field::DaysSinceLastUsed, Some("d"));
    out.raw_sensor("shaving_time", Field::ShavingTime, Some("s"));

    let rpm = snapshot.uint(Field::MotorRpm);
    out.sensor("motor_rpm", rpm.map(Value::from), Some("rpm"))
        .icon(motor_rpm_icon(rpm).to_string());
    out.raw_sensor("motor_current", Field::MotorCurrentMa, Some("mA"));
    out.raw_sensor("motor_current_max", Field::MotorCurrentMaxMa, Some("mA"));
    out.raw_sensor("amount_of_charges", Field::AmountOfCharges, None);
    out.raw_sensor("amount_of_operational_turns", Field::AmountOfOperationalTurns, None);
    out.raw_sensor("total_age", Field::TotalAge, Some("s"));

    if caps.unit_cleaning {
        let progress = snapshot.cleaning_progress();
        let entity = out
            .sensor("cleaning_progress", progress.map(Value::from), Some("%"))
            .icon(cleaning_progress_icon(progress).to_string());
        entity.available &= matches!(progress, Some(p) if p > 0);
        out.raw_sensor("cleaning_cycles", Field::CleaningCycles, None);
    }

    if caps.pressure {
        let pressure = snapshot.uint(Field::Pressure);
        out.sensor("pressure", pressure.map(Value::from), None);
        let band = pressure
            .zip(snapshot.shaving_settings())
            .map(|(p, settings)| PressureState::classify(p, settings));
        out.sensor("pressure_state", band.map(|b| Value::from(b.as_str())), None);
    }

    out.raw_sensor("shaving_mode_settings", Field::ShavingSettings, None);
    out.raw_sensor("firmware", Field::Firmware, None);
    out.raw_sensor("model_number", Field::ModelNumber, None);
    out.raw_sensor("serial_number", Field::SerialNumber, None);
    out.sensor("device_state", state.map(|s| Value::from(s.as_str())), None)
        .icon(device_state_icon(state).to_string());

    let activity = Activity::derive(snapshot.travel_lock(), snapshot.cleaning_progress(), state);
    out.sensor("activity", Some(Value::from(activity.as_str())), None)
        .icon(activity_icon(activity).to_string());

    let minutes = view.since_last_contact.map(|age| age.as_secs() / 60);
    out.sensor("last_seen", minutes.map(Value::from), Some("min"));

    // Binary sensors
    let charging = state.map(|s| s == DeviceState::Charging);
    out.push(EntityKind::BinarySensor, "charging", charging.map(Value::from));
    out.push(
        EntityKind::BinarySensor,
        "travel_lock",
        Some(Value::from(snapshot.travel_lock().unwrap_or(false))),
    )
    .icon("mdi:lock".to_string());

    if caps.light_ring {
        let brightness = snapshot.percentage(Field::LightRingBrightness);
        for zone in LightZone::ALL {
            let color = snapshot.color(zone).unwrap_or(DEFAULT_LIGHT_COLOR);
            let value = json!({
                "on": true,
                "rgb": [color.r, color.g, color.b],
                "brightness": brightness,
            });
            out.push(EntityKind::Light, &format!("light_ring_{}", zone), Some(value));
        }
    }

    let current = snapshot
        .shaving_mode()
        .filter(|mode| ShavingMode::WRITABLE.contains(mode));
    let select = out.push(
        EntityKind::Select,
        "shaving_mode",
        current.map(|m| Value::from(m.as_str())),
    );
    select.options = Some(ShavingMode::WRITABLE.iter().map(|m| m.as_str()).collect());

    DeviceEntities {
        device: DeviceInfo::new(view.address, view.alias, snapshot),
        available: view.available,
        updated_at: snapshot.captured_at().and_then(|t| t.format(&Rfc3339).ok()),
        entities: out.entities,
    }
}

struct Projection<'v, 'a> {
    view: &'v DeviceView<'a>,
    entities: Vec<EntityState>,
}

impl<'v, 'a> Projection<'v, 'a> {
    fn new(view: &'v DeviceView<'a>) -> Self {
        Self {
            view,
            entities: Vec::new(),
        }
    }

    fn push(&mut self, kind: EntityKind, key: &str, value: Option<Value>) -> &mut EntityState {
        let available = self.view.available && value.is_some();
        self.entities.push(EntityState {
            unique_id: format!("{}_{}", self.view.address, key),
            key: key.to_string(),
            kind,
            value,
            unit: None,
            icon: None,
            available,
            options: None,
        });
        let last = self.entities.len() - 1;
        &mut self.entities[last]
    }

    fn sensor(
        &mut self,
        key: &str,
        value: Option<Value>,
        unit: Option<&'static str>,
    ) -> &mut EntityState {
        let entity = self.push(EntityKind::Sensor, key, value);
        entity.unit = unit;
        entity
    }

    /// A sensor showing a snapshot field as decoded.
    fn raw_sensor(
        &mut self,
        key: &str,
        field: Field,
        unit: Option<&'static str>,
    ) -> &mut EntityState {
        let value = self
            .view
            .snapshot
            .get(field)
            .and_then(|v| serde_json::to_value(v).ok());
        self.sensor(key, value, unit)
    }
}

impl EntityState {
    fn icon(&mut self, icon: String) -> &mut Self {
        self.icon = Some(icon);
        self
    }
}

/// Battery icon for a level and device state.
///
/// Levels are bucketed up to the next ten, capped at 90 below a full charge.
/// Levels at or below 10 use the outline variant.
pub fn battery_icon(level: Option<u8>, state: Option<DeviceState>) -> String {
    let charging = state == Some(DeviceState::Charging);
    let Some(level) = level else {
        return if charging {
            "mdi:battery-charging-unknown".to_string()
        } else {
            "mdi:battery-unknown".to_string()
        };
    };
    if state == Some(DeviceState::Shaving) {
        return "mdi:battery-alert-bluetooth".to_string();
    }

    let base = if charging { "mdi:battery-charging" } else { "mdi:battery" };
    if level >= 100 {
        return base.to_string();
    }
    if level <= 10 {
        return format!("{base}-10-outline");
    }
    let bucket = (((level - 1) / 10) * 10 + 10).min(90);
    format!("{base}-{bucket}")
}

fn motor_rpm_icon(rpm: Option<u64>) -> &'static str {
    match rpm {
        None | Some(0..3000) => "mdi:speedometer-slow",
        Some(3000..6000) => "mdi:speedometer-medium",
        Some(_) => "mdi:speedometer",
    }
}

fn cleaning_progress_icon(progress: Option<u8>) -> &'static str {
    match progress.unwrap_or(0) {
        0 => "mdi:progress-clock",
        100.. => "mdi:check-circle-outline",
        _ => "mdi:progress-wrench",
    }
}

fn device_state_icon(state: Option<DeviceState>) -> &'static str {
    match state {
        Some(DeviceState::Off) => "mdi:power-standby",
        Some(DeviceState::Shaving) => "mdi:face-man-shimmer",
        Some(DeviceState::Charging) => "mdi:battery-charging-100",
        _ => "mdi:help-circle-outline",
    }
}

fn activity_icon(activity: Activity) -> &'static str {
    match activity {
        Activity::Off => "mdi:power-standby",
        Activity::Shaving => "mdi:face-man-shimmer",
        Activity::Charging => "mdi:battery-charging-outline",
        Activity::Cleaning => "mdi:shimmer",
        Activity::Locked => "mdi:lock",
    }
}
