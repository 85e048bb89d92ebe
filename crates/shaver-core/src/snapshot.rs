//! Device state snapshot with sticky last-known values.
//!
//! A [`Snapshot`] maps each [`Field`] to the last value decoded for it. Merges
//! only overwrite fields present in the update, so a failed or empty read
//! never erases a known value. [`SnapshotStore`] publishes whole snapshots
//! through a `watch` channel: readers never see a half-applied merge, and a
//! merge that changes nothing wakes nobody.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::Instant;

use shaver_types::{DeviceState, LightZone, Rgb, SettingsRecord, ShavingMode, ShavingSettings};

/// Semantic name of one snapshot field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Battery,
    Firmware,
    ModelNumber,
    SerialNumber,
    HeadRemaining,
    DaysSinceLastUsed,
    ShavingTime,
    DeviceState,
    TravelLock,
    CleaningProgress,
    CleaningCycles,
    MotorRpm,
    MotorCurrentMa,
    MotorCurrentMaxMa,
    AmountOfCharges,
    AmountOfOperationalTurns,
    ShavingMode,
    ShavingModeValue,
    ShavingSettings,
    CustomShavingSettings,
    Pressure,
    TotalAge,
    ColorLow,
    ColorOk,
    ColorHigh,
    ColorMotion,
    LightRingBrightness,
    Capabilities,
}

impl Field {
    /// Host-facing key of the field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Battery => "battery",
            Field::Firmware => "firmware",
            Field::ModelNumber => "model_number",
            Field::SerialNumber => "serial_number",
            Field::HeadRemaining => "head_remaining",
            Field::DaysSinceLastUsed => "days_since_last_used",
            Field::ShavingTime => "shaving_time",
            Field::DeviceState => "device_state",
            Field::TravelLock => "travel_lock",
            Field::CleaningProgress => "cleaning_progress",
            Field::CleaningCycles => "cleaning_cycles",
            Field::MotorRpm => "motor_rpm",
            Field::MotorCurrentMa => "motor_current_ma",
            Field::MotorCurrentMaxMa => "motor_current_max_ma",
            Field::AmountOfCharges => "amount_of_charges",
            Field::AmountOfOperationalTurns => "amount_of_operational_turns",
            Field::ShavingMode => "shaving_mode",
            Field::ShavingModeValue => "shaving_mode_value",
            Field::ShavingSettings => "shaving_settings",
            Field::CustomShavingSettings => "custom_shaving_settings",
            Field::Pressure => "pressure",
            Field::TotalAge => "total_age",
            Field::ColorLow => "color_low",
            Field::ColorOk => "color_ok",
            Field::ColorHigh => "color_high",
            Field::ColorMotion => "color_motion",
            Field::LightRingBrightness => "light_ring_brightness",
            Field::Capabilities => "capabilities",
        }
    }

    /// The colour field of a light ring zone.
    #[must_use]
    pub fn color(zone: LightZone) -> Self {
        match zone {
            LightZone::Low => Field::ColorLow,
            LightZone::Ok => Field::ColorOk,
            LightZone::High => Field::ColorHigh,
            LightZone::Motion => Field::ColorMotion,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    UInt(u64),
    Text(String),
    State(DeviceState),
    Mode(ShavingMode),
    Color(Rgb),
    Settings(SettingsRecord),
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        FieldValue::UInt(u64::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::UInt(u64::from(v))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<DeviceState> for FieldValue {
    fn from(v: DeviceState) -> Self {
        FieldValue::State(v)
    }
}

impl From<ShavingMode> for FieldValue {
    fn from(v: ShavingMode) -> Self {
        FieldValue::Mode(v)
    }
}

impl From<Rgb> for FieldValue {
    fn from(v: Rgb) -> Self {
        FieldValue::Color(v)
    }
}

impl From<SettingsRecord> for FieldValue {
    fn from(v: SettingsRecord) -> Self {
        FieldValue::Settings(v)
    }
}

/// A partial field map: the decoded values of one read batch or one
/// notification. Absent fields are simply not in the map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldUpdates(BTreeMap<Field, FieldValue>);

impl FieldUpdates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates holding at most one field. `None` yields an empty update.
    #[must_use]
    pub fn single(field: Field, value: Option<FieldValue>) -> Self {
        let mut updates = Self::new();
        updates.set(field, value);
        updates
    }

    /// Record a value if there is one.
    pub fn set(&mut self, field: Field, value: Option<FieldValue>) {
        if let Some(value) = value {
            self.0.insert(field, value);
        }
    }

    pub fn insert(&mut self, field: Field, value: impl Into<FieldValue>) {
        self.0.insert(field, value.into());
    }

    /// Merge another batch into this one. Later values win.
    pub fn extend(&mut self, other: FieldUpdates) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.0.get(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &FieldValue)> {
        self.0.iter().map(|(f, v)| (*f, v))
    }
}

impl FromIterator<(Field, FieldValue)> for FieldUpdates {
    fn from_iter<I: IntoIterator<Item = (Field, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Last-known state of one device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    fields: BTreeMap<Field, FieldValue>,
    last_updated: Option<Instant>,
    captured_at: Option<OffsetDateTime>,
}

impl Snapshot {
    /// An empty snapshot: every field absent, never updated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields of `updates` whose value differs from the current one.
    #[must_use]
    pub fn changes(&self, updates: &FieldUpdates) -> Vec<Field> {
        updates
            .iter()
            .filter(|(field, value)| self.fields.get(field) != Some(*value))
            .map(|(field, _)| field)
            .collect()
    }

    /// Apply `updates` and return the new snapshot, or `None` when no field
    /// would change.
    ///
    /// Fields not present in `updates` keep their value. `last_updated` moves
    /// to `now` only when something changed.
    #[must_use]
    pub fn merge(&self, updates: &FieldUpdates, now: Instant) -> Option<Snapshot> {
        if self.changes(updates).is_empty() {
            return None;
        }
        let mut next = self.clone();
        for (field, value) in updates.iter() {
            next.fields.insert(field, value.clone());
        }
        next.last_updated = Some(now);
        next.captured_at = Some(OffsetDateTime::now_utc());
        Some(next)
    }

    #[must_use]
    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// All present fields, in a stable order.
    pub fn fields(&self) -> impl Iterator<Item = (Field, &FieldValue)> {
        self.fields.iter().map(|(f, v)| (*f, v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Monotonic time of the last merge that changed something.
    #[must_use]
    pub fn last_updated(&self) -> Option<Instant> {
        self.last_updated
    }

    /// Wall-clock time of the last merge that changed something.
    #[must_use]
    pub fn captured_at(&self) -> Option<OffsetDateTime> {
        self.captured_at
    }

    /// True when nothing changed within `window` before `now`, or never.
    #[must_use]
    pub fn is_stale(&self, window: Duration, now: Instant) -> bool {
        match self.last_updated {
            Some(at) => now.saturating_duration_since(at) > window,
            None => true,
        }
    }

    // --- Typed accessors ---

    #[must_use]
    pub fn uint(&self, field: Field) -> Option<u64> {
        match self.get(field)? {
            FieldValue::UInt(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(&self, field: Field) -> Option<&str> {
        match self.get(field)? {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn flag(&self, field: Field) -> Option<bool> {
        match self.get(field)? {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn percentage(&self, field: Field) -> Option<u8> {
        self.uint(field).and_then(|v| u8::try_from(v).ok())
    }

    #[must_use]
    pub fn battery(&self) -> Option<u8> {
        self.percentage(Field::Battery)
    }

    #[must_use]
    pub fn device_state(&self) -> Option<DeviceState> {
        match self.get(Field::DeviceState)? {
            FieldValue::State(s) => Some(*s),
            _ => None,
        }
    }

    #[must_use]
    pub fn travel_lock(&self) -> Option<bool> {
        self.flag(Field::TravelLock)
    }

    #[must_use]
    pub fn cleaning_progress(&self) -> Option<u8> {
        self.percentage(Field::CleaningProgress)
    }

    #[must_use]
    pub fn shaving_mode(&self) -> Option<ShavingMode> {
        match self.get(Field::ShavingMode)? {
            FieldValue::Mode(m) => Some(*m),
            _ => None,
        }
    }

    /// Decoded settings of the active mode; `None` for an error record.
    #[must_use]
    pub fn shaving_settings(&self) -> Option<&ShavingSettings> {
        match self.get(Field::ShavingSettings)? {
            FieldValue::Settings(record) => record.settings(),
            _ => None,
        }
    }

    #[must_use]
    pub fn color(&self, zone: LightZone) -> Option<Rgb> {
        match self.get(Field::color(zone))? {
            FieldValue::Color(c) => Some(*c),
            _ => None,
        }
    }
}

/// Publishes snapshots to any number of readers.
///
/// Cloning the store yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<Arc<Snapshot>>>,
}

impl SnapshotStore {
    /// A store holding an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(Snapshot::new()));
        Self { tx: Arc::new(tx) }
    }

    /// The latest published snapshot. Never blocks on writers.
    #[must_use]
    pub fn current(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    /// A receiver that is notified after every publish.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    /// Merge and publish in one step. Returns the fields that changed; an
    /// empty result means nothing was published.
    pub fn merge(&self, updates: &FieldUpdates) -> Vec<Field> {
        if updates.is_empty() {
            return Vec::new();
        }
        let now = Instant::now();
        let mut changed = Vec::new();
        self.tx.send_if_modified(|current| {
            changed = current.changes(updates);
            match current.merge(updates, now) {
                Some(next) => {
                    *current = Arc::new(next);
                    true
                }
                None => false,
            }
        });
        changed
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const FIELDS: [Field; 5] = [
        Field::Battery,
        Field::HeadRemaining,
        Field::MotorRpm,
        Field::Pressure,
        Field::ShavingTime,
    ];

    fn field_updates() -> impl Strategy<Value = FieldUpdates> {
        proptest::collection::vec((0..FIELDS.len(), 0u64..4), 0..6).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(i, v)| (FIELDS[i], FieldValue::UInt(v)))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn merge_only_touches_updated_fields(first in field_updates(), second in field_updates()) {
            let now = Instant::now();
            let base = Snapshot::new().merge(&first, now).unwrap_or_default();
            let merged = base.merge(&second, now).unwrap_or_else(|| base.clone());

            for field in FIELDS {
                match second.get(field) {
                    Some(value) => prop_assert_eq!(merged.get(field), Some(value)),
                    None => prop_assert_eq!(merged.get(field), base.get(field)),
                }
            }
            prop_assert!(merged.fields().count() >= base.fields().count());
        }

        #[test]
        fn repeated_merge_publishes_nothing(updates in field_updates()) {
            let store = SnapshotStore::new();
            store.merge(&updates);
            let before = store.current();
            let mut rx = store.subscribe();

            prop_assert!(store.merge(&updates).is_empty());
            prop_assert!(!rx.has_changed().unwrap());
            prop_assert_eq!(store.current().last_updated(), before.last_updated());
            prop_assert!(before.merge(&updates, Instant::now()).is_none());
        }
    }
}
