//! Static characteristic table.
//!
//! One record per characteristic the shaver exposes: which snapshot fields
//! it feeds, how it is decoded, how it may be accessed, which capability it
//! depends on and whether the poll and live read passes include it. The
//! coordinator derives all of its read, subscribe and decode behaviour from
//! this table.

use uuid::Uuid;

use shaver_types::{Capabilities, Capability, decode as payload, uuids};

use crate::snapshot::{Field, FieldUpdates, FieldValue};

/// How a characteristic may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    ReadNotify,
    ReadWrite,
    ReadNotifyWrite,
}

impl Access {
    #[must_use]
    pub fn notifies(self) -> bool {
        matches!(self, Access::ReadNotify | Access::ReadNotifyWrite)
    }

    #[must_use]
    pub fn writable(self) -> bool {
        matches!(self, Access::ReadWrite | Access::ReadNotifyWrite)
    }
}

/// Decode a payload into the fields it feeds.
pub type DecodeFn = fn(&[u8]) -> FieldUpdates;

/// One entry of the characteristic table.
#[derive(Debug, Clone, Copy)]
pub struct CharacteristicSpec {
    pub uuid: Uuid,
    /// Primary field, used in logs and notification routing.
    pub field: Field,
    pub access: Access,
    /// Capability the device must advertise for this entry to be used.
    pub gate: Option<Capability>,
    /// Read during a poll attempt.
    pub poll: bool,
    /// Read when a live session is established.
    pub live: bool,
    pub decode: DecodeFn,
}

impl CharacteristicSpec {
    /// Whether this entry applies to a device with `capabilities`.
    ///
    /// Gated entries are skipped until the capabilities are known.
    #[must_use]
    pub fn enabled(&self, capabilities: Option<&Capabilities>) -> bool {
        match self.gate {
            None => true,
            Some(cap) => capabilities.is_some_and(|c| c.supports(cap)),
        }
    }
}

fn percentage(field: Field, data: &[u8]) -> FieldUpdates {
    FieldUpdates::single(field, payload::percentage(data).map(FieldValue::from))
}

fn uint(field: Field, data: &[u8], min_width: usize) -> FieldUpdates {
    FieldUpdates::single(field, payload::uint_le(data, min_width).map(FieldValue::from))
}

fn text(field: Field, data: &[u8]) -> FieldUpdates {
    FieldUpdates::single(field, payload::text(data).map(FieldValue::from))
}

fn color(field: Field, data: &[u8]) -> FieldUpdates {
    FieldUpdates::single(field, payload::rgb(data).map(FieldValue::from))
}

fn settings(field: Field, data: &[u8]) -> FieldUpdates {
    FieldUpdates::single(field, payload::shaving_settings(data).map(FieldValue::from))
}

fn shaving_mode(data: &[u8]) -> FieldUpdates {
    let mut updates = FieldUpdates::new();
    if let Some((mode, value)) = payload::shaving_mode(data) {
        updates.insert(Field::ShavingMode, mode);
        updates.insert(Field::ShavingModeValue, value);
    }
    updates
}

fn capabilities(data: &[u8]) -> FieldUpdates {
    FieldUpdates::single(
        Field::Capabilities,
        payload::capabilities(data).map(|c| FieldValue::from(c.bits())),
    )
}

const fn entry(
    uuid: Uuid,
    field: Field,
    access: Access,
    poll: bool,
    live: bool,
    decode: DecodeFn,
) -> CharacteristicSpec {
    CharacteristicSpec {
        uuid,
        field,
        access,
        gate: None,
        poll,
        live,
        decode,
    }
}

const fn gated(spec: CharacteristicSpec, capability: Capability) -> CharacteristicSpec {
    CharacteristicSpec {
        gate: Some(capability),
        ..spec
    }
}

/// Every known characteristic.
pub static CHARACTERISTICS: &[CharacteristicSpec] = &[
    // --- Standard ---
    entry(uuids::BATTERY_LEVEL, Field::Battery, Access::ReadNotify, true, true, |d| {
        percentage(Field::Battery, d)
    }),
    entry(uuids::FIRMWARE_REVISION, Field::Firmware, Access::Read, true, true, |d| {
        text(Field::Firmware, d)
    }),
    entry(uuids::MODEL_NUMBER, Field::ModelNumber, Access::Read, true, true, |d| {
        text(Field::ModelNumber, d)
    }),
    entry(uuids::SERIAL_NUMBER, Field::SerialNumber, Access::Read, true, true, |d| {
        text(Field::SerialNumber, d)
    }),
    // --- Status ---
    entry(uuids::HEAD_REMAINING, Field::HeadRemaining, Access::ReadNotify, true, true, |d| {
        percentage(Field::HeadRemaining, d)
    }),
    entry(uuids::DAYS_SINCE_LAST_USED, Field::DaysSinceLastUsed, Access::Read, true, true, |d| {
        uint(Field::DaysSinceLastUsed, d, 2)
    }),
    entry(uuids::SHAVING_TIME, Field::ShavingTime, Access::ReadNotify, true, true, |d| {
        uint(Field::ShavingTime, d, 2)
    }),
    entry(uuids::DEVICE_STATE, Field::DeviceState, Access::ReadNotify, false, true, |d| {
        FieldUpdates::single(Field::DeviceState, payload::device_state(d).map(FieldValue::from))
    }),
    entry(uuids::TRAVEL_LOCK, Field::TravelLock, Access::ReadNotify, false, true, |d| {
        FieldUpdates::single(Field::TravelLock, payload::flag(d).map(FieldValue::from))
    }),
    gated(
        entry(uuids::CLEANING_PROGRESS, Field::CleaningProgress, Access::ReadNotify, false, false, |d| {
            percentage(Field::CleaningProgress, d)
        }),
        Capability::UnitCleaning,
    ),
    gated(
        entry(uuids::CLEANING_CYCLES, Field::CleaningCycles, Access::ReadNotifyWrite, true, true, |d| {
            uint(Field::CleaningCycles, d, 2)
        }),
        Capability::UnitCleaning,
    ),
    entry(uuids::MOTOR_CURRENT, Field::MotorCurrentMa, Access::ReadNotify, false, false, |d| {
        uint(Field::MotorCurrentMa, d, 2)
    }),
    entry(uuids::MOTOR_CURRENT_MAX, Field::MotorCurrentMaxMa, Access::Read, true, true, |d| {
        uint(Field::MotorCurrentMaxMa, d, 2)
    }),
    entry(uuids::MOTOR_RPM, Field::MotorRpm, Access::ReadNotify, false, false, |d| {
        FieldUpdates::single(Field::MotorRpm, payload::motor_rpm(d).map(FieldValue::from))
    }),
    entry(uuids::AMOUNT_OF_CHARGES, Field::AmountOfCharges, Access::ReadNotify, true, true, |d| {
        uint(Field::AmountOfCharges, d, 2)
    }),
    entry(
        uuids::AMOUNT_OF_OPERATIONAL_TURNS,
        Field::AmountOfOperationalTurns,
        Access::ReadNotify,
        true,
        true,
        |d| uint(Field::AmountOfOperationalTurns, d, 2),
    ),
    entry(uuids::TOTAL_AGE, Field::TotalAge, Access::ReadNotify, true, true, |d| {
        uint(Field::TotalAge, d, 4)
    }),
    // --- Control ---
    entry(uuids::SHAVING_MODE, Field::ShavingMode, Access::ReadWrite, true, true, shaving_mode),
    entry(
        uuids::SHAVING_MODE_SETTINGS,
        Field::ShavingSettings,
        Access::ReadNotify,
        true,
        true,
        |d| settings(Field::ShavingSettings, d),
    ),
    entry(
        uuids::CUSTOM_SHAVING_MODE_SETTINGS,
        Field::CustomShavingSettings,
        Access::ReadWrite,
        true,
        true,
        |d| settings(Field::CustomShavingSettings, d),
    ),
    gated(
        entry(uuids::PRESSURE, Field::Pressure, Access::ReadNotify, false, false, |d| {
            uint(Field::Pressure, d, 1)
        }),
        Capability::Pressure,
    ),
    entry(uuids::CAPABILITIES, Field::Capabilities, Access::Read, false, false, capabilities),
    // --- Light ring ---
    gated(
        entry(uuids::LIGHTRING_COLOR_LOW, Field::ColorLow, Access::ReadWrite, true, true, |d| {
            color(Field::ColorLow, d)
        }),
        Capability::LightRing,
    ),
    gated(
        entry(uuids::LIGHTRING_COLOR_OK, Field::ColorOk, Access::ReadWrite, true, true, |d| {
            color(Field::ColorOk, d)
        }),
        Capability::LightRing,
    ),
    gated(
        entry(uuids::LIGHTRING_COLOR_HIGH, Field::ColorHigh, Access::ReadWrite, true, true, |d| {
            color(Field::ColorHigh, d)
        }),
        Capability::LightRing,
    ),
    gated(
        entry(uuids::LIGHTRING_COLOR_MOTION, Field::ColorMotion, Access::ReadWrite, true, true, |d| {
            color(Field::ColorMotion, d)
        }),
        Capability::LightRing,
    ),
    gated(
        entry(
            uuids::LIGHTRING_BRIGHTNESS,
            Field::LightRingBrightness,
            Access::ReadWrite,
            true,
            true,
            |d| percentage(Field::LightRingBrightness, d),
        ),
        Capability::LightRing,
    ),
];

/// Look up the table entry for a characteristic.
#[must_use]
pub fn lookup(uuid: Uuid) -> Option<&'static CharacteristicSpec> {
    CHARACTERISTICS.iter().find(|c| c.uuid == uuid)
}

/// Entries read by a poll attempt.
pub fn poll_set(caps: Option<&Capabilities>) -> impl Iterator<Item = &'static CharacteristicSpec> {
    CHARACTERISTICS
        .iter()
        .filter(move |c| c.poll && c.enabled(caps))
}

/// Entries read when a live session starts.
pub fn live_set(caps: Option<&Capabilities>) -> impl Iterator<Item = &'static CharacteristicSpec> {
    CHARACTERISTICS
        .iter()
        .filter(move |c| c.live && c.enabled(caps))
}

/// Entries subscribed to on a live session.
pub fn notify_set(
    caps: Option<&Capabilities>,
) -> impl Iterator<Item = &'static CharacteristicSpec> {
    CHARACTERISTICS
        .iter()
        .filter(move |c| c.access.notifies() && c.enabled(caps))
}

/// Decode a payload of a known characteristic. Unknown characteristics
/// decode to nothing.
#[must_use]
pub fn decode(uuid: Uuid, data: &[u8]) -> FieldUpdates {
    lookup(uuid).map_or_else(FieldUpdates::new, |spec| (spec.decode)(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaver_types::{DeviceState, Rgb, ShavingMode};
    use std::collections::HashSet;

    #[test]
    fn test_table_has_unique_uuids_and_fields() {
        let uuids: HashSet<_> = CHARACTERISTICS.iter().map(|c| c.uuid).collect();
        assert_eq!(uuids.len(), CHARACTERISTICS.len());
        let fields: HashSet<_> = CHARACTERISTICS.iter().map(|c| c.field).collect();
        assert_eq!(fields.len(), CHARACTERISTICS.len());
    }

    #[test]
    fn test_decoders_feed_their_primary_field() {
        for spec in CHARACTERISTICS {
            let updates = (spec.decode)(&[0x01, 0x02, 0x03, 0x04]);
            assert!(
                updates.get(spec.field).is_some(),
                "{} did not decode a 4-byte payload",
                spec.field
            );
        }
    }

    #[test]
    fn test_empty_payload_decodes_to_nothing() {
        for spec in CHARACTERISTICS {
            assert!((spec.decode)(&[]).is_empty(), "{}", spec.field);
        }
    }

    #[test]
    fn test_live_set_adds_state_and_lock() {
        let all = Capabilities::from_bits(0x7F);
        let poll: HashSet<_> = poll_set(Some(&all)).map(|c| c.field).collect();
        let live: HashSet<_> = live_set(Some(&all)).map(|c| c.field).collect();
        let extra: HashSet<_> = live.difference(&poll).copied().collect();
        assert_eq!(
            extra,
            HashSet::from([Field::DeviceState, Field::TravelLock])
        );
        assert!(poll.is_subset(&live));
    }

    #[test]
    fn test_gates_hide_unsupported_features() {
        let none = Capabilities::default();
        let fields: HashSet<_> = notify_set(Some(&none)).map(|c| c.field).collect();
        assert!(!fields.contains(&Field::Pressure));
        assert!(!fields.contains(&Field::CleaningProgress));
        assert!(fields.contains(&Field::DeviceState));

        let polled: HashSet<_> = poll_set(None).map(|c| c.field).collect();
        assert!(!polled.contains(&Field::ColorLow));
        assert!(!polled.contains(&Field::LightRingBrightness));

        let ring = Capabilities::from_bits(Capability::LightRing.mask().into());
        let polled: HashSet<_> = poll_set(Some(&ring)).map(|c| c.field).collect();
        assert!(polled.contains(&Field::ColorMotion));
    }

    #[test]
    fn test_notify_set_matches_known_subscriptions() {
        let all = Capabilities::from_bits(0x7F);
        let fields: HashSet<_> = notify_set(Some(&all)).map(|c| c.field).collect();
        assert_eq!(fields.len(), 14);
        assert!(fields.contains(&Field::MotorRpm));
        assert!(fields.contains(&Field::ShavingSettings));
        assert!(!fields.contains(&Field::ShavingMode));
    }

    #[test]
    fn test_decode_by_uuid() {
        assert_eq!(
            decode(uuids::DEVICE_STATE, &[0x02]).get(Field::DeviceState),
            Some(&FieldValue::State(DeviceState::Shaving))
        );
        assert_eq!(
            decode(uuids::LIGHTRING_COLOR_OK, &[0x37, 0xFF, 0x00, 0xFF]).get(Field::ColorOk),
            Some(&FieldValue::Color(Rgb::new(55, 255, 0)))
        );
        assert!(decode(Uuid::nil(), &[1, 2, 3]).is_empty());
    }

    #[test]
    fn test_shaving_mode_feeds_two_fields() {
        let updates = decode(uuids::SHAVING_MODE, &[0x04]);
        assert_eq!(
            updates.get(Field::ShavingMode),
            Some(&FieldValue::Mode(ShavingMode::Foam))
        );
        assert_eq!(updates.get(Field::ShavingModeValue), Some(&FieldValue::UInt(4)));
    }
}
