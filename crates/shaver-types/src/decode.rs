//! Pure decoders for shaver characteristic payloads.
//!
//! Every decoder takes the raw bytes of one characteristic and returns the
//! typed value, or `None` when the payload carries no usable value. None of
//! them panic on short or malformed input; the shaving settings decoder
//! returns an explicit [`SettingsRecord::Error`] instead of dropping a
//! wrong-length payload.
//!
//! An empty payload is always "no value", so a read that returned nothing
//! never overwrites a previously known value.

use bytes::Buf;

use crate::types::{
    Capabilities, DeviceState, MOTOR_RPM_DIVISOR, PRESSURE_RECORD_LEN, PressureRecord, Rgb,
    SHAVING_SETTINGS_LEN, SettingsRecord, ShavingMode, ShavingSettings,
};

/// Error text stored for a settings payload of the wrong length.
pub const INVALID_LENGTH_ERROR: &str = "Invalid data length";

/// Percentage fields: the first byte, as-is. No clamping.
#[must_use]
pub fn percentage(data: &[u8]) -> Option<u8> {
    data.first().copied()
}

/// Little-endian unsigned integer of at least `min_width` bytes.
///
/// All available bytes (up to eight) are used, so a counter the firmware
/// widens later keeps decoding correctly.
#[must_use]
pub fn uint_le(data: &[u8], min_width: usize) -> Option<u64> {
    if data.is_empty() || data.len() < min_width {
        return None;
    }
    let width = data.len().min(8);
    let mut buf = &data[..width];
    Some(buf.get_uint_le(width))
}

/// Little-endian `u16` from the first two bytes.
#[must_use]
pub fn u16_le(data: &[u8]) -> Option<u16> {
    if data.len() < 2 {
        return None;
    }
    let mut buf = data;
    Some(buf.get_u16_le())
}

/// Little-endian `u32` from the first four bytes.
#[must_use]
pub fn u32_le(data: &[u8]) -> Option<u32> {
    if data.len() < 4 {
        return None;
    }
    let mut buf = data;
    Some(buf.get_u32_le())
}

/// Convert a raw motor value to RPM.
#[must_use]
pub fn rpm_from_raw(raw: u64) -> u32 {
    (raw as f64 / MOTOR_RPM_DIVISOR).round() as u32
}

/// Motor RPM: raw little-endian value divided by 3.036, rounded.
#[must_use]
pub fn motor_rpm(data: &[u8]) -> Option<u32> {
    uint_le(data, 2).map(rpm_from_raw)
}

/// Device state from the first byte. Unrecognised values decode to
/// [`DeviceState::Unknown`]; an empty payload decodes to nothing.
#[must_use]
pub fn device_state(data: &[u8]) -> Option<DeviceState> {
    data.first().map(|b| DeviceState::from(*b))
}

/// Boolean flag: true when the first byte is exactly `1`.
#[must_use]
pub fn flag(data: &[u8]) -> Option<bool> {
    data.first().map(|b| *b == 1)
}

/// Text fields: lossy UTF-8, trimmed. An empty result is still a value.
///
/// Trailing NUL padding is stripped along with whitespace.
#[must_use]
pub fn text(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    let s = String::from_utf8_lossy(data);
    Some(
        s.trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string(),
    )
}

/// RGB colour from the first three bytes of an RGBA payload.
///
/// # Examples
///
/// ```
/// use shaver_types::{decode, Rgb};
///
/// assert_eq!(decode::rgb(&[0x37, 0xFF, 0x00, 0xFF]), Some(Rgb::new(55, 255, 0)));
/// assert_eq!(decode::rgb(&[0x37, 0xFF]), None);
/// ```
#[must_use]
pub fn rgb(data: &[u8]) -> Option<Rgb> {
    match data {
        [r, g, b, ..] => Some(Rgb::new(*r, *g, *b)),
        _ => None,
    }
}

/// Shaving mode: the little-endian integer and its enumerated tag.
#[must_use]
pub fn shaving_mode(data: &[u8]) -> Option<(ShavingMode, u64)> {
    uint_le(data, 1).map(|v| (ShavingMode::from_value(v), v))
}

/// Shaving mode settings: exactly ten bytes, five little-endian `u16`.
///
/// Any other non-empty length yields the error record
/// `{"error": "Invalid data length"}`.
///
/// # Examples
///
/// ```
/// use shaver_types::decode;
///
/// let bytes = [0xd0, 0x07, 0x00, 0x00, 0x00, 0x06, 0xa0, 0x0f, 0x00, 0x00];
/// let record = decode::shaving_settings(&bytes).unwrap();
/// assert_eq!(record.settings().unwrap().custom_motor_rpm, 659);
/// ```
#[must_use]
pub fn shaving_settings(data: &[u8]) -> Option<SettingsRecord> {
    if data.is_empty() {
        return None;
    }
    if data.len() != SHAVING_SETTINGS_LEN {
        return Some(SettingsRecord::Error {
            error: INVALID_LENGTH_ERROR.to_string(),
        });
    }

    let mut buf = data;
    let raw_motor_value = buf.get_u16_le();
    let pressure_base_value = buf.get_u16_le();
    let pressure_limit_low = buf.get_u16_le();
    let pressure_limit_high = buf.get_u16_le();
    let feedback_analysis_window = buf.get_u16_le();

    Some(SettingsRecord::Settings(ShavingSettings {
        raw_motor_value,
        pressure_base_value,
        pressure_limit_low,
        pressure_limit_high,
        feedback_analysis_window,
        custom_motor_rpm: rpm_from_raw(u64::from(raw_motor_value)),
    }))
}

/// Capability bitmask, little-endian.
#[must_use]
pub fn capabilities(data: &[u8]) -> Option<Capabilities> {
    uint_le(data, 1).map(Capabilities::from_bits)
}

/// Pressure history: consecutive 15-byte blocks.
///
/// Trailing bytes that do not fill a block are ignored. A block whose
/// fields cannot be read is skipped without affecting the rest.
#[must_use]
pub fn pressure_history(data: &[u8]) -> Vec<PressureRecord> {
    data.chunks_exact(PRESSURE_RECORD_LEN)
        .filter_map(pressure_record)
        .collect()
}

fn pressure_record(block: &[u8]) -> Option<PressureRecord> {
    let mut buf = block;
    if buf.remaining() < PRESSURE_RECORD_LEN {
        return None;
    }
    let kind = buf.get_u8();
    let mut values = [0u16; 4];
    for v in &mut values {
        *v = buf.get_u16_le();
    }
    let timestamp = buf.get_u32_le();
    Some(PressureRecord {
        kind,
        values,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capability;

    #[test]
    fn test_percentage_first_byte_unclamped() {
        assert_eq!(percentage(&[85]), Some(85));
        assert_eq!(percentage(&[200, 1]), Some(200));
        assert_eq!(percentage(&[]), None);
    }

    #[test]
    fn test_uint_le_widths() {
        assert_eq!(uint_le(&[0x2C, 0x01], 2), Some(300));
        assert_eq!(uint_le(&[0x78, 0x56, 0x34, 0x12], 4), Some(0x1234_5678));
        // a wider payload than the minimum still decodes in full
        assert_eq!(uint_le(&[0x00, 0x00, 0x01], 2), Some(0x01_0000));
        assert_eq!(uint_le(&[0x01], 2), None);
        assert_eq!(uint_le(&[], 1), None);
    }

    #[test]
    fn test_uint_le_caps_at_eight_bytes() {
        let data = [0xFF; 12];
        assert_eq!(uint_le(&data, 2), Some(u64::MAX));
    }

    #[test]
    fn test_motor_rpm() {
        // 2000 / 3.036 = 658.76
        assert_eq!(motor_rpm(&[0xD0, 0x07]), Some(659));
        assert_eq!(motor_rpm(&[0x00, 0x00]), Some(0));
        assert_eq!(motor_rpm(&[0xD0]), None);
    }

    #[test]
    fn test_device_state_scenarios() {
        assert_eq!(device_state(&[0x01]), Some(DeviceState::Off));
        assert_eq!(device_state(&[0x02]), Some(DeviceState::Shaving));
        assert_eq!(device_state(&[0x03]), Some(DeviceState::Charging));
        assert_eq!(device_state(&[0x09]), Some(DeviceState::Unknown));
        assert_eq!(device_state(&[]), None);
    }

    #[test]
    fn test_flag() {
        assert_eq!(flag(&[1]), Some(true));
        assert_eq!(flag(&[0]), Some(false));
        assert_eq!(flag(&[2]), Some(false));
        assert_eq!(flag(&[]), None);
    }

    #[test]
    fn test_text_trimmed_and_lossy() {
        assert_eq!(text(b"  XP9201 \n"), Some("XP9201".to_string()));
        assert_eq!(text(b"1.2.3\0\0"), Some("1.2.3".to_string()));
        assert_eq!(text(&[0x41, 0xFF, 0x42]), Some("A\u{FFFD}B".to_string()));
        assert_eq!(text(b"   "), Some(String::new()));
        assert_eq!(text(&[]), None);
    }

    #[test]
    fn test_rgb_ignores_alpha() {
        assert_eq!(rgb(&[0x37, 0xFF, 0x00, 0xFF]), Some(Rgb::new(55, 255, 0)));
        assert_eq!(rgb(&[0x37, 0xFF, 0x00, 0x00]), Some(Rgb::new(55, 255, 0)));
        assert_eq!(rgb(&[1, 2, 3]), Some(Rgb::new(1, 2, 3)));
        assert_eq!(rgb(&[1, 2]), None);
    }

    #[test]
    fn test_shaving_mode_decode() {
        assert_eq!(shaving_mode(&[0x04]), Some((ShavingMode::Foam, 4)));
        assert_eq!(shaving_mode(&[0x05]), Some((ShavingMode::BatterySaving, 5)));
        assert_eq!(shaving_mode(&[0x07]), Some((ShavingMode::Unknown, 7)));
        assert_eq!(shaving_mode(&[]), None);
    }

    #[test]
    fn test_shaving_settings_scenario() {
        let bytes = [0xd0, 0x07, 0x00, 0x00, 0x00, 0x06, 0xa0, 0x0f, 0x00, 0x00];
        let record = shaving_settings(&bytes).unwrap();
        let settings = record.settings().unwrap();
        assert_eq!(settings.raw_motor_value, 2000);
        assert_eq!(settings.pressure_base_value, 0);
        assert_eq!(settings.pressure_limit_low, 1536);
        assert_eq!(settings.pressure_limit_high, 4000);
        assert_eq!(settings.feedback_analysis_window, 0);
        assert_eq!(settings.custom_motor_rpm, 659);
    }

    #[test]
    fn test_shaving_settings_wrong_length_is_error_record() {
        for len in [1usize, 9, 11, 20] {
            let record = shaving_settings(&vec![0u8; len]).unwrap();
            assert_eq!(
                record,
                SettingsRecord::Error {
                    error: INVALID_LENGTH_ERROR.to_string()
                },
                "len {len}"
            );
        }
        assert_eq!(shaving_settings(&[]), None);
    }

    #[test]
    fn test_capabilities_scenario() {
        let caps = capabilities(&[0b000_1001]).unwrap();
        assert!(caps.motion);
        assert!(caps.pressure);
        assert!(!caps.brush);
        assert!(!caps.motion_speed);
        assert!(!caps.unit_cleaning);
        assert!(!caps.cleaning_mode);
        assert!(!caps.light_ring);
    }

    #[test]
    fn test_capabilities_multi_byte() {
        let caps = capabilities(&[0x40, 0x00, 0x00, 0x00]).unwrap();
        assert!(caps.supports(Capability::LightRing));
        assert_eq!(caps.bits(), 0x40);
    }

    #[test]
    fn test_pressure_history_blocks() {
        let block: [u8; 15] = [
            0x02, // kind
            0x10, 0x00, // 16
            0x20, 0x00, // 32
            0x30, 0x00, // 48
            0x40, 0x00, // 64
            0x78, 0x56, 0x34, 0x12, // timestamp
            0x00, 0x00, // padding
        ];
        let mut data = block.to_vec();
        data.extend_from_slice(&block);
        data.extend_from_slice(&[0xAA; 7]); // partial trailing block

        let records = pressure_history(&data);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, 2);
        assert_eq!(records[0].values, [16, 32, 48, 64]);
        assert_eq!(records[0].timestamp, 0x1234_5678);
    }

    #[test]
    fn test_pressure_history_short_buffer() {
        assert!(pressure_history(&[0u8; 14]).is_empty());
        assert!(pressure_history(&[]).is_empty());
    }
}
