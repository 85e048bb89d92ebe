//! Bluetooth UUIDs for Philips shavers.
//!
//! Philips-specific characteristics all share the base
//! `8d56XXXX-3cb9-4387-a7e8-b79d826a7025`; the device information and battery
//! values use the standard Bluetooth SIG 16-bit identifiers.

use uuid::{Uuid, uuid};

// --- Philips Service UUIDs ---

/// Device status service (state, lock, motor, counters).
pub const SHAVER_STATUS_SERVICE: Uuid = uuid!("8d560100-3cb9-4387-a7e8-b79d826a7025");

/// History service.
pub const SHAVER_HISTORY_SERVICE: Uuid = uuid!("8d560200-3cb9-4387-a7e8-b79d826a7025");

/// Control service (modes, light ring, capabilities).
pub const SHAVER_CONTROL_SERVICE: Uuid = uuid!("8d560300-3cb9-4387-a7e8-b79d826a7025");

/// Extended service, present on newer firmware.
pub const SHAVER_EXTENDED_SERVICE: Uuid = uuid!("8d560600-3cb9-4387-a7e8-b79d826a7025");

// --- Standard BLE Characteristics ---

/// Model number string.
pub const MODEL_NUMBER: Uuid = uuid!("00002a24-0000-1000-8000-00805f9b34fb");

/// Serial number string.
pub const SERIAL_NUMBER: Uuid = uuid!("00002a25-0000-1000-8000-00805f9b34fb");

/// Firmware revision string.
pub const FIRMWARE_REVISION: Uuid = uuid!("00002a26-0000-1000-8000-00805f9b34fb");

/// Battery level percentage. Also used as the keep-alive probe.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

// --- Philips Status Characteristics ---

/// Instantaneous motor current in mA.
pub const MOTOR_CURRENT: Uuid = uuid!("8d560102-3cb9-4387-a7e8-b79d826a7025");

/// Maximum motor current in mA.
pub const MOTOR_CURRENT_MAX: Uuid = uuid!("8d560103-3cb9-4387-a7e8-b79d826a7025");

/// Raw motor speed. Divide by 3.036 for RPM.
pub const MOTOR_RPM: Uuid = uuid!("8d560104-3cb9-4387-a7e8-b79d826a7025");

/// Total age of the device in seconds.
pub const TOTAL_AGE: Uuid = uuid!("8d560106-3cb9-4387-a7e8-b79d826a7025");

/// Count of motor operational turns.
pub const AMOUNT_OF_OPERATIONAL_TURNS: Uuid = uuid!("8d560107-3cb9-4387-a7e8-b79d826a7025");

/// Days since the shaver was last used.
pub const DAYS_SINCE_LAST_USED: Uuid = uuid!("8d560108-3cb9-4387-a7e8-b79d826a7025");

/// Count of charge cycles.
pub const AMOUNT_OF_CHARGES: Uuid = uuid!("8d560109-3cb9-4387-a7e8-b79d826a7025");

/// Device state (off, shaving, charging).
pub const DEVICE_STATE: Uuid = uuid!("8d56010a-3cb9-4387-a7e8-b79d826a7025");

/// Travel lock flag.
pub const TRAVEL_LOCK: Uuid = uuid!("8d56010c-3cb9-4387-a7e8-b79d826a7025");

/// Duration of the current or last shave in seconds.
pub const SHAVING_TIME: Uuid = uuid!("8d56010f-3cb9-4387-a7e8-b79d826a7025");

/// Remaining shaving head life as a percentage.
pub const HEAD_REMAINING: Uuid = uuid!("8d560117-3cb9-4387-a7e8-b79d826a7025");

/// Cleaning station progress as a percentage.
pub const CLEANING_PROGRESS: Uuid = uuid!("8d56011a-3cb9-4387-a7e8-b79d826a7025");

// --- Philips Control Characteristics ---

/// Capability bitmask.
pub const CAPABILITIES: Uuid = uuid!("8d560302-3cb9-4387-a7e8-b79d826a7025");

/// Current skin pressure reading.
pub const PRESSURE: Uuid = uuid!("8d56030c-3cb9-4387-a7e8-b79d826a7025");

/// Light ring color for too little pressure (RGBA).
pub const LIGHTRING_COLOR_LOW: Uuid = uuid!("8d560311-3cb9-4387-a7e8-b79d826a7025");

/// Light ring color for correct pressure (RGBA).
pub const LIGHTRING_COLOR_OK: Uuid = uuid!("8d560312-3cb9-4387-a7e8-b79d826a7025");

/// Light ring color for too much pressure (RGBA).
pub const LIGHTRING_COLOR_HIGH: Uuid = uuid!("8d560313-3cb9-4387-a7e8-b79d826a7025");

/// Remaining cleaning cartridge cycles.
pub const CLEANING_CYCLES: Uuid = uuid!("8d56031a-3cb9-4387-a7e8-b79d826a7025");

/// Light ring color for motion feedback (RGBA).
pub const LIGHTRING_COLOR_MOTION: Uuid = uuid!("8d56031c-3cb9-4387-a7e8-b79d826a7025");

/// Selected shaving mode.
pub const SHAVING_MODE: Uuid = uuid!("8d56032a-3cb9-4387-a7e8-b79d826a7025");

/// Settings of the custom shaving mode (10 bytes).
pub const CUSTOM_SHAVING_MODE_SETTINGS: Uuid = uuid!("8d560330-3cb9-4387-a7e8-b79d826a7025");

/// Light ring brightness percentage.
pub const LIGHTRING_BRIGHTNESS: Uuid = uuid!("8d560331-3cb9-4387-a7e8-b79d826a7025");

/// Settings of the active shaving mode (10 bytes).
pub const SHAVING_MODE_SETTINGS: Uuid = uuid!("8d560332-3cb9-4387-a7e8-b79d826a7025");
