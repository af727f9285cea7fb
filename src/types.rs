use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw device record as returned by the cloud. The two nested
/// sub-structures overlap: `condition` carries live telemetry, `settings`
/// the desired values last written. Either or both may be missing, and
/// field types inside them vary across firmware versions, so they are kept
/// as raw JSON and read through the coercion helpers in `normalize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Omitted entirely for always-reachable device classes; may be a bool
    /// or a numeric flag depending on firmware.
    #[serde(default)]
    pub online: Option<Value>,
    #[serde(default)]
    pub condition: Option<Value>,
    #[serde(default)]
    pub settings: Option<Value>,
}

impl Device {
    pub fn is_online(&self) -> bool {
        match &self.online {
            None | Some(Value::Null) => true,
            Some(v) => crate::normalize::coerce_bool(v).unwrap_or(true),
        }
    }
}

/// Canonical per-device state derived from a raw [`Device`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub power_on: bool,
    /// 0..=7, 0 meaning off/unset.
    pub fan_speed: u8,
    /// 0 = fresh-air ventilation, 1 = recirculation, 2 = mixed,
    /// 3 = fresh-air valve only (not present on all firmware, see
    /// [`DAMPER_POSITIONS`]).
    pub damper_position: u8,
    /// 0 = off, 1..=3 = humidification stages.
    pub humidity_stage: u8,
    /// Tenths of a degree Celsius, e.g. 215 = 21.5°C.
    pub target_temperature_deci_c: i32,
    pub current_temperature_deci_c: Option<i32>,
    pub current_humidity_pct: Option<u8>,
    pub online: bool,
}

/// Merged view of everything known about the account's devices. Replaced
/// wholesale by the poller on each successful cycle; never mutated
/// field-by-field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub devices: Vec<Device>,
    /// Keyed by device id as string.
    pub states: HashMap<String, DeviceState>,
}

impl Snapshot {
    pub fn state(&self, device_id: u64) -> Option<&DeviceState> {
        self.states.get(&device_id.to_string())
    }

    pub fn device(&self, device_id: u64) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == device_id)
    }
}

/// Number of damper positions advertised by most current firmware. Some
/// fleet variants only support the 3-way subset {0, 1, 2}; the observed
/// range is builder-configurable for that reason.
pub const DAMPER_POSITIONS: u8 = 4;

pub const FAN_SPEED_MAX: u8 = 7;
pub const HUMIDITY_STAGE_MAX: u8 = 3;

/// Target temperature bounds, deci-degrees C (10.0°C..=30.0°C).
pub const TARGET_TEMP_MIN_DECI_C: i32 = 100;
pub const TARGET_TEMP_MAX_DECI_C: i32 = 300;

/// Used when neither telemetry nor settings report a target temperature.
pub const DEFAULT_TARGET_TEMP_DECI_C: i32 = 220;

/// The wire format carries temperatures as tenths of a degree Celsius.
/// Ties round away from zero: 21.25°C encodes to 213.
pub fn celsius_to_deci(celsius: f64) -> i32 {
    (celsius * 10.0).round() as i32
}

pub fn deci_to_celsius(deci: i32) -> f64 {
    deci as f64 / 10.0
}

/// Display-only quantization of the humidification stage (0/33/66/100 %).
/// The stage is the authoritative representation.
pub fn humidity_stage_percent(stage: u8) -> u8 {
    match stage {
        0 => 0,
        1 => 33,
        2 => 66,
        _ => 100,
    }
}
