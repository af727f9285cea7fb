//! Turns a raw vendor [`Device`] record into canonical [`DeviceState`].
//!
//! Live telemetry (`condition`) takes precedence over desired settings
//! (`settings`) wherever both report a value, with one exception: a
//! zero/absent telemetry fan speed on a powered-on device yields to a
//! positive settings value, because fan-speed telemetry lags for a while
//! right after power-on.

use serde_json::Value;

use crate::types::{
    Device, DeviceState, DAMPER_POSITIONS, DEFAULT_TARGET_TEMP_DECI_C, FAN_SPEED_MAX,
    HUMIDITY_STAGE_MAX, TARGET_TEMP_MAX_DECI_C, TARGET_TEMP_MIN_DECI_C,
};

/// Pure function of its input: no I/O, no hidden state.
pub fn normalize(device: &Device) -> DeviceState {
    let cond = device.condition.as_ref();
    let set = device.settings.as_ref();

    let power_on = field_bool(cond, "pwr_on")
        .or_else(|| field_bool(set, "u_pwr_on"))
        .unwrap_or(false);

    let telemetry_fan = field_int(cond, "fan_speed");
    let desired_fan = field_int(set, "u_fan_speed");
    let fan_speed = match (telemetry_fan, desired_fan) {
        // Telemetry catch-up heuristic: trust the requested speed while
        // the powered-on unit still reports 0.
        (None | Some(0), Some(d)) if power_on && d > 0 => d,
        (Some(t), _) => t,
        (None, _) => 0,
    };

    let damper_position = field_int(cond, "damp_pos")
        .or_else(|| field_int(set, "u_damp_pos"))
        .unwrap_or(0)
        .clamp(0, (DAMPER_POSITIONS - 1) as i64);

    let humidity_stage = field_int(cond, "hum_stg")
        .or_else(|| field_int(set, "u_hum_stg"))
        .unwrap_or(0)
        .clamp(0, HUMIDITY_STAGE_MAX as i64);

    let target_temperature_deci_c = field_int(cond, "temp_room")
        .or_else(|| field_int(set, "u_temp_room"))
        .unwrap_or(DEFAULT_TARGET_TEMP_DECI_C as i64)
        .clamp(TARGET_TEMP_MIN_DECI_C as i64, TARGET_TEMP_MAX_DECI_C as i64);

    DeviceState {
        power_on,
        fan_speed: fan_speed.clamp(0, FAN_SPEED_MAX as i64) as u8,
        damper_position: damper_position as u8,
        humidity_stage: humidity_stage as u8,
        target_temperature_deci_c: target_temperature_deci_c as i32,
        current_temperature_deci_c: field_int(cond, "temp_in").map(|v| v as i32),
        current_humidity_pct: field_int(cond, "hum_room").map(|v| v.clamp(0, 100) as u8),
        online: device.is_online(),
    }
}

fn field(sub: Option<&Value>, key: &str) -> Option<Value> {
    sub?.get(key).filter(|v| !v.is_null()).cloned()
}

fn field_bool(sub: Option<&Value>, key: &str) -> Option<bool> {
    field(sub, key).as_ref().and_then(coerce_bool)
}

fn field_int(sub: Option<&Value>, key: &str) -> Option<i64> {
    field(sub, key).as_ref().and_then(coerce_int)
}

/// Firmware versions disagree on field types: booleans arrive as bool,
/// 0/1 integers, floats, or strings. Anything unrecognized is treated as
/// absent rather than rejected.
pub(crate) fn coerce_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn coerce_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::Bool(b) => Some(*b as i64),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
