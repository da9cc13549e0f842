use crate::link::LinkError;
use serde_json::Value;
use thermal_core::Reading;

// Firmware revisions disagree on key spelling; first present key wins.
pub const TEMP_KEYS: &[&str] = &["temp", "asicTemp", "asic_temp"];
pub const VR_TEMP_KEYS: &[&str] = &["vrTemp", "vrmTemp", "vr_temp", "vrm_temp"];
pub const ERROR_KEYS: &[&str] = &["errorPercentage", "errorPercent", "error_percentage", "errPercent"];
pub const FREQ_KEYS: &[&str] = &["frequency", "freq", "asicFrequency"];
pub const VCORE_KEYS: &[&str] = &["coreVoltage", "core_voltage", "vcore", "voltage"];

fn pick<'a>(status: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| status.get(*k))
        .find(|v| !v.is_null())
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_field(status: &Value, keys: &[&str], name: &'static str) -> Result<f64, LinkError> {
    let raw = pick(status, keys).ok_or(LinkError::MissingField(name))?;
    number(raw)
        .filter(|v| v.is_finite())
        .ok_or_else(|| LinkError::Malformed(format!("{name}={raw}")))
}

fn int_field(status: &Value, keys: &[&str], name: &'static str) -> Result<u32, LinkError> {
    let value = float_field(status, keys, name)?.trunc();
    if value < 0.0 || value > f64::from(u32::MAX) {
        return Err(LinkError::Malformed(format!("{name} out of range: {value}")));
    }
    Ok(value as u32)
}

/// Resolve a raw status document into a reading.
pub fn reading_from_status(status: &Value) -> Result<Reading, LinkError> {
    Ok(Reading {
        temp: float_field(status, TEMP_KEYS, "temp")?,
        vr_temp: float_field(status, VR_TEMP_KEYS, "vrTemp")?,
        err: float_field(status, ERROR_KEYS, "errorPercentage")?,
        freq: int_field(status, FREQ_KEYS, "frequency")?,
        vcore: int_field(status, VCORE_KEYS, "coreVoltage")?,
    })
}
