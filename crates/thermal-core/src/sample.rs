use serde::{Deserialize, Serialize};

/// One decoded device status, before it is stamped with a tick time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temp: f64,
    pub vr_temp: f64,
    pub err: f64,
    pub freq: u32,
    pub vcore: u32,
}

/// One telemetry reading as it enters a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the Unix epoch.
    pub ts: f64,
    pub temp: f64,
    pub vr_temp: f64,
    pub err: f64,
    pub freq: u32,
    pub vcore: u32,
}

impl Sample {
    pub fn from_reading(ts: f64, reading: Reading) -> Self {
        Self {
            ts,
            temp: reading.temp,
            vr_temp: reading.vr_temp,
            err: reading.err,
            freq: reading.freq,
            vcore: reading.vcore,
        }
    }
}
