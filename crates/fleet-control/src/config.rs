use crate::controller::ControllerSettings;
use crate::error::FleetError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thermal_core::policy::default_min_valid;
use thermal_core::PolicyConfig;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceEntry {
    pub name: String,
    pub ip: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_logs_dir")]
    logs_dir: PathBuf,
    #[serde(default = "default_window_n")]
    window_n: usize,
    #[serde(default = "default_apply_every_n")]
    apply_every_n: u64,
    #[serde(default = "default_seconds")]
    poll_interval_s: f64,
    #[serde(default = "default_seconds")]
    timeout_s: f64,
    #[serde(default = "default_keep_days")]
    keep_days: usize,
    #[serde(default)]
    metrics_file: Option<PathBuf>,
    devices: Vec<DeviceEntry>,
    engine: Map<String, Value>,
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("bitaxe_logs")
}

fn default_window_n() -> usize {
    12
}

fn default_apply_every_n() -> u64 {
    12
}

fn default_seconds() -> f64 {
    5.0
}

fn default_keep_days() -> usize {
    30
}

/// Validated process configuration. Loaded once; any error is fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetConfig {
    pub logs_dir: PathBuf,
    pub window_n: usize,
    pub apply_every_n: u64,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub keep_days: usize,
    pub metrics_file: Option<PathBuf>,
    pub devices: Vec<DeviceEntry>,
    pub policy: PolicyConfig,
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self, FleetError> {
        let text = fs::read_to_string(path).map_err(|source| FleetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, FleetError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, FleetError> {
        if raw.window_n == 0 {
            return Err(FleetError::Config("window_n must be at least 1".into()));
        }
        if raw.apply_every_n == 0 {
            return Err(FleetError::Config("apply_every_n must be at least 1".into()));
        }
        let poll_interval = positive_seconds("poll_interval_s", raw.poll_interval_s)?;
        let timeout = positive_seconds("timeout_s", raw.timeout_s)?;

        if raw.devices.is_empty() {
            return Err(FleetError::Config("no devices configured".into()));
        }
        let mut seen = HashSet::new();
        for d in &raw.devices {
            if d.name.trim().is_empty() || d.ip.trim().is_empty() {
                return Err(FleetError::Config("device name and ip must be non-empty".into()));
            }
            if !seen.insert(d.name.as_str()) {
                return Err(FleetError::DuplicateDevice(d.name.clone()));
            }
        }

        let mut engine = raw.engine;
        engine
            .entry("window_n_min_valid")
            .or_insert_with(|| Value::from(default_min_valid(raw.window_n)));
        let policy: PolicyConfig = serde_json::from_value(Value::Object(engine))?;
        policy.validate(raw.window_n)?;

        Ok(Self {
            logs_dir: raw.logs_dir,
            window_n: raw.window_n,
            apply_every_n: raw.apply_every_n,
            poll_interval,
            timeout,
            keep_days: raw.keep_days.max(1),
            metrics_file: raw.metrics_file,
            devices: raw.devices,
            policy,
        })
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            window_n: self.window_n,
            apply_every_n: self.apply_every_n,
            io_timeout: self.timeout,
        }
    }

    pub fn decisions_dir(&self) -> PathBuf {
        self.logs_dir.join("decisions")
    }
}

fn positive_seconds(field: &str, value: f64) -> Result<Duration, FleetError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(FleetError::Config(format!("{field} must be a positive number of seconds")));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| FleetError::Config(format!("{field}: {e}")))
}
