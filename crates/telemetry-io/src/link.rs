use serde::Serialize;
use std::future::Future;
use thermal_core::{Action, Reading};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("status payload is missing `{0}`")]
    MissingField(&'static str),
    #[error("malformed status payload: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for LinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LinkError::Timeout
        } else {
            LinkError::Transport(err.to_string())
        }
    }
}

/// Settings pushed to a device. At most one field is ever set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
    #[serde(rename = "coreVoltage", skip_serializing_if = "Option::is_none")]
    pub core_voltage: Option<u32>,
}

impl SettingsPatch {
    pub fn for_action(action: &Action) -> Self {
        Self {
            frequency: action.new_freq(),
            core_voltage: action.new_vcore(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.is_none() && self.core_voltage.is_none()
    }
}

/// Telemetry and actuation for one device.
pub trait DeviceLink: Send {
    fn fetch(&mut self) -> impl Future<Output = Result<Reading, LinkError>> + Send;

    /// Push new settings. An empty patch must succeed without contacting
    /// the device.
    fn apply(&mut self, patch: SettingsPatch) -> impl Future<Output = Result<(), LinkError>> + Send;
}
