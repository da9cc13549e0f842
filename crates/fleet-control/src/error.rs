use std::io;
use std::path::PathBuf;
use telemetry_io::LinkError;
use thermal_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid engine policy: {0}")]
    Policy(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("device `{0}` is registered twice")]
    DuplicateDevice(String),
    #[error("cannot read metrics log: {0}")]
    Log(#[from] csv::Error),
    #[error("cannot create device link: {0}")]
    Link(#[from] LinkError),
    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}
