pub mod collector;
pub mod config;
pub mod controller;
pub mod error;
pub mod fleet;
pub mod registry;
pub mod replay;

#[cfg(test)]
mod tests;

pub use collector::Collector;
pub use config::{DeviceEntry, FleetConfig};
pub use controller::{ControllerSettings, DeviceController};
pub use error::FleetError;
pub use fleet::Fleet;
pub use registry::DeviceRegistry;
pub use replay::{read_metrics_logs, replay, ReplayLink};
