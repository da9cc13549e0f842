pub mod decision;
pub mod engine;
pub mod policy;
pub mod record;
pub mod sample;
pub mod window;


pub use decision::{Action, Decision, Reason};
pub use engine::decide;
pub use policy::{ConfigError, PolicyConfig};
pub use record::{DecisionRecord, MetricsRow, DECISIONS_HEADER, METRICS_HEADER};
pub use sample::{Reading, Sample};
pub use window::{Aggregates, SampleWindow};
