pub mod alias;
pub mod axeos;
pub mod link;
pub mod sink;


pub use alias::reading_from_status;
pub use axeos::AxeOsClient;
pub use link::{DeviceLink, LinkError, SettingsPatch};
pub use sink::{DailyFileWriter, RecordSink, SingleFileSink};
