use crate::controller::{ControllerSettings, DeviceController};
use crate::error::FleetError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use telemetry_io::{DeviceLink, LinkError, RecordSink, SettingsPatch};
use thermal_core::record::FIELD_SEPARATOR;
use thermal_core::{DecisionRecord, MetricsRow, PolicyConfig, Reading};
use tracing::debug;

/// Device stand-in fed from recorded readings. `None` entries replay as
/// failed polls; settings pushes always succeed.
pub struct ReplayLink {
    readings: std::vec::IntoIter<Option<Reading>>,
}

impl ReplayLink {
    pub fn new(readings: Vec<Option<Reading>>) -> Self {
        Self {
            readings: readings.into_iter(),
        }
    }
}

impl DeviceLink for ReplayLink {
    async fn fetch(&mut self) -> Result<Reading, LinkError> {
        self.readings
            .next()
            .flatten()
            .ok_or_else(|| LinkError::Transport("no recorded reading".into()))
    }

    async fn apply(&mut self, _patch: SettingsPatch) -> Result<(), LinkError> {
        Ok(())
    }
}

/// Read metrics logs in order, skipping each header and any row that
/// cannot be placed in time.
pub fn read_metrics_logs<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<MetricsRow>, FleetError> {
    let mut rows = Vec::new();
    for path in paths {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(FIELD_SEPARATOR as u8)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;
        for record in reader.records() {
            let record = record?;
            let fields: Vec<&str> = record.iter().collect();
            match MetricsRow::from_fields(&fields) {
                Some(row) => rows.push(row),
                None => debug!(line = ?record.position().map(|p| p.line()), "skipping unusable row"),
            }
        }
    }
    Ok(rows)
}

/// Run recorded rows through the same controller the live fleet uses,
/// one tick per row at the row's timestamp.
pub async fn replay<S: RecordSink>(
    rows: &[MetricsRow],
    policy: Arc<PolicyConfig>,
    window_n: usize,
    apply_every_n: u64,
    sink: S,
) -> (Vec<DecisionRecord>, S) {
    let link = ReplayLink::new(rows.iter().map(|r| r.reading).collect());
    let settings = ControllerSettings {
        window_n,
        apply_every_n,
        io_timeout: Duration::from_secs(60),
    };
    let mut ctl = DeviceController::new("replay", link, sink, policy, settings);

    let mut records = Vec::new();
    for row in rows {
        if let Some(record) = ctl.tick(row.at).await {
            records.push(record);
        }
    }
    if let Err(e) = ctl.close() {
        tracing::warn!(error = %e, "cannot close replay output");
    }
    (records, ctl.into_sink())
}
