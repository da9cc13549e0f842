use chrono::{DateTime, Local};
use prometheus_bridge::FleetMetrics;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use telemetry_io::{DeviceLink, LinkError, RecordSink, SettingsPatch};
use thermal_core::record::epoch_seconds;
use thermal_core::{decide, Decision, DecisionRecord, PolicyConfig, Sample, SampleWindow};
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub window_n: usize,
    /// Decide every Nth tick.
    pub apply_every_n: u64,
    /// Upper bound on one fetch or one apply.
    pub io_timeout: Duration,
}

/// Control loop state for one device: its sample window and tick counter.
///
/// Every failure inside a tick is handled here; nothing propagates to the
/// caller or to other devices.
pub struct DeviceController<L, S> {
    name: String,
    link: L,
    sink: S,
    window: SampleWindow,
    policy: Arc<PolicyConfig>,
    cadence: u64,
    ticks: u64,
    io_timeout: Duration,
    metrics: Option<Arc<FleetMetrics>>,
}

impl<L, S> DeviceController<L, S> {
    pub fn new(
        name: impl Into<String>,
        link: L,
        sink: S,
        policy: Arc<PolicyConfig>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            name: name.into(),
            link,
            sink,
            window: SampleWindow::new(settings.window_n),
            policy,
            cadence: settings.apply_every_n.max(1),
            ticks: 0,
            io_timeout: settings.io_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<FleetMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<L: DeviceLink, S: RecordSink> DeviceController<L, S> {
    /// Run one tick at wall-clock time `now`. Returns the emitted record on
    /// decision ticks.
    pub async fn tick(&mut self, now: DateTime<Local>) -> Option<DecisionRecord> {
        self.ingest(now).await;

        self.ticks += 1;
        if self.ticks % self.cadence != 0 {
            return None;
        }

        let record = self.decide_and_apply(now).await;
        self.emit(&record);
        Some(record)
    }

    async fn ingest(&mut self, now: DateTime<Local>) {
        let fetched = match timeout(self.io_timeout, self.link.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::Timeout),
        };
        match fetched {
            Ok(reading) => {
                self.window.push(Sample::from_reading(epoch_seconds(&now), reading));
                debug!(device = %self.name, window = self.window.len(), "sample ingested");
            }
            Err(e) => {
                warn!(device = %self.name, error = %e, "telemetry fetch failed, tick skipped");
                if let Some(m) = &self.metrics {
                    m.observe_fetch_failure(&self.name);
                }
            }
        }
    }

    async fn decide_and_apply(&mut self, now: DateTime<Local>) -> DecisionRecord {
        let Some(current) = self.window.latest().copied() else {
            return DecisionRecord {
                at: now,
                current: None,
                decision: Decision::no_samples(),
            };
        };

        let decision = decide(self.window.as_slice(), &self.policy);
        let patch = SettingsPatch::for_action(&decision.action);
        let decision = if patch.is_empty() {
            decision
        } else {
            match timeout(self.io_timeout, self.link.apply(patch)).await {
                Ok(Ok(())) => decision,
                Ok(Err(e)) => self.apply_failed(decision, e),
                Err(_) => self.apply_failed(decision, LinkError::Timeout),
            }
        };

        DecisionRecord {
            at: now,
            current: Some(current),
            decision,
        }
    }

    fn apply_failed(&self, decision: Decision, err: LinkError) -> Decision {
        warn!(
            device = %self.name,
            action = %decision.action,
            error = %err,
            "settings push failed, decision kept"
        );
        if let Some(m) = &self.metrics {
            m.observe_apply_failure(&self.name);
        }
        decision.with_apply_failed()
    }

    fn emit(&mut self, record: &DecisionRecord) {
        let d = &record.decision;
        info!(
            device = %self.name,
            action = %d.action,
            reason = %d.reason_text(),
            "decision"
        );
        if let Some(m) = &self.metrics {
            m.observe_decision(&self.name, d, record.current.as_ref());
        }
        if let Err(e) = self.sink.write(record.at, &record.to_line()) {
            warn!(device = %self.name, error = %e, "cannot write decision record");
        }
    }

    /// Flush and close the decision sink.
    pub fn close(&mut self) -> io::Result<()> {
        self.sink.close()
    }
}
