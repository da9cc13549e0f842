use crate::config::FleetConfig;
use crate::controller::DeviceController;
use crate::error::FleetError;
use crate::registry::DeviceRegistry;
use chrono::Local;
use prometheus_bridge::FleetMetrics;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use telemetry_io::{AxeOsClient, DailyFileWriter, DeviceLink, RecordSink};
use thermal_core::DECISIONS_HEADER;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Every registered device on a shared poll interval, one task per device.
pub struct Fleet<L, S> {
    registry: DeviceRegistry<L, S>,
    poll_interval: Duration,
    metrics: Option<Arc<FleetMetrics>>,
    metrics_file: Option<PathBuf>,
}

impl Fleet<AxeOsClient, DailyFileWriter> {
    /// Build the live fleet: one AxeOS client and one daily decisions log
    /// per configured device.
    pub fn from_config(cfg: &FleetConfig, metrics: Option<Arc<FleetMetrics>>) -> Result<Self, FleetError> {
        let policy = Arc::new(cfg.policy.clone());
        let settings = cfg.controller_settings();
        let mut registry = DeviceRegistry::new();

        for d in &cfg.devices {
            let link = AxeOsClient::new(&d.ip, cfg.timeout)?;
            let sink = DailyFileWriter::new(cfg.decisions_dir(), &d.name, DECISIONS_HEADER, cfg.keep_days);
            let mut ctl = DeviceController::new(d.name.clone(), link, sink, policy.clone(), settings);
            if let Some(m) = &metrics {
                ctl = ctl.with_metrics(m.clone());
            }
            registry.register(ctl)?;
        }

        let mut fleet = Fleet::new(registry, cfg.poll_interval);
        if let (Some(m), Some(path)) = (metrics, cfg.metrics_file.clone()) {
            fleet = fleet.with_metrics_file(m, path);
        }
        Ok(fleet)
    }
}

impl<L, S> Fleet<L, S>
where
    L: DeviceLink + 'static,
    S: RecordSink + 'static,
{
    pub fn new(registry: DeviceRegistry<L, S>, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval,
            metrics: None,
            metrics_file: None,
        }
    }

    /// Periodically write the text exposition of `metrics` to `path`.
    pub fn with_metrics_file(mut self, metrics: Arc<FleetMetrics>, path: PathBuf) -> Self {
        self.metrics = Some(metrics);
        self.metrics_file = Some(path);
        self
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Run until `stop` turns true (or its sender is dropped) or `limit`
    /// elapses. Every device sink is closed before this returns; the
    /// controllers come back in registration order.
    pub async fn run(
        self,
        mut stop: watch::Receiver<bool>,
        limit: Option<Duration>,
    ) -> Vec<DeviceController<L, S>> {
        let (halt_tx, halt_rx) = watch::channel(false);
        let period = self.poll_interval;

        let names: Vec<&str> = self.registry.names().collect();
        info!(devices = ?names, period_s = period.as_secs_f64(), "fleet starting");

        let relay = tokio::spawn(async move {
            let deadline = async {
                match limit {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = stopped(&mut stop) => info!("stop requested"),
                _ = deadline => info!("run duration elapsed"),
            }
            let _ = halt_tx.send(true);
        });

        let exporter = match (self.metrics, self.metrics_file) {
            (Some(m), Some(path)) => Some(tokio::spawn(export_metrics(m, path, period, halt_rx.clone()))),
            _ => None,
        };

        let handles: Vec<_> = self
            .registry
            .into_controllers()
            .into_iter()
            .map(|ctl| tokio::spawn(drive(ctl, period, halt_rx.clone())))
            .collect();

        let mut controllers = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(ctl) => controllers.push(ctl),
                Err(e) => error!(error = %e, "device task failed"),
            }
        }
        if let Some(exporter) = exporter {
            let _ = exporter.await;
        }
        relay.abort();
        info!("fleet stopped");
        controllers
    }
}

/// Resolves once the stop flag is set or its sender is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn drive<L, S>(
    mut ctl: DeviceController<L, S>,
    period: Duration,
    mut halt: watch::Receiver<bool>,
) -> DeviceController<L, S>
where
    L: DeviceLink,
    S: RecordSink,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut halt) => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            biased;
            _ = stopped(&mut halt) => {
                debug!(device = %ctl.name(), "in-flight tick abandoned");
                break;
            }
            _ = ctl.tick(Local::now()) => {}
        }
    }

    if let Err(e) = ctl.close() {
        warn!(device = %ctl.name(), error = %e, "cannot close decision log");
    }
    ctl
}

async fn export_metrics(
    metrics: Arc<FleetMetrics>,
    path: PathBuf,
    period: Duration,
    mut halt: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut halt) => break,
            _ = ticker.tick() => write_metrics(&metrics, &path),
        }
    }
    write_metrics(&metrics, &path);
}

fn write_metrics(metrics: &FleetMetrics, path: &Path) {
    let text = match metrics.render() {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "cannot render metrics");
            return;
        }
    };
    // Write then rename so scrapers never see a partial file.
    let tmp = path.with_extension("prom.tmp");
    let result = std::fs::write(&tmp, text).and_then(|_| std::fs::rename(&tmp, path));
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "cannot write metrics file");
    }
}
