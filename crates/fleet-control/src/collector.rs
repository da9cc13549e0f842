use chrono::Local;
use std::io;
use std::time::Duration;
use telemetry_io::{DeviceLink, LinkError, RecordSink};
use thermal_core::MetricsRow;
use tokio::sync::watch;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Polls one device and records raw readings for later replay. Never
/// actuates.
pub struct Collector<L, S> {
    name: String,
    link: L,
    sink: S,
    poll_interval: Duration,
    io_timeout: Duration,
}

impl<L: DeviceLink, S: RecordSink> Collector<L, S> {
    pub fn new(name: impl Into<String>, link: L, sink: S, poll_interval: Duration, io_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            link,
            sink,
            poll_interval,
            io_timeout,
        }
    }

    /// Poll until `duration` has elapsed or `stop` fires. Returns the number
    /// of rows written, failed polls included.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>, duration: Duration) -> io::Result<u64> {
        let end = Instant::now() + duration;
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut rows = 0u64;

        info!(device = %self.name, duration_s = duration.as_secs(), "collector starting");
        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                _ = ticker.tick() => {}
            }
            if Instant::now() >= end || *stop.borrow() {
                break;
            }

            let now = Local::now();
            let fetched = match timeout(self.io_timeout, self.link.fetch()).await {
                Ok(result) => result,
                Err(_) => Err(LinkError::Timeout),
            };
            let reading = match fetched {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(device = %self.name, error = %e, "poll failed");
                    None
                }
            };

            let row = MetricsRow { at: now, reading };
            if let Err(e) = self.sink.write(now, &row.to_line()) {
                warn!(device = %self.name, error = %e, "cannot write metrics row");
                continue;
            }
            rows += 1;
        }

        self.sink.close()?;
        info!(device = %self.name, rows, "collector stopped");
        Ok(rows)
    }
}
