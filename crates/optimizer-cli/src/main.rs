//! Live thermal/error-rate optimizer for Bitaxe miners.
//!
//! `run` drives the fleet from a JSON config, `collect` records raw
//! telemetry for one device, and `backtest` replays recorded telemetry
//! through the same controller offline.

mod duration;

#[cfg(test)]
mod tests;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fleet_control::{read_metrics_logs, replay, Collector, Fleet, FleetConfig};
use prometheus_bridge::FleetMetrics;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telemetry_io::{AxeOsClient, DailyFileWriter, SingleFileSink};
use thermal_core::{PolicyConfig, DECISIONS_HEADER, METRICS_HEADER};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::duration::parse_duration;

#[derive(Parser, Debug)]
#[command(name = "bitaxe-optimizer", version, about = "Closed-loop frequency/voltage guard for Bitaxe miners")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live optimizer for every configured device.
    Run {
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
        /// Stop after this long (e.g. 3600, 30min, 2h). Runs until
        /// interrupted when omitted.
        #[arg(long)]
        duration: Option<String>,
    },
    /// Record raw telemetry from one device for later backtests.
    Collect {
        ip: String,
        /// Log folder name. Defaults to the IP.
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "bitaxe_logs")]
        outdir: PathBuf,
        /// Poll interval in seconds.
        #[arg(long, default_value_t = 5.0)]
        interval: f64,
        #[arg(long, default_value = "24h")]
        duration: String,
        /// HTTP timeout in seconds.
        #[arg(long, default_value_t = 5.0)]
        timeout: f64,
        #[arg(long, default_value_t = 30)]
        keep_days: usize,
    },
    /// Replay metrics logs through the decision engine.
    Backtest {
        /// Metrics log, repeatable; rows are replayed in the order given.
        #[arg(long = "log", required = true)]
        logs: Vec<PathBuf>,
        #[arg(long, default_value = "decisions.log")]
        out: PathBuf,
        /// Decide every Nth row. Defaults to the config's `apply_every_n`, else 12.
        #[arg(long)]
        apply_every: Option<u64>,
        /// Window length. Defaults to the config's `window_n`, else 12.
        #[arg(long)]
        window: Option<usize>,
        /// Take the engine policy from a run config instead of the defaults.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run { config, duration } => run(config, duration).await,
        Command::Collect {
            ip,
            name,
            outdir,
            interval,
            duration,
            timeout,
            keep_days,
        } => {
            let name = name.unwrap_or_else(|| ip.clone());
            let duration = parse_duration(&duration)?;
            let interval = positive_secs("--interval", interval)?;
            let timeout = positive_secs("--timeout", timeout)?;

            let link = AxeOsClient::new(&ip, timeout)?;
            let sink = DailyFileWriter::new(&outdir, &name, METRICS_HEADER, keep_days);
            let collector = Collector::new(name, link, sink, interval, timeout);
            let rows = collector
                .run(stop_on_signal(), duration)
                .await
                .context("writing metrics log")?;
            info!(rows, "collection finished");
            Ok(())
        }
        Command::Backtest {
            logs,
            out,
            apply_every,
            window,
            config,
        } => backtest(logs, out, apply_every, window, config).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn positive_secs(flag: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{flag} must be a positive number of seconds");
    }
    Duration::try_from_secs_f64(value).with_context(|| format!("{flag} out of range"))
}

async fn run(config: PathBuf, duration: Option<String>) -> Result<()> {
    let cfg = FleetConfig::load(&config).with_context(|| format!("loading {}", config.display()))?;
    let limit = duration.as_deref().map(parse_duration).transpose()?;

    let metrics = if cfg.metrics_file.is_some() {
        Some(Arc::new(FleetMetrics::new()?))
    } else {
        None
    };
    let fleet = Fleet::from_config(&cfg, metrics)?;
    info!(
        devices = fleet.len(),
        window_n = cfg.window_n,
        apply_every_n = cfg.apply_every_n,
        "configuration loaded"
    );

    fleet.run(stop_on_signal(), limit).await;
    Ok(())
}

/// Engine policy, window length and cadence for an offline replay.
#[derive(Debug, PartialEq)]
struct ReplayPlan {
    policy: PolicyConfig,
    window: usize,
    apply_every: u64,
}

/// Flags override the config; without a config the conservative defaults
/// for the chosen window apply.
fn replay_plan(
    window: Option<usize>,
    apply_every: Option<u64>,
    config: Option<&FleetConfig>,
) -> Result<ReplayPlan> {
    let window = window.or(config.map(|c| c.window_n)).unwrap_or(12);
    let apply_every = apply_every.or(config.map(|c| c.apply_every_n)).unwrap_or(12);
    if window == 0 || apply_every == 0 {
        bail!("--window and --apply-every must be at least 1");
    }
    let policy = match config {
        Some(cfg) => cfg.policy.clone(),
        None => PolicyConfig::conservative(window),
    };
    policy
        .validate(window)
        .context("engine policy does not fit the replay window")?;
    Ok(ReplayPlan {
        policy,
        window,
        apply_every,
    })
}

async fn backtest(
    logs: Vec<PathBuf>,
    out: PathBuf,
    apply_every: Option<u64>,
    window: Option<usize>,
    config: Option<PathBuf>,
) -> Result<()> {
    let cfg = match &config {
        Some(path) => Some(FleetConfig::load(path).with_context(|| format!("loading {}", path.display()))?),
        None => None,
    };
    let plan = replay_plan(window, apply_every, cfg.as_ref())?;

    let rows = read_metrics_logs(logs.as_slice())?;
    let sink = SingleFileSink::create(&out, DECISIONS_HEADER)
        .with_context(|| format!("creating {}", out.display()))?;
    let (records, _) = replay(
        &rows,
        Arc::new(plan.policy),
        plan.window,
        plan.apply_every,
        sink,
    )
    .await;

    let changes = records
        .iter()
        .filter(|r| r.decision.action.is_change())
        .count();
    info!(
        rows = rows.len(),
        decisions = records.len(),
        changes,
        window = plan.window,
        apply_every = plan.apply_every,
        out = %out.display(),
        "backtest finished"
    );
    Ok(())
}

/// Stop flag raised on Ctrl-C or SIGTERM.
fn stop_on_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });
    rx
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
