use crate::{Collector, ControllerSettings, DeviceController, DeviceRegistry, Fleet, FleetConfig, FleetError};
use chrono::{DateTime, Local, TimeZone};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use telemetry_io::{DailyFileWriter, DeviceLink, LinkError, RecordSink, SettingsPatch};
use thermal_core::{MetricsRow, PolicyConfig, Reading, METRICS_HEADER};
use tokio::sync::watch;

struct ScriptedLink {
    script: VecDeque<Result<Reading, LinkError>>,
    steady: Option<Reading>,
    fetch_delay: Option<Duration>,
    fail_apply: bool,
    applied: Vec<SettingsPatch>,
}

impl ScriptedLink {
    fn scripted(script: Vec<Result<Reading, LinkError>>) -> Self {
        Self {
            script: script.into(),
            steady: None,
            fetch_delay: None,
            fail_apply: false,
            applied: Vec::new(),
        }
    }

    fn steady(reading: Reading) -> Self {
        Self {
            steady: Some(reading),
            ..Self::scripted(Vec::new())
        }
    }
}

impl DeviceLink for ScriptedLink {
    async fn fetch(&mut self) -> Result<Reading, LinkError> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.pop_front() {
            Some(result) => result,
            None => self
                .steady
                .ok_or_else(|| LinkError::Transport("script exhausted".into())),
        }
    }

    async fn apply(&mut self, patch: SettingsPatch) -> Result<(), LinkError> {
        self.applied.push(patch);
        if self.fail_apply {
            Err(LinkError::Transport("rejected".into()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    lines: Vec<String>,
    closed: bool,
}

impl RecordSink for RecordingSink {
    fn write(&mut self, _at: DateTime<Local>, line: &str) -> io::Result<()> {
        self.closed = false;
        self.lines.push(line.to_string());
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

fn reading(temp: f64, freq: u32) -> Reading {
    Reading {
        temp,
        vr_temp: 60.0,
        err: 0.2,
        freq,
        vcore: 1200,
    }
}

fn at(i: i64) -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 1, 16, 12, 0, 0).unwrap() + chrono::Duration::seconds(5 * i)
}

fn settings(window_n: usize, apply_every_n: u64) -> ControllerSettings {
    ControllerSettings {
        window_n,
        apply_every_n,
        io_timeout: Duration::from_secs(2),
    }
}

fn controller(
    link: ScriptedLink,
    window_n: usize,
    apply_every_n: u64,
) -> DeviceController<ScriptedLink, RecordingSink> {
    DeviceController::new(
        "bitaxe-1",
        link,
        RecordingSink::default(),
        Arc::new(PolicyConfig::conservative(window_n)),
        settings(window_n, apply_every_n),
    )
}

#[tokio::test]
async fn decides_only_on_cadence_ticks() {
    let mut ctl = controller(ScriptedLink::steady(reading(55.0, 600)), 4, 3);
    let mut emitted = Vec::new();
    for i in 0..9 {
        emitted.push(ctl.tick(at(i)).await.is_some());
    }
    assert_eq!(emitted, vec![false, false, true, false, false, true, false, false, true]);
    assert_eq!(ctl.ticks(), 9);
    assert_eq!(ctl.window_len(), 4);
    assert_eq!(ctl.sink().lines.len(), 3);
}

#[tokio::test]
async fn early_decision_reports_insufficient_window() {
    let mut ctl = controller(ScriptedLink::steady(reading(75.0, 600)), 12, 2);
    let record = ctl.tick(at(0)).await;
    assert!(record.is_none());
    let record = ctl.tick(at(1)).await.unwrap();
    assert!(record.to_line().ends_with(";600;1200;NO_CHANGE;NA;NA;window_insufficient"));
    assert!(ctl.link().applied.is_empty());
}

#[tokio::test]
async fn empty_window_emits_no_samples() {
    let mut ctl = controller(ScriptedLink::scripted(Vec::new()), 4, 2);
    assert!(ctl.tick(at(0)).await.is_none());
    let record = ctl.tick(at(1)).await.unwrap();
    assert_eq!(
        record.to_line(),
        "2026-01-16 12:00:05;NA;NA;NA;NA;NA;NA;NO_CHANGE;NA;NA;no_samples"
    );
    assert_eq!(ctl.window_len(), 0);
}

#[tokio::test]
async fn failed_fetch_leaves_window_unchanged() {
    let script = vec![
        Ok(reading(55.0, 600)),
        Err(LinkError::MissingField("vrTemp")),
        Err(LinkError::Timeout),
        Ok(reading(56.0, 600)),
    ];
    let mut ctl = controller(ScriptedLink::scripted(script), 4, 100);
    let mut lens = Vec::new();
    for i in 0..4 {
        ctl.tick(at(i)).await;
        lens.push(ctl.window_len());
    }
    assert_eq!(lens, vec![1, 1, 1, 2]);
    assert_eq!(ctl.ticks(), 4);
}

#[tokio::test]
async fn hot_window_pushes_frequency_step() {
    let mut ctl = controller(ScriptedLink::steady(reading(70.0, 600)), 4, 4);
    let mut last = None;
    for i in 0..4 {
        last = ctl.tick(at(i)).await;
    }
    let record = last.unwrap();
    assert!(record.to_line().ends_with(";FREQ_DOWN;575;NA;temp_hard"));
    assert_eq!(
        ctl.link().applied,
        vec![SettingsPatch {
            frequency: Some(575),
            core_voltage: None
        }]
    );
}

#[tokio::test]
async fn apply_failure_keeps_decision_and_marks_reason() {
    let mut link = ScriptedLink::steady(reading(70.0, 600));
    link.fail_apply = true;
    let mut ctl = controller(link, 4, 4);
    let mut last = None;
    for i in 0..4 {
        last = ctl.tick(at(i)).await;
    }
    let line = last.unwrap().to_line();
    assert!(line.ends_with(";FREQ_DOWN;575;NA;temp_hard|apply_failed"), "{line}");

    // The controller keeps going on the next cycle.
    for i in 4..8 {
        ctl.tick(at(i)).await;
    }
    assert_eq!(ctl.sink().lines.len(), 2);
}

#[tokio::test]
async fn stable_decision_never_contacts_device() {
    let mut ctl = controller(ScriptedLink::steady(reading(55.0, 600)), 4, 4);
    for i in 0..8 {
        ctl.tick(at(i)).await;
    }
    assert!(ctl.link().applied.is_empty());
    assert!(ctl.sink().lines.iter().all(|l| l.ends_with(";NO_CHANGE;NA;NA;stable")));
}

#[tokio::test(start_paused = true)]
async fn stuck_fetch_is_bounded_by_timeout() {
    let mut link = ScriptedLink::steady(reading(55.0, 600));
    link.fetch_delay = Some(Duration::from_secs(3600));
    let mut ctl = controller(link, 4, 1);

    let started = tokio::time::Instant::now();
    let record = ctl.tick(at(0)).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(record.to_line().ends_with("no_samples"));
}

#[test]
fn registry_rejects_duplicate_names() {
    let mut registry = DeviceRegistry::new();
    registry
        .register(controller(ScriptedLink::scripted(Vec::new()), 4, 1))
        .unwrap();
    let err = registry
        .register(controller(ScriptedLink::scripted(Vec::new()), 4, 1))
        .unwrap_err();
    assert!(matches!(err, FleetError::DuplicateDevice(name) if name == "bitaxe-1"));
    assert_eq!(registry.len(), 1);
    assert!(registry.get("bitaxe-1").is_some());
    assert_eq!(registry.names().collect::<Vec<_>>(), ["bitaxe-1"]);
}

#[tokio::test(start_paused = true)]
async fn slow_device_does_not_starve_the_fleet() {
    let mut registry = DeviceRegistry::new();

    let fast = DeviceController::new(
        "fast",
        ScriptedLink::steady(reading(55.0, 600)),
        RecordingSink::default(),
        Arc::new(PolicyConfig::conservative(4)),
        settings(4, 4),
    );
    let mut stuck_link = ScriptedLink::steady(reading(55.0, 600));
    stuck_link.fetch_delay = Some(Duration::from_secs(3600));
    let stuck = DeviceController::new(
        "stuck",
        stuck_link,
        RecordingSink::default(),
        Arc::new(PolicyConfig::conservative(4)),
        settings(4, 4),
    );
    registry.register(fast).unwrap();
    registry.register(stuck).unwrap();

    let (_stop_tx, stop_rx) = watch::channel(false);
    let fleet = Fleet::new(registry, Duration::from_secs(5));
    let controllers = fleet.run(stop_rx, Some(Duration::from_secs(61))).await;

    assert_eq!(controllers.len(), 2);
    let (fast, stuck) = (&controllers[0], &controllers[1]);
    assert_eq!(fast.name(), "fast");
    assert!(fast.ticks() >= 12, "fast device ticked {} times", fast.ticks());
    assert!(fast.sink().lines.iter().all(|l| l.ends_with("stable")));
    assert!(stuck.ticks() >= 8, "stuck device ticked {} times", stuck.ticks());
    assert!(stuck.sink().lines.iter().all(|l| l.ends_with("no_samples")));
    assert!(fast.sink().closed && stuck.sink().closed);
}

#[tokio::test(start_paused = true)]
async fn stop_signal_closes_every_sink() {
    let mut registry = DeviceRegistry::new();
    registry
        .register(controller(ScriptedLink::steady(reading(55.0, 600)), 4, 2))
        .unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let fleet = Fleet::new(registry, Duration::from_secs(5));

    let run = tokio::spawn(fleet.run(stop_rx, None));
    tokio::time::sleep(Duration::from_secs(22)).await;
    stop_tx.send(true).unwrap();
    let controllers = run.await.unwrap();

    assert_eq!(controllers[0].ticks(), 5);
    assert_eq!(controllers[0].sink().lines.len(), 2);
    assert!(controllers[0].sink().closed);
}

#[tokio::test(start_paused = true)]
async fn collector_records_failed_polls_as_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let script = vec![
        Ok(reading(55.0, 600)),
        Err(LinkError::Timeout),
        Ok(reading(56.5, 575)),
    ];
    let collector = Collector::new(
        "bitaxe-1",
        ScriptedLink::scripted(script),
        DailyFileWriter::new(dir.path(), "bitaxe-1", METRICS_HEADER, 30),
        Duration::from_secs(5),
        Duration::from_secs(2),
    );
    let (_stop_tx, stop_rx) = watch::channel(false);
    let rows = collector.run(stop_rx, Duration::from_secs(12)).await.unwrap();
    assert_eq!(rows, 3);

    let mut logs: Vec<_> = fs::read_dir(dir.path().join("bitaxe-1"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    logs.sort();
    let lines: Vec<String> = logs
        .iter()
        .flat_map(|p| {
            fs::read_to_string(p)
                .unwrap()
                .lines()
                .filter(|l| *l != METRICS_HEADER)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with(";55;60;0.2;600;1200"), "{}", lines[0]);
    assert!(lines[1].ends_with(";NA;NA;NA;NA;NA"), "{}", lines[1]);

    let parsed = MetricsRow::from_fields(&lines[1].split(';').collect::<Vec<_>>()).unwrap();
    assert_eq!(parsed.reading, None);
}

const CONFIG: &str = r#"{
    "logs_dir": "/var/log/bitaxe",
    "window_n": 20,
    "devices": [
        {"name": "alpha", "ip": "10.0.0.2"},
        {"name": "beta", "ip": "10.0.0.3"}
    ],
    "engine": {
        "freq_min": 400, "freq_max": 1100, "freq_step": 25,
        "vcore_min": 1000, "vcore_max": 1400, "vcore_step": 10,
        "asic_soft": 65.0, "asic_hard": 68.0,
        "vr_soft": 78.0, "vr_hard": 82.0,
        "err_low": 0.6, "err_high": 1.0, "err_crit": 1.3,
        "slope_limit": 0.01
    }
}"#;

#[test]
fn config_fills_defaults() {
    let cfg = FleetConfig::from_json_str(CONFIG).unwrap();
    assert_eq!(cfg.window_n, 20);
    assert_eq!(cfg.apply_every_n, 12);
    assert_eq!(cfg.poll_interval, Duration::from_secs(5));
    assert_eq!(cfg.keep_days, 30);
    assert_eq!(cfg.policy.window_n_min_valid, 10);
    assert!(!cfg.policy.allow_ramp_up);
    assert_eq!(cfg.devices.len(), 2);
    assert_eq!(cfg.decisions_dir(), std::path::PathBuf::from("/var/log/bitaxe/decisions"));
}

#[test]
fn config_missing_threshold_is_fatal() {
    let broken = CONFIG.replace(r#""err_crit": 1.3,"#, "");
    assert!(matches!(FleetConfig::from_json_str(&broken), Err(FleetError::Json(_))));
}

#[test]
fn config_rejects_inconsistent_policy() {
    let broken = CONFIG.replace(r#""asic_hard": 68.0"#, r#""asic_hard": 60.0"#);
    assert!(matches!(FleetConfig::from_json_str(&broken), Err(FleetError::Policy(_))));
}

#[test]
fn config_rejects_duplicate_devices_and_bad_cadence() {
    let dup = CONFIG.replace(r#""name": "beta""#, r#""name": "alpha""#);
    assert!(matches!(
        FleetConfig::from_json_str(&dup),
        Err(FleetError::DuplicateDevice(name)) if name == "alpha"
    ));

    let zero = CONFIG.replace(r#""window_n": 20,"#, r#""window_n": 20, "apply_every_n": 0,"#);
    assert!(matches!(FleetConfig::from_json_str(&zero), Err(FleetError::Config(_))));

    let no_devices = CONFIG.replace(
        r#"{"name": "alpha", "ip": "10.0.0.2"},
        {"name": "beta", "ip": "10.0.0.3"}"#,
        "",
    );
    assert!(matches!(FleetConfig::from_json_str(&no_devices), Err(FleetError::Config(_))));
}
