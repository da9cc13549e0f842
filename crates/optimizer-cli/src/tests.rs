use crate::duration::{parse_duration, DurationError};
use crate::replay_plan;
use fleet_control::FleetConfig;
use std::time::Duration;
use thermal_core::PolicyConfig;

#[test]
fn bare_digits_are_seconds() {
    assert_eq!(parse_duration("3600"), Ok(Duration::from_secs(3600)));
    assert_eq!(parse_duration(" 42 "), Ok(Duration::from_secs(42)));
}

#[test]
fn units_scale_the_count() {
    assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
    assert_eq!(parse_duration("10min"), Ok(Duration::from_secs(600)));
    assert_eq!(parse_duration("2 H"), Ok(Duration::from_secs(7200)));
    assert_eq!(parse_duration("1d"), Ok(Duration::from_secs(86_400)));
    assert_eq!(parse_duration("3hours"), Ok(Duration::from_secs(10_800)));
}

#[test]
fn malformed_durations_are_rejected() {
    assert_eq!(parse_duration("h"), Err(DurationError::Format("h".into())));
    assert_eq!(parse_duration("5 fortnights"), Err(DurationError::Unit("fortnights".into())));
    assert!(parse_duration("1.5h").is_err());
    assert!(parse_duration("").is_err());
}

const WIDE_CONFIG: &str = r#"{
    "window_n": 30,
    "apply_every_n": 6,
    "devices": [{"name": "bitaxe-1", "ip": "10.0.0.2"}],
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
fn replay_plan_takes_window_and_cadence_from_config() {
    let cfg = FleetConfig::from_json_str(WIDE_CONFIG).unwrap();
    let plan = replay_plan(None, None, Some(&cfg)).unwrap();
    assert_eq!(plan.window, 30);
    assert_eq!(plan.apply_every, 6);
    assert_eq!(plan.policy.window_n_min_valid, 15);
}

#[test]
fn replay_plan_flags_override_config() {
    let cfg = FleetConfig::from_json_str(WIDE_CONFIG).unwrap();
    let plan = replay_plan(Some(40), Some(3), Some(&cfg)).unwrap();
    assert_eq!((plan.window, plan.apply_every), (40, 3));

    // The config's minimum of 15 valid samples cannot fit a window of 12.
    assert!(replay_plan(Some(12), None, Some(&cfg)).is_err());
}

#[test]
fn replay_plan_without_config_uses_conservative_policy() {
    let plan = replay_plan(None, None, None).unwrap();
    assert_eq!(plan.window, 12);
    assert_eq!(plan.apply_every, 12);
    assert_eq!(plan.policy, PolicyConfig::conservative(12));
    assert!(replay_plan(Some(0), None, None).is_err());
}
