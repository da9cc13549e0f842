use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Static thresholds and bounds for the decision engine, read-only at runtime.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    pub freq_min: u32,
    pub freq_max: u32,
    pub freq_step: u32,
    pub vcore_min: u32,
    pub vcore_max: u32,
    pub vcore_step: u32,
    pub window_n_min_valid: usize,
    pub asic_soft: f64,
    pub asic_hard: f64,
    pub vr_soft: f64,
    pub vr_hard: f64,
    pub err_low: f64,
    pub err_high: f64,
    pub err_crit: f64,
    /// °C per second.
    pub slope_limit: f64,
    #[serde(default)]
    pub allow_ramp_up: bool,
}

impl PolicyConfig {
    /// Conservative defaults for a window of `window_n` samples.
    pub fn conservative(window_n: usize) -> Self {
        Self {
            freq_min: 400,
            freq_max: 1100,
            freq_step: 25,
            vcore_min: 1000,
            vcore_max: 1400,
            vcore_step: 10,
            window_n_min_valid: default_min_valid(window_n),
            asic_soft: 65.0,
            asic_hard: 68.0,
            vr_soft: 78.0,
            vr_hard: 82.0,
            err_low: 0.6,
            err_high: 1.0,
            err_crit: 1.3,
            slope_limit: 0.01,
            allow_ramp_up: false,
        }
    }

    pub fn validate(&self, window_n: usize) -> Result<(), ConfigError> {
        if self.freq_min > self.freq_max {
            return Err(ConfigError::invalid("freq_min", "greater than freq_max"));
        }
        if self.freq_step == 0 {
            return Err(ConfigError::invalid("freq_step", "must be positive"));
        }
        if self.vcore_min > self.vcore_max {
            return Err(ConfigError::invalid("vcore_min", "greater than vcore_max"));
        }
        if self.vcore_step == 0 {
            return Err(ConfigError::invalid("vcore_step", "must be positive"));
        }
        if self.window_n_min_valid == 0 || self.window_n_min_valid > window_n {
            return Err(ConfigError::invalid(
                "window_n_min_valid",
                format!("must be within 1..={window_n}"),
            ));
        }

        let thresholds = [
            ("asic_soft", self.asic_soft),
            ("asic_hard", self.asic_hard),
            ("vr_soft", self.vr_soft),
            ("vr_hard", self.vr_hard),
            ("err_low", self.err_low),
            ("err_high", self.err_high),
            ("err_crit", self.err_crit),
            ("slope_limit", self.slope_limit),
        ];
        for (field, value) in thresholds {
            if !value.is_finite() {
                return Err(ConfigError::invalid(field, "must be finite"));
            }
        }

        if self.asic_soft > self.asic_hard {
            return Err(ConfigError::invalid("asic_soft", "greater than asic_hard"));
        }
        if self.vr_soft > self.vr_hard {
            return Err(ConfigError::invalid("vr_soft", "greater than vr_hard"));
        }
        if self.err_low > self.err_high {
            return Err(ConfigError::invalid("err_low", "greater than err_high"));
        }
        if self.err_high > self.err_crit {
            return Err(ConfigError::invalid("err_high", "greater than err_crit"));
        }
        Ok(())
    }
}

/// `max(8, n / 2)`, never more than the window can hold.
pub fn default_min_valid(window_n: usize) -> usize {
    (window_n / 2).max(8).min(window_n)
}
