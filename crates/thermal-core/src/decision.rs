use crate::window::Aggregates;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single directive produced by one engine invocation.
///
/// Value-carrying variants hold the proposed setting, so a frequency and a
/// voltage can never be proposed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    NoChange,
    FreqUp(u32),
    FreqDown(u32),
    VcoreUp(u32),
    VcoreDown(u32),
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Action::NoChange => "NO_CHANGE",
            Action::FreqUp(_) => "FREQ_UP",
            Action::FreqDown(_) => "FREQ_DOWN",
            Action::VcoreUp(_) => "VCORE_UP",
            Action::VcoreDown(_) => "VCORE_DOWN",
        }
    }

    pub fn new_freq(&self) -> Option<u32> {
        match *self {
            Action::FreqUp(f) | Action::FreqDown(f) => Some(f),
            _ => None,
        }
    }

    pub fn new_vcore(&self) -> Option<u32> {
        match *self {
            Action::VcoreUp(v) | Action::VcoreDown(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Action::NoChange)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Which rule produced a decision. The codes are written to decision logs
/// and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    WindowInsufficient,
    TempHard,
    AtMinLimitsTempHard,
    SlopeExceeded,
    ErrCrit,
    AtMinLimitsErrCrit,
    ErrHigh,
    Margin,
    Stable,
    NoSamples,
}

impl Reason {
    pub fn code(&self) -> &'static str {
        match self {
            Reason::WindowInsufficient => "window_insufficient",
            Reason::TempHard => "temp_hard",
            Reason::AtMinLimitsTempHard => "at_min_limits_temp_hard",
            Reason::SlopeExceeded => "slope_exceeded",
            Reason::ErrCrit => "err_crit",
            Reason::AtMinLimitsErrCrit => "at_min_limits_err_crit",
            Reason::ErrHigh => "err_high",
            Reason::Margin => "margin",
            Reason::Stable => "stable",
            Reason::NoSamples => "no_samples",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reason: Reason,
    /// Absent only when the window was too small to aggregate.
    pub aggregates: Option<Aggregates>,
    pub apply_failed: bool,
}

impl Decision {
    pub fn new(action: Action, reason: Reason, aggregates: Aggregates) -> Self {
        Self {
            action,
            reason,
            aggregates: Some(aggregates),
            apply_failed: false,
        }
    }

    pub fn insufficient() -> Self {
        Self {
            action: Action::NoChange,
            reason: Reason::WindowInsufficient,
            aggregates: None,
            apply_failed: false,
        }
    }

    /// Outcome of a decision cycle that had no samples to look at.
    pub fn no_samples() -> Self {
        Self {
            action: Action::NoChange,
            reason: Reason::NoSamples,
            aggregates: None,
            apply_failed: false,
        }
    }

    /// Copy of this decision marked as computed but not applied.
    pub fn with_apply_failed(&self) -> Self {
        Self {
            apply_failed: true,
            ..*self
        }
    }

    /// Reason as written to the decision log, including the apply marker.
    pub fn reason_text(&self) -> String {
        if self.apply_failed {
            format!("{}|apply_failed", self.reason.code())
        } else {
            self.reason.code().to_string()
        }
    }
}
