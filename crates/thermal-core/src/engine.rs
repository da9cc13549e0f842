use crate::decision::{Action, Decision, Reason};
use crate::policy::PolicyConfig;
use crate::sample::Sample;
use crate::window::Aggregates;

/// Decide one action for a window of samples, oldest first.
///
/// Pure: the result depends only on `window` and `cfg`. Rules are checked in
/// priority order and downward moves always win over ramping up. A lever that
/// is already at its bound yields `NoChange` with a saturation reason instead
/// of an error.
pub fn decide(window: &[Sample], cfg: &PolicyConfig) -> Decision {
    if window.len() < cfg.window_n_min_valid {
        return Decision::insufficient();
    }
    let (Some(agg), Some(current)) = (Aggregates::from_samples(window), window.last()) else {
        return Decision::insufficient();
    };

    let levers = Levers {
        cfg,
        freq: current.freq,
        vcore: current.vcore,
    };
    let hot_hard = agg.temp_avg >= cfg.asic_hard || agg.vr_temp_avg >= cfg.vr_hard;
    let hot_soft = agg.temp_avg >= cfg.asic_soft || agg.vr_temp_avg >= cfg.vr_soft;

    // 1. Hard thermal limit: frequency first, then voltage.
    if hot_hard {
        let action = levers
            .freq_down()
            .or_else(|| levers.vcore_down())
            .unwrap_or(Action::NoChange);
        let reason = if action.is_change() {
            Reason::TempHard
        } else {
            Reason::AtMinLimitsTempHard
        };
        return Decision::new(action, reason, agg);
    }

    // 2. Rising temperature near the soft limit. Frequency only; a saturated
    // frequency falls through to the error rules.
    if agg.slope >= cfg.slope_limit && hot_soft {
        if let Some(action) = levers.freq_down() {
            return Decision::new(action, Reason::SlopeExceeded, agg);
        }
    }

    // 3. Critical error rate: frequency, then voltage.
    if agg.err_avg >= cfg.err_crit {
        let action = levers
            .freq_down()
            .or_else(|| levers.vcore_down())
            .unwrap_or(Action::NoChange);
        let reason = if action.is_change() {
            Reason::ErrCrit
        } else {
            Reason::AtMinLimitsErrCrit
        };
        return Decision::new(action, reason, agg);
    }

    // 4. Elevated error rate: frequency only.
    if agg.err_avg >= cfg.err_high {
        if let Some(action) = levers.freq_down() {
            return Decision::new(action, Reason::ErrHigh, agg);
        }
    }

    // 5. Gentle ramp-up once everything else is clear.
    if cfg.allow_ramp_up
        && agg.err_avg <= cfg.err_low
        && agg.temp_avg <= cfg.asic_soft
        && agg.vr_temp_avg <= cfg.vr_soft
        && agg.slope < cfg.slope_limit
    {
        if let Some(action) = levers.freq_up() {
            return Decision::new(action, Reason::Margin, agg);
        }
    }

    Decision::new(Action::NoChange, Reason::Stable, agg)
}

/// Clamp `value + delta` into `[lo, hi]` without wrapping.
pub fn clamp_step(value: u32, delta: i64, lo: u32, hi: u32) -> u32 {
    let target = i64::from(value) + delta;
    target.clamp(i64::from(lo), i64::from(hi)) as u32
}

/// Current operating point plus the bounds it may move within.
struct Levers<'a> {
    cfg: &'a PolicyConfig,
    freq: u32,
    vcore: u32,
}

impl Levers<'_> {
    fn freq_down(&self) -> Option<Action> {
        let next = clamp_step(
            self.freq,
            -i64::from(self.cfg.freq_step),
            self.cfg.freq_min,
            self.cfg.freq_max,
        );
        (next < self.freq).then_some(Action::FreqDown(next))
    }

    fn freq_up(&self) -> Option<Action> {
        let next = clamp_step(
            self.freq,
            i64::from(self.cfg.freq_step),
            self.cfg.freq_min,
            self.cfg.freq_max,
        );
        (next > self.freq).then_some(Action::FreqUp(next))
    }

    fn vcore_down(&self) -> Option<Action> {
        let next = clamp_step(
            self.vcore,
            -i64::from(self.cfg.vcore_step),
            self.cfg.vcore_min,
            self.cfg.vcore_max,
        );
        (next < self.vcore).then_some(Action::VcoreDown(next))
    }
}
