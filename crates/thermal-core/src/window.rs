use crate::sample::Sample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bounded FIFO of samples for one device, oldest first.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Window contents as one ordered slice, oldest to newest.
    pub fn as_slice(&mut self) -> &[Sample] {
        self.samples.make_contiguous()
    }
}

/// Rolling statistics over a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub temp_avg: f64,
    pub vr_temp_avg: f64,
    pub err_avg: f64,
    /// Worst of the ASIC and VR temperature trends, in °C per second.
    pub slope: f64,
}

impl Aggregates {
    /// Returns `None` for an empty window.
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let temp_avg = samples.iter().map(|s| s.temp).sum::<f64>() / n;
        let vr_temp_avg = samples.iter().map(|s| s.vr_temp).sum::<f64>() / n;
        let err_avg = samples.iter().map(|s| s.err).sum::<f64>() / n;

        let slope_asic = linreg_slope(samples, |s| s.temp);
        let slope_vr = linreg_slope(samples, |s| s.vr_temp);

        Some(Self {
            temp_avg,
            vr_temp_avg,
            err_avg,
            slope: slope_asic.max(slope_vr),
        })
    }
}

/// Ordinary least-squares slope of `value` against sample timestamp.
///
/// Zero with fewer than two samples or when every timestamp is equal.
pub fn linreg_slope(samples: &[Sample], value: impl Fn(&Sample) -> f64) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let t_mean = samples.iter().map(|s| s.ts).sum::<f64>() / n;
    let y_mean = samples.iter().map(&value).sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for s in samples {
        let dt = s.ts - t_mean;
        num += dt * (value(s) - y_mean);
        den += dt * dt;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
