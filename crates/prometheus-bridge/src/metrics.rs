use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use thermal_core::{Decision, Sample};

/// Per-device controller metrics on a private registry.
pub struct FleetMetrics {
    registry: Registry,
    pub temp_avg: GaugeVec,
    pub vr_temp_avg: GaugeVec,
    pub err_avg: GaugeVec,
    pub temp_slope: GaugeVec,
    pub frequency: GaugeVec,
    pub core_voltage: GaugeVec,
    pub decisions_total: IntCounterVec,
    pub fetch_failures_total: IntCounterVec,
    pub apply_failures_total: IntCounterVec,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<GaugeVec> {
    let g = GaugeVec::new(Opts::new(name, help), &["device"])?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> prometheus::Result<IntCounterVec> {
    let c = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl FleetMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let temp_avg = gauge(&registry, "bitaxe_temp_avg_celsius", "Window mean ASIC temperature")?;
        let vr_temp_avg = gauge(&registry, "bitaxe_vr_temp_avg_celsius", "Window mean VR temperature")?;
        let err_avg = gauge(&registry, "bitaxe_error_rate_avg_percent", "Window mean hash error rate")?;
        let temp_slope = gauge(&registry, "bitaxe_temp_slope", "Worst temperature trend, degrees per second")?;
        let frequency = gauge(&registry, "bitaxe_frequency", "Current ASIC frequency")?;
        let core_voltage = gauge(&registry, "bitaxe_core_voltage_mv", "Current core voltage")?;

        let decisions_total = counter(
            &registry,
            "bitaxe_decisions_total",
            "Decision cycles by action and reason",
            &["device", "action", "reason"],
        )?;
        let fetch_failures_total = counter(
            &registry,
            "bitaxe_fetch_failures_total",
            "Telemetry polls that produced no sample",
            &["device"],
        )?;
        let apply_failures_total = counter(
            &registry,
            "bitaxe_apply_failures_total",
            "Settings pushes that failed",
            &["device"],
        )?;

        Ok(Self {
            registry,
            temp_avg,
            vr_temp_avg,
            err_avg,
            temp_slope,
            frequency,
            core_voltage,
            decisions_total,
            fetch_failures_total,
            apply_failures_total,
        })
    }

    pub fn observe_decision(&self, device: &str, decision: &Decision, current: Option<&Sample>) {
        if let Some(agg) = &decision.aggregates {
            self.temp_avg.with_label_values(&[device]).set(agg.temp_avg);
            self.vr_temp_avg.with_label_values(&[device]).set(agg.vr_temp_avg);
            self.err_avg.with_label_values(&[device]).set(agg.err_avg);
            self.temp_slope.with_label_values(&[device]).set(agg.slope);
        }
        if let Some(s) = current {
            self.frequency.with_label_values(&[device]).set(f64::from(s.freq));
            self.core_voltage.with_label_values(&[device]).set(f64::from(s.vcore));
        }
        self.decisions_total
            .with_label_values(&[device, decision.action.tag(), decision.reason.code()])
            .inc();
    }

    pub fn observe_fetch_failure(&self, device: &str) {
        self.fetch_failures_total.with_label_values(&[device]).inc();
    }

    pub fn observe_apply_failure(&self, device: &str) {
        self.apply_failures_total.with_label_values(&[device]).inc();
    }

    /// Text exposition format of every registered metric.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
