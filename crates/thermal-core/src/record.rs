use crate::decision::Decision;
use crate::sample::{Reading, Sample};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::fmt::Display;

pub const METRICS_HEADER: &str = "timestamp;temp;vrTemp;errorPercentage;frequency;coreVoltage";
pub const DECISIONS_HEADER: &str = "timestamp;tempAvg;vrTempAvg;errAvg;slope;frequency;coreVoltage;decision;newFrequency;newCoreVoltage;reason";

pub const FIELD_SEPARATOR: char = ';';
pub const PLACEHOLDER: &str = "NA";
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn fmt_ts(at: &DateTime<Local>) -> String {
    at.format(TS_FORMAT).to_string()
}

/// Parse a log timestamp as local wall-clock time. Ambiguous times resolve
/// to the earlier instant; times skipped by a DST jump are rejected.
pub fn parse_ts(text: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), TS_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}

/// Seconds since the epoch with sub-second precision, as stored in samples.
pub fn epoch_seconds(at: &DateTime<Local>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

fn or_na<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| PLACEHOLDER.to_string(), |v| v.to_string())
}

fn join_fields(fields: &[String]) -> String {
    let mut buf = [0u8; 4];
    fields.join(FIELD_SEPARATOR.encode_utf8(&mut buf))
}

/// One line of a decisions log.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRecord {
    pub at: DateTime<Local>,
    /// Most recent sample at decision time, absent when the window was empty.
    pub current: Option<Sample>,
    pub decision: Decision,
}

impl DecisionRecord {
    pub fn to_line(&self) -> String {
        let agg = self.decision.aggregates;
        let action = self.decision.action;
        let fields = [
            fmt_ts(&self.at),
            or_na(agg.map(|a| format!("{:.2}", a.temp_avg))),
            or_na(agg.map(|a| format!("{:.2}", a.vr_temp_avg))),
            or_na(agg.map(|a| format!("{:.2}", a.err_avg))),
            or_na(agg.map(|a| format!("{:.5}", a.slope))),
            or_na(self.current.map(|s| s.freq)),
            or_na(self.current.map(|s| s.vcore)),
            action.tag().to_string(),
            or_na(action.new_freq()),
            or_na(action.new_vcore()),
            self.decision.reason_text(),
        ];
        join_fields(&fields)
    }
}

/// One line of a metrics log; `reading` is absent for a failed poll.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub at: DateTime<Local>,
    pub reading: Option<Reading>,
}

impl MetricsRow {
    pub fn to_line(&self) -> String {
        let r = self.reading;
        let fields = [
            fmt_ts(&self.at),
            or_na(r.map(|r| r.temp)),
            or_na(r.map(|r| r.vr_temp)),
            or_na(r.map(|r| r.err)),
            or_na(r.map(|r| r.freq)),
            or_na(r.map(|r| r.vcore)),
        ];
        join_fields(&fields)
    }

    /// Rebuild a row from its split fields.
    ///
    /// Returns `None` when the row cannot be placed in time (wrong field
    /// count, bad timestamp). A row with a placeholder, unparsable or
    /// non-finite value keeps its timestamp and carries no reading.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Option<Self> {
        if fields.len() != 6 {
            return None;
        }
        let at = parse_ts(fields[0].as_ref())?;
        let reading = parse_reading(&fields[1..]);
        Some(Self { at, reading })
    }

    pub fn sample(&self) -> Option<Sample> {
        self.reading
            .map(|r| Sample::from_reading(epoch_seconds(&self.at), r))
    }
}

fn parse_reading<S: AsRef<str>>(fields: &[S]) -> Option<Reading> {
    let text = |i: usize| fields[i].as_ref().trim();
    if (0..5).any(|i| text(i) == PLACEHOLDER) {
        return None;
    }
    let finite = |i: usize| text(i).parse::<f64>().ok().filter(|v| v.is_finite());
    Some(Reading {
        temp: finite(0)?,
        vr_temp: finite(1)?,
        err: finite(2)?,
        freq: text(3).parse().ok()?,
        vcore: text(4).parse().ok()?,
    })
}
