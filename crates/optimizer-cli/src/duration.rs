use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration `{0}` (expected e.g. 3600, 5s, 10min, 2h, 1d)")]
    Format(String),
    #[error("unknown duration unit `{0}`")]
    Unit(String),
}

fn unit_seconds(unit: &str) -> Option<u64> {
    let secs = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        _ => return None,
    };
    Some(secs)
}

/// Parse `3600`, `5s`, `10min`, `2h`, `1d`. Bare digits are seconds.
pub fn parse_duration(text: &str) -> Result<Duration, DurationError> {
    let s = text.trim().to_ascii_lowercase();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, rest) = s.split_at(split);
    if digits.is_empty() {
        return Err(DurationError::Format(text.to_string()));
    }
    let n: u64 = digits
        .parse()
        .map_err(|_| DurationError::Format(text.to_string()))?;

    let unit = rest.trim_start();
    if unit.is_empty() {
        return Ok(Duration::from_secs(n));
    }
    if !unit.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DurationError::Format(text.to_string()));
    }
    let per = unit_seconds(unit).ok_or_else(|| DurationError::Unit(unit.to_string()))?;
    n.checked_mul(per)
        .map(Duration::from_secs)
        .ok_or_else(|| DurationError::Format(text.to_string()))
}
