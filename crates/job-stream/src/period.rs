//! Validation of the `period` query parameter.

use std::time::Duration;

pub const MIN_PERIOD_MS: u64 = 50;
pub const MAX_PERIOD_MS: u64 = 5000;

/// Tick cadence for one session, guaranteed to lie in
/// `[MIN_PERIOD_MS, MAX_PERIOD_MS]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodError {
    #[error("missing period parameter")]
    Missing,
    #[error("period {0:?} is not a whole number")]
    NotWholeNumber(String),
    #[error("period {0}ms is outside {MIN_PERIOD_MS}..={MAX_PERIOD_MS}ms")]
    OutOfRange(u64),
}

impl PeriodError {
    /// Human-readable reason carried in the 4000 close frame.
    pub fn close_reason(&self) -> String {
        let kind = match self {
            PeriodError::Missing | PeriodError::NotWholeNumber(_) => "parameter",
            PeriodError::OutOfRange(_) => "value",
        };
        format!(
            "Invalid period {kind}. Must be a whole number between {MIN_PERIOD_MS} and {MAX_PERIOD_MS} ms."
        )
    }
}

impl Period {
    /// Parse the raw query value. Only plain decimal digits are accepted, so
    /// `"3.5"`, `"1e3"`, `"-50"` and `" 100"` are all rejected.
    pub fn parse(raw: Option<&str>) -> Result<Self, PeriodError> {
        let raw = match raw {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Err(PeriodError::Missing),
        };
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PeriodError::NotWholeNumber(raw.to_string()));
        }
        // All digits but too long for u64 is still a whole number, just huge.
        let ms = raw.parse::<u64>().unwrap_or(u64::MAX);
        Self::from_millis(ms)
    }

    /// Pick `period` out of decoded query pairs. A repeated parameter is not
    /// a single whole number and is rejected like any other malformed value.
    pub fn from_query_pairs(pairs: &[(String, String)]) -> Result<Self, PeriodError> {
        let values: Vec<&str> = pairs
            .iter()
            .filter(|(key, _)| key == "period")
            .map(|(_, value)| value.as_str())
            .collect();
        match values.as_slice() {
            [] => Err(PeriodError::Missing),
            [value] => Self::parse(Some(value)),
            many => Err(PeriodError::NotWholeNumber(many.join(","))),
        }
    }

    pub fn from_millis(ms: u64) -> Result<Self, PeriodError> {
        if (MIN_PERIOD_MS..=MAX_PERIOD_MS).contains(&ms) {
            Ok(Self(ms))
        } else {
            Err(PeriodError::OutOfRange(ms))
        }
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}
