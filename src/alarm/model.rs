use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MS_PER_MINUTE: f64 = 60_000.0;

/// A scheduled alarm as reported by the scheduler.
///
/// Field names serialize in camelCase so rendered rows and fire log entries
/// read the same as the host alarm API they stand in for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub name: String,
    /// Unix epoch milliseconds of the next firing.
    pub scheduled_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_in_minutes: Option<f64>,
}

/// Creation request passed to [`AlarmScheduler::create`].
///
/// Exactly one of `when` and `delay_in_minutes` is expected; see
/// [`AlarmCreateInfo::validate`].
///
/// [`AlarmScheduler::create`]: crate::alarm::scheduler::AlarmScheduler::create
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmCreateInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_in_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_in_minutes: Option<f64>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
    /// Offset in milliseconds from now, sent as an absolute `when`.
    Ms,
    Min,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    #[error("no delay given, expected either `when` or `delayInMinutes`")]
    MissingDelay,
    #[error("both `when` and `delayInMinutes` given, expected exactly one")]
    ConflictingDelay,
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },
    #[error("periodInMinutes must be greater than zero, got {0}")]
    NonPositivePeriod(f64),
    #[error("unknown delay unit '{0}', expected 'ms' or 'min'")]
    UnknownUnit(String),
}

impl FromStr for DelayUnit {
    type Err = SpecError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "ms" => Ok(DelayUnit::Ms),
            "min" => Ok(DelayUnit::Min),
            _ => Err(SpecError::UnknownUnit(input.to_string())),
        }
    }
}

impl AlarmCreateInfo {
    /// Builds a creation request from the create-alarm form values.
    ///
    /// A period that is absent, zero or NaN is left out of the request.
    pub fn from_form(delay: f64, unit: DelayUnit, period: Option<f64>, now_ms: f64) -> Self {
        let mut info = AlarmCreateInfo::default();
        match unit {
            DelayUnit::Ms => info.when = Some(now_ms + delay),
            DelayUnit::Min => info.delay_in_minutes = Some(delay),
        }
        info.period_in_minutes = period.filter(|value| *value != 0.0 && !value.is_nan());
        info
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        for (field, value) in [
            ("when", self.when),
            ("delayInMinutes", self.delay_in_minutes),
            ("periodInMinutes", self.period_in_minutes),
        ] {
            if let Some(value) = value
                && !value.is_finite()
            {
                return Err(SpecError::NotFinite { field, value });
            }
        }
        if let Some(period) = self.period_in_minutes
            && period <= 0.0
        {
            return Err(SpecError::NonPositivePeriod(period));
        }
        match (self.when, self.delay_in_minutes) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (None, None) => Err(SpecError::MissingDelay),
            (Some(_), Some(_)) => Err(SpecError::ConflictingDelay),
        }
    }

    /// Absolute fire time in unix milliseconds for a request made at `now_ms`.
    pub fn resolve_fire_time(&self, now_ms: f64) -> Result<f64, SpecError> {
        self.validate()?;
        match (self.when, self.delay_in_minutes) {
            (Some(when), _) => Ok(when),
            (None, Some(minutes)) => Ok(now_ms + minutes * MS_PER_MINUTE),
            (None, None) => Err(SpecError::MissingDelay),
        }
    }

    /// Single-line JSON form used in creation log entries.
    pub fn summary_json(&self) -> String {
        single_line_json(self)
    }
}

impl Alarm {
    pub fn summary_json(&self) -> String {
        single_line_json(self)
    }
}

fn single_line_json<T: Serialize>(value: &T) -> String {
    match serde_json::to_string_pretty(value) {
        Ok(text) => collapse_whitespace(&text),
        Err(err) => format!("<unserializable: {err}>"),
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
