use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

const SECOND_MS: u64 = 1_000;
const MINUTE_MS: u64 = 60 * SECOND_MS;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// A window length assembled from separate calendar components.
///
/// ```rust
/// use cap_limit::Span;
///
/// let span = Span::default().minutes(1).seconds(30);
/// assert_eq!(span.as_millis(), 90_000);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Span {
    pub seconds: u64,
    pub minutes: u64,
    pub hours: u64,
    pub days: u64,
    /// Extra milliseconds, for windows finer than a second.
    pub millis: u64,
}

impl Span {
    pub fn seconds(mut self, seconds: u64) -> Self {
        self.seconds += seconds;
        self
    }

    pub fn minutes(mut self, minutes: u64) -> Self {
        self.minutes += minutes;
        self
    }

    pub fn hours(mut self, hours: u64) -> Self {
        self.hours += hours;
        self
    }

    pub fn days(mut self, days: u64) -> Self {
        self.days += days;
        self
    }

    pub fn millis(mut self, millis: u64) -> Self {
        self.millis += millis;
        self
    }

    /// Total length in milliseconds, saturating on overflow.
    pub fn as_millis(&self) -> u64 {
        self.millis
            .saturating_add(self.seconds.saturating_mul(SECOND_MS))
            .saturating_add(self.minutes.saturating_mul(MINUTE_MS))
            .saturating_add(self.hours.saturating_mul(HOUR_MS))
            .saturating_add(self.days.saturating_mul(DAY_MS))
    }

    /// The window in milliseconds, rejecting an empty span.
    pub(crate) fn window_ms(&self) -> Result<u64> {
        match self.as_millis() {
            0 => Err(Error::invalid(
                "window",
                "must be positive (set seconds, minutes, hours or days)",
            )),
            ms => Ok(ms),
        }
    }
}

impl From<Duration> for Span {
    fn from(duration: Duration) -> Self {
        Span::default().millis(duration.as_millis() as u64)
    }
}

/// A steady-state rate assembled from separate per-unit components.
///
/// The components are summed into a single rate; `per_ms` is the canonical
/// unit the procedures work in.
///
/// ```rust
/// use cap_limit::Rate;
///
/// let rate = Rate::default().per_second(1.0).per_minute(60.0);
/// assert_eq!(rate.per_second_total(), 2.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rate {
    pub per_second: f64,
    pub per_minute: f64,
    pub per_hour: f64,
    pub per_day: f64,
}

impl Rate {
    pub fn per_second(mut self, amount: f64) -> Self {
        self.per_second += amount;
        self
    }

    pub fn per_minute(mut self, amount: f64) -> Self {
        self.per_minute += amount;
        self
    }

    pub fn per_hour(mut self, amount: f64) -> Self {
        self.per_hour += amount;
        self
    }

    pub fn per_day(mut self, amount: f64) -> Self {
        self.per_day += amount;
        self
    }

    pub fn per_second_total(&self) -> f64 {
        self.per_second + self.per_minute / 60.0 + self.per_hour / 3_600.0 + self.per_day / 86_400.0
    }

    pub fn per_ms(&self) -> f64 {
        self.per_second_total() / 1_000.0
    }

    /// The per-millisecond rate, which must be finite and strictly positive.
    pub(crate) fn positive_per_ms(&self, field: &'static str) -> Result<f64> {
        let rate = self.per_ms();
        if rate.is_finite() && rate > 0.0 {
            Ok(rate)
        } else {
            Err(Error::invalid(
                field,
                format!(
                    "net rate must be positive (per second/minute/hour/day), got {} per second",
                    self.per_second_total()
                ),
            ))
        }
    }

    /// The per-millisecond rate, which must be finite and not negative.
    pub(crate) fn non_negative_per_ms(&self, field: &'static str) -> Result<f64> {
        let rate = self.per_ms();
        if rate.is_finite() && rate >= 0.0 {
            Ok(rate)
        } else {
            Err(Error::invalid(
                field,
                format!(
                    "net rate must not be negative, got {} per second",
                    self.per_second_total()
                ),
            ))
        }
    }
}
