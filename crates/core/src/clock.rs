use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    #[error("timezone `{0}` is unavailable")]
    TimezoneUnavailable(String),
}

/// Source of wall-clock time and timezone data.
///
/// Everything that needs "now" takes a `Clock` instead of reading the system
/// time directly, so tests can pin the instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn resolve_timezone(&self, name: &str) -> Result<Tz, ClockError>;
}

/// A `(instant, timezone)` pair taken at evaluation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockSample {
    pub instant: DateTime<Utc>,
    pub timezone: Tz,
}

impl ClockSample {
    pub fn take(clock: &dyn Clock, timezone: &str) -> Result<Self, ClockError> {
        let timezone = clock.resolve_timezone(timezone)?;
        Ok(Self { instant: clock.now(), timezone })
    }

    pub fn local(&self) -> DateTime<Tz> {
        self.instant.with_timezone(&self.timezone)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn resolve_timezone(&self, name: &str) -> Result<Tz, ClockError> {
        parse_timezone(name)
    }
}

/// Clock frozen at a single instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    instant: DateTime<Utc>,
    timezones_available: bool,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant, timezones_available: true }
    }

    /// A clock whose timezone database is missing; every lookup fails.
    pub fn without_timezones(instant: DateTime<Utc>) -> Self {
        Self { instant, timezones_available: false }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }

    fn resolve_timezone(&self, name: &str) -> Result<Tz, ClockError> {
        if !self.timezones_available {
            return Err(ClockError::TimezoneUnavailable(name.to_owned()));
        }
        parse_timezone(name)
    }
}

fn parse_timezone(name: &str) -> Result<Tz, ClockError> {
    name.trim().parse::<Tz>().map_err(|_| ClockError::TimezoneUnavailable(name.to_owned()))
}
