//! Scheduled-notification gate.
//!
//! Decides whether the share-price digest should be pushed at a given instant.
//! The gate is evaluated on every liveness tick, so it has to be cheap and
//! free of side effects apart from a log line when the zone is missing.

use chrono::{Datelike, Timelike};
use tracing::warn;

use crate::clock::{Clock, ClockSample};

/// Zone the firing window is expressed in.
pub const GATE_TIMEZONE: &str = "UTC";

/// Hours of the day (in `GATE_TIMEZONE`) at which the digest goes out.
pub const FIRING_HOURS: [u32; 4] = [22, 0, 2, 4];

pub const FIRING_MINUTE: u32 = 30;

/// Ticks in the second half of the firing minute are ignored so that two
/// ticks inside one minute do not both fire.
pub const FIRING_SECOND_LIMIT: u32 = 30;

/// Samples `clock` in UTC and reports whether the digest should fire.
///
/// Fails closed: an unresolvable zone means "do not fire".
pub fn should_fire(clock: &dyn Clock) -> bool {
    due_window(clock).is_some()
}

/// Like [`should_fire`], but returns the firing minute so callers can skip a
/// window they have already served.
pub fn due_window(clock: &dyn Clock) -> Option<i64> {
    match ClockSample::take(clock, GATE_TIMEZONE) {
        Ok(sample) => fires_at(&sample).then(|| firing_minute(&sample)),
        Err(error) => {
            warn!(
                event_name = "schedule.gate.timezone_unavailable",
                timezone = GATE_TIMEZONE,
                error = %error,
                "could not resolve gate timezone; scheduled digest will not fire"
            );
            None
        }
    }
}

pub fn fires_at(sample: &ClockSample) -> bool {
    let local = sample.local();
    let weekday = local.weekday().num_days_from_monday() < 5;

    weekday
        && FIRING_HOURS.contains(&local.hour())
        && local.minute() == FIRING_MINUTE
        && local.second() < FIRING_SECOND_LIMIT
}

/// Identifies the minute a sample falls into, used to suppress a second
/// firing when two ticks land in the same qualifying window.
pub fn firing_minute(sample: &ClockSample) -> i64 {
    sample.instant.timestamp().div_euclid(60)
}
