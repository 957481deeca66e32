use chrono::{DateTime, Duration, DurationRound, Utc};
use rudolph_core::clock::{Clock, FixedClock, SystemClock};
use rudolph_core::schedule::{should_fire, GATE_TIMEZONE};
use serde_json::json;

use super::CommandResult;

/// The firing hours repeat every weekday, so a week of minutes always
/// contains the next window.
const SEARCH_HORIZON_MINUTES: i64 = 7 * 24 * 60;

pub fn run(at: Option<&str>) -> CommandResult {
    let instant = match at {
        Some(raw) => match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(error) => {
                return CommandResult::failure(
                    "gate",
                    "invalid_instant",
                    format!("`{raw}` is not an RFC 3339 instant: {error}"),
                    2,
                );
            }
        },
        None => SystemClock.now(),
    };

    evaluate(instant)
}

fn evaluate(instant: DateTime<Utc>) -> CommandResult {
    let fires = should_fire(&FixedClock::new(instant));
    let next_window = next_window_after(instant);

    let message = if fires {
        format!("digest fires at {}", instant.to_rfc3339())
    } else {
        match next_window {
            Some(next) => format!("digest idle; next window opens {}", next.to_rfc3339()),
            None => "digest idle; no window in the coming week".to_string(),
        }
    };

    let data = json!({
        "instant": instant.to_rfc3339(),
        "timezone": GATE_TIMEZONE,
        "fires": fires,
        "next_window": next_window.map(|next| next.to_rfc3339()),
    });

    CommandResult::success_with_data("gate", message, Some(data))
}

/// First minute boundary strictly after `instant` at which the gate fires.
fn next_window_after(instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let start = instant.duration_trunc(Duration::minutes(1)).ok()? + Duration::minutes(1);

    (0..SEARCH_HORIZON_MINUTES)
        .map(|offset| start + Duration::minutes(offset))
        .find(|candidate| should_fire(&FixedClock::new(*candidate)))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::Value;

    use super::{next_window_after, run};

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).expect("instant").with_timezone(&Utc)
    }

    fn payload(output: &str) -> Value {
        serde_json::from_str(output).expect("json output")
    }

    #[test]
    fn monday_half_past_midnight_fires() {
        let result = run(Some("2018-09-17T00:30:10Z"));

        assert_eq!(result.exit_code, 0);
        let body = payload(&result.output);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["data"]["fires"], true);
    }

    #[test]
    fn next_window_skips_the_weekend() {
        // Saturday 2018-09-22 12:00 UTC; Monday's first window is 00:30.
        let next = next_window_after(utc("2018-09-22T12:00:00Z"));

        assert_eq!(next, Some(Utc.with_ymd_and_hms(2018, 9, 24, 0, 30, 0).unwrap()));
    }

    #[test]
    fn next_window_is_strictly_after_the_instant() {
        let next = next_window_after(utc("2018-09-17T00:30:00Z"));

        assert_eq!(next, Some(Utc.with_ymd_and_hms(2018, 9, 17, 2, 30, 0).unwrap()));
    }

    #[test]
    fn unparseable_instant_is_a_usage_error() {
        let result = run(Some("next tuesday"));

        assert_eq!(result.exit_code, 2);
        let body = payload(&result.output);
        assert_eq!(body["error_class"], "invalid_instant");
    }
}
