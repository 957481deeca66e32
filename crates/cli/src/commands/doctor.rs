use rudolph_core::clock::{Clock, SystemClock};
use rudolph_core::config::{AppConfig, LoadOptions};
use rudolph_core::schedule::GATE_TIMEZONE;
use secrecy::ExposeSecret;
use serde::Serialize;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 4] =
    ["slack_token_kind", "reminder_timezone", "gate_timezone", "tickers_configured"];

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(&SystemClock);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(clock: &dyn Clock) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_token_kind(&config));
            checks.push(check_timezone(
                clock,
                "reminder_timezone",
                &config.notifications.reminder_timezone,
            ));
            checks.push(check_timezone(clock, "gate_timezone", GATE_TIMEZONE));
            checks.push(check_tickers(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.extend(DEPENDENT_CHECKS.into_iter().map(DoctorCheck::skipped));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Real-time messaging needs a bot or legacy user token; app-level tokens
/// (`xapp-`) cannot open an RTM session.
fn check_token_kind(config: &AppConfig) -> DoctorCheck {
    let token = config.slack.token.expose_secret();
    let kind = token.split('-').next().unwrap_or_default();

    match kind {
        "xoxb" => DoctorCheck::pass("slack_token_kind", "bot token"),
        "xoxp" => DoctorCheck::pass("slack_token_kind", "user token"),
        other => DoctorCheck::fail(
            "slack_token_kind",
            format!("`{other}-` tokens cannot open a real-time session; use a bot token"),
        ),
    }
}

fn check_timezone(clock: &dyn Clock, name: &'static str, timezone: &str) -> DoctorCheck {
    match clock.resolve_timezone(timezone) {
        Ok(_) => DoctorCheck::pass(name, format!("`{timezone}` resolved")),
        Err(error) => DoctorCheck::fail(name, error.to_string()),
    }
}

fn check_tickers(config: &AppConfig) -> DoctorCheck {
    let tickers = &config.notifications.tickers;
    if tickers.iter().all(|ticker| ticker.trim().is_empty()) {
        return DoctorCheck::fail("tickers_configured", "no tickers; the digest would be empty");
    }
    DoctorCheck::pass(
        "tickers_configured",
        format!("{} ticker(s): {}", tickers.len(), tickers.join(", ")),
    )
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
