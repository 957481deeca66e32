use std::env;
use std::fs;
use std::path::Path;

use rudolph_core::config::{default_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One rendered config entry: key path, display value, env vars that can set it.
struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn entry(key: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Entry {
    Entry { key, value: value.to_string(), env_keys }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = default_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for Entry { key, value, env_keys } in entries(&config) {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    vec![
        entry(
            "slack.token",
            redact_token(config.slack.token.expose_secret()),
            &["RUDOLPH_SLACK_TOKEN", "SLACK_TOKEN"],
        ),
        entry("slack.api_base_url", &config.slack.api_base_url, &["RUDOLPH_SLACK_API_BASE_URL"]),
        entry(
            "slack.ping_interval_secs",
            config.slack.ping_interval_secs,
            &["RUDOLPH_SLACK_PING_INTERVAL_SECS"],
        ),
        entry(
            "slack.reconnect.max_retries",
            config.slack.reconnect.max_retries,
            &["RUDOLPH_SLACK_RECONNECT_MAX_RETRIES"],
        ),
        entry(
            "trello.app_key",
            redact_secret(config.trello.app_key.expose_secret()),
            &["RUDOLPH_TRELLO_KEY", "TRELLO_KEY"],
        ),
        entry(
            "trello.token",
            redact_secret(config.trello.token.expose_secret()),
            &["RUDOLPH_TRELLO_TOKEN", "TRELLO_TOKEN"],
        ),
        entry("trello.api_base_url", &config.trello.api_base_url, &["RUDOLPH_TRELLO_API_BASE_URL"]),
        entry("board.ideas_list_id", &config.board.ideas_list_id, &["RUDOLPH_BOARD_IDEAS_LIST_ID"]),
        entry(
            "board.scheduled_list_id",
            &config.board.scheduled_list_id,
            &["RUDOLPH_BOARD_SCHEDULED_LIST_ID"],
        ),
        entry(
            "board.meetups_list_id",
            &config.board.meetups_list_id,
            &["RUDOLPH_BOARD_MEETUPS_LIST_ID"],
        ),
        entry(
            "notifications.broadcast_channel_id",
            &config.notifications.broadcast_channel_id,
            &["RUDOLPH_BROADCAST_CHANNEL_ID"],
        ),
        entry(
            "notifications.tickers",
            config.notifications.tickers.join(", "),
            &["RUDOLPH_TICKERS"],
        ),
        entry(
            "notifications.reminder_channel_id",
            &config.notifications.reminder_channel_id,
            &["RUDOLPH_REMINDER_CHANNEL_ID"],
        ),
        entry(
            "notifications.reminder_timezone",
            &config.notifications.reminder_timezone,
            &["RUDOLPH_REMINDER_TIMEZONE"],
        ),
        entry("chat.meetup_sharing", config.chat.meetup_sharing, &["RUDOLPH_MEETUP_SHARING"]),
        entry(
            "chat.failure_reply",
            format!("{:?}", config.chat.failure_reply),
            &["RUDOLPH_FAILURE_REPLY"],
        ),
        entry("http.timeout_secs", config.http.timeout_secs, &["RUDOLPH_HTTP_TIMEOUT_SECS"]),
        entry("http.joke_url", &config.http.joke_url, &[]),
        entry("http.price_search_url", &config.http.price_search_url, &[]),
        entry(
            "logging.level",
            &config.logging.level,
            &["RUDOLPH_LOGGING_LEVEL", "RUDOLPH_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["RUDOLPH_LOGGING_FORMAT", "RUDOLPH_LOG_FORMAT"],
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the `xoxb-` style prefix so operators can tell token kinds apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
