use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub trello: TrelloConfig,
    pub board: BoardConfig,
    pub notifications: NotificationConfig,
    pub chat: ChatConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub token: SecretString,
    pub api_base_url: String,
    pub ping_interval_secs: u64,
    pub reconnect: ReconnectConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct TrelloConfig {
    pub app_key: SecretString,
    pub token: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardConfig {
    pub ideas_list_id: String,
    pub scheduled_list_id: String,
    pub meetups_list_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationConfig {
    pub broadcast_channel_id: String,
    pub tickers: Vec<String>,
    pub reminder_channel_id: String,
    pub reminder_timezone: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    pub meetup_sharing: bool,
    pub failure_reply: FailureReply,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub joke_url: String,
    pub price_search_url: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// What an addressed user sees when their command fails downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReply {
    /// Nothing is sent; the failure only shows up in the logs.
    Silent,
    /// A fixed apology is sent back to the channel.
    Notice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub slack_token: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub trello_app_key: Option<String>,
    pub trello_token: Option<String>,
    pub broadcast_channel_id: Option<String>,
    pub meetup_sharing: Option<bool>,
    pub failure_reply: Option<FailureReply>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                token: String::new().into(),
                api_base_url: "https://slack.com/api".to_string(),
                ping_interval_secs: 15,
                reconnect: ReconnectConfig {
                    max_retries: 5,
                    base_delay_ms: 250,
                    max_delay_ms: 5_000,
                },
            },
            trello: TrelloConfig {
                app_key: String::new().into(),
                token: String::new().into(),
                api_base_url: "https://api.trello.com/1".to_string(),
            },
            board: BoardConfig {
                ideas_list_id: "5b613db79ea6a782ac173a48".to_string(),
                scheduled_list_id: "5b613dbfd923da512f85263b".to_string(),
                meetups_list_id: "5b6140b0ff2ec75df864657f".to_string(),
            },
            notifications: NotificationConfig {
                broadcast_channel_id: "DCKGBPU10".to_string(),
                tickers: vec!["atm nzx".to_string(), "xro asx".to_string()],
                reminder_channel_id: "CBLRCPPRQ".to_string(),
                reminder_timezone: "Pacific/Auckland".to_string(),
            },
            chat: ChatConfig { meetup_sharing: false, failure_reply: FailureReply::Silent },
            http: HttpConfig {
                timeout_secs: 30,
                joke_url: "https://icanhazdadjoke.com/".to_string(),
                price_search_url: "https://www.google.co.nz/search".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for FailureReply {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(Self::Silent),
            "notice" => Ok(Self::Notice),
            other => Err(ConfigError::Validation(format!(
                "unsupported failure reply `{other}` (expected silent|notice)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("rudolph.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(slack_token_value) = slack.token {
                self.slack.token = secret_value(slack_token_value);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(ping_interval_secs) = slack.ping_interval_secs {
                self.slack.ping_interval_secs = ping_interval_secs;
            }
            if let Some(reconnect) = slack.reconnect {
                if let Some(max_retries) = reconnect.max_retries {
                    self.slack.reconnect.max_retries = max_retries;
                }
                if let Some(base_delay_ms) = reconnect.base_delay_ms {
                    self.slack.reconnect.base_delay_ms = base_delay_ms;
                }
                if let Some(max_delay_ms) = reconnect.max_delay_ms {
                    self.slack.reconnect.max_delay_ms = max_delay_ms;
                }
            }
        }

        if let Some(trello) = patch.trello {
            if let Some(trello_app_key_value) = trello.app_key {
                self.trello.app_key = secret_value(trello_app_key_value);
            }
            if let Some(trello_token_value) = trello.token {
                self.trello.token = secret_value(trello_token_value);
            }
            if let Some(api_base_url) = trello.api_base_url {
                self.trello.api_base_url = api_base_url;
            }
        }

        if let Some(board) = patch.board {
            if let Some(ideas_list_id) = board.ideas_list_id {
                self.board.ideas_list_id = ideas_list_id;
            }
            if let Some(scheduled_list_id) = board.scheduled_list_id {
                self.board.scheduled_list_id = scheduled_list_id;
            }
            if let Some(meetups_list_id) = board.meetups_list_id {
                self.board.meetups_list_id = meetups_list_id;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(broadcast_channel_id) = notifications.broadcast_channel_id {
                self.notifications.broadcast_channel_id = broadcast_channel_id;
            }
            if let Some(tickers) = notifications.tickers {
                self.notifications.tickers = tickers;
            }
            if let Some(reminder_channel_id) = notifications.reminder_channel_id {
                self.notifications.reminder_channel_id = reminder_channel_id;
            }
            if let Some(reminder_timezone) = notifications.reminder_timezone {
                self.notifications.reminder_timezone = reminder_timezone;
            }
        }

        if let Some(chat) = patch.chat {
            if let Some(meetup_sharing) = chat.meetup_sharing {
                self.chat.meetup_sharing = meetup_sharing;
            }
            if let Some(failure_reply) = chat.failure_reply {
                self.chat.failure_reply = failure_reply;
            }
        }

        if let Some(http) = patch.http {
            if let Some(timeout_secs) = http.timeout_secs {
                self.http.timeout_secs = timeout_secs;
            }
            if let Some(joke_url) = http.joke_url {
                self.http.joke_url = joke_url;
            }
            if let Some(price_search_url) = http.price_search_url {
                self.http.price_search_url = price_search_url;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RUDOLPH_SLACK_TOKEN").or_else(|| read_env("SLACK_TOKEN")) {
            self.slack.token = secret_value(value);
        }
        if let Some(value) = read_env("RUDOLPH_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env("RUDOLPH_SLACK_PING_INTERVAL_SECS") {
            self.slack.ping_interval_secs = parse_u64("RUDOLPH_SLACK_PING_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("RUDOLPH_SLACK_RECONNECT_MAX_RETRIES") {
            self.slack.reconnect.max_retries =
                parse_u32("RUDOLPH_SLACK_RECONNECT_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("RUDOLPH_TRELLO_KEY").or_else(|| read_env("TRELLO_KEY")) {
            self.trello.app_key = secret_value(value);
        }
        if let Some(value) = read_env("RUDOLPH_TRELLO_TOKEN").or_else(|| read_env("TRELLO_TOKEN")) {
            self.trello.token = secret_value(value);
        }
        if let Some(value) = read_env("RUDOLPH_TRELLO_API_BASE_URL") {
            self.trello.api_base_url = value;
        }

        if let Some(value) = read_env("RUDOLPH_BOARD_IDEAS_LIST_ID") {
            self.board.ideas_list_id = value;
        }
        if let Some(value) = read_env("RUDOLPH_BOARD_SCHEDULED_LIST_ID") {
            self.board.scheduled_list_id = value;
        }
        if let Some(value) = read_env("RUDOLPH_BOARD_MEETUPS_LIST_ID") {
            self.board.meetups_list_id = value;
        }

        if let Some(value) = read_env("RUDOLPH_BROADCAST_CHANNEL_ID") {
            self.notifications.broadcast_channel_id = value;
        }
        if let Some(value) = read_env("RUDOLPH_TICKERS") {
            self.notifications.tickers = parse_list(&value);
        }
        if let Some(value) = read_env("RUDOLPH_REMINDER_CHANNEL_ID") {
            self.notifications.reminder_channel_id = value;
        }
        if let Some(value) = read_env("RUDOLPH_REMINDER_TIMEZONE") {
            self.notifications.reminder_timezone = value;
        }

        if let Some(value) = read_env("RUDOLPH_MEETUP_SHARING") {
            self.chat.meetup_sharing = parse_bool("RUDOLPH_MEETUP_SHARING", &value)?;
        }
        if let Some(value) = read_env("RUDOLPH_FAILURE_REPLY") {
            self.chat.failure_reply = value.parse()?;
        }

        if let Some(value) = read_env("RUDOLPH_HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = parse_u64("RUDOLPH_HTTP_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("RUDOLPH_LOGGING_LEVEL").or_else(|| read_env("RUDOLPH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RUDOLPH_LOGGING_FORMAT").or_else(|| read_env("RUDOLPH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(slack_token) = overrides.slack_token {
            self.slack.token = secret_value(slack_token);
        }
        if let Some(slack_api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = slack_api_base_url;
        }
        if let Some(trello_app_key) = overrides.trello_app_key {
            self.trello.app_key = secret_value(trello_app_key);
        }
        if let Some(trello_token) = overrides.trello_token {
            self.trello.token = secret_value(trello_token);
        }
        if let Some(broadcast_channel_id) = overrides.broadcast_channel_id {
            self.notifications.broadcast_channel_id = broadcast_channel_id;
        }
        if let Some(meetup_sharing) = overrides.meetup_sharing {
            self.chat.meetup_sharing = meetup_sharing;
        }
        if let Some(failure_reply) = overrides.failure_reply {
            self.chat.failure_reply = failure_reply;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_trello(&self.trello)?;
        validate_board(&self.board)?;
        validate_notifications(&self.notifications)?;
        validate_http(&self.http)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("rudolph.toml"), PathBuf::from("config/rudolph.toml")]
        .into_iter()
        .find(|path| path.exists())
}

/// Path of the config file `AppConfig::load` would read with default options.
pub fn default_config_path() -> Option<PathBuf> {
    resolve_config_path(None)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let token = slack.token.expose_secret();
    if token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.token is required. Set RUDOLPH_SLACK_TOKEN (or SLACK_TOKEN) to the bot user OAuth token".to_string(),
        ));
    }
    if !token.starts_with("xox") {
        return Err(ConfigError::Validation(
            "slack.token must be a Slack token starting with `xox` (e.g. `xoxb-...`)".to_string(),
        ));
    }

    validate_url("slack.api_base_url", &slack.api_base_url)?;

    if slack.ping_interval_secs == 0 || slack.ping_interval_secs > 30 {
        return Err(ConfigError::Validation(
            "slack.ping_interval_secs must be in range 1..=30 (the digest window is 30 seconds wide)"
                .to_string(),
        ));
    }

    if slack.reconnect.max_delay_ms < slack.reconnect.base_delay_ms {
        return Err(ConfigError::Validation(
            "slack.reconnect.max_delay_ms must not be smaller than base_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_trello(trello: &TrelloConfig) -> Result<(), ConfigError> {
    if trello.app_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "trello.app_key is required. Set RUDOLPH_TRELLO_KEY (or TRELLO_KEY); get it from https://trello.com/app-key".to_string(),
        ));
    }
    if trello.token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "trello.token is required. Set RUDOLPH_TRELLO_TOKEN (or TRELLO_TOKEN)".to_string(),
        ));
    }

    validate_url("trello.api_base_url", &trello.api_base_url)
}

fn validate_board(board: &BoardConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("board.ideas_list_id", &board.ideas_list_id),
        ("board.scheduled_list_id", &board.scheduled_list_id),
        ("board.meetups_list_id", &board.meetups_list_id),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{key} must not be empty")));
        }
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationConfig) -> Result<(), ConfigError> {
    if notifications.broadcast_channel_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "notifications.broadcast_channel_id must not be empty".to_string(),
        ));
    }
    if notifications.reminder_channel_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "notifications.reminder_channel_id must not be empty".to_string(),
        ));
    }
    if notifications.reminder_timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(ConfigError::Validation(format!(
            "notifications.reminder_timezone `{}` is not a known IANA timezone",
            notifications.reminder_timezone
        )));
    }

    Ok(())
}

fn validate_http(http: &HttpConfig) -> Result<(), ConfigError> {
    if http.timeout_secs == 0 || http.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "http.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    validate_url("http.joke_url", &http.joke_url)?;
    validate_url("http.price_search_url", &http.price_search_url)
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    trello: Option<TrelloPatch>,
    board: Option<BoardPatch>,
    notifications: Option<NotificationPatch>,
    chat: Option<ChatPatch>,
    http: Option<HttpPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    token: Option<String>,
    api_base_url: Option<String>,
    ping_interval_secs: Option<u64>,
    reconnect: Option<ReconnectPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconnectPatch {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TrelloPatch {
    app_key: Option<String>,
    token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BoardPatch {
    ideas_list_id: Option<String>,
    scheduled_list_id: Option<String>,
    meetups_list_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    broadcast_channel_id: Option<String>,
    tickers: Option<Vec<String>>,
    reminder_channel_id: Option<String>,
    reminder_timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    meetup_sharing: Option<bool>,
    failure_reply: Option<FailureReply>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpPatch {
    timeout_secs: Option<u64>,
    joke_url: Option<String>,
    price_search_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
