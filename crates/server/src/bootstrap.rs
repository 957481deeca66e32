use std::sync::Arc;
use std::time::Duration;

use rudolph_core::board::{render_meetup_reminder, BoardClient};
use rudolph_core::clock::{Clock, ClockError, SystemClock};
use rudolph_core::config::{AppConfig, ConfigError};
use rudolph_core::errors::CollaboratorError;
use rudolph_integrations::{
    build_http_client, DadJokeClient, MeetupPageClient, SharePriceScraper, TrelloBoard,
};
use rudolph_slack::{
    Collaborators, MessagingClient, MessagingError, ReconnectPolicy, RtmClient, RtmSettings,
    Session, SessionSettings,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub session: Session,
    pub board: Arc<dyn BoardClient>,
    pub messaging: Arc<dyn MessagingClient>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client setup failed: {0}")]
    Http(#[source] CollaboratorError),
    #[error("slack client setup failed: {0}")]
    Messaging(#[source] MessagingError),
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Board(#[from] CollaboratorError),
    #[error(transparent)]
    Timezone(#[from] ClockError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderOutcome {
    Sent,
    NothingDue,
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let http = build_http_client(Duration::from_secs(config.http.timeout_secs))
        .map_err(BootstrapError::Http)?;

    let board: Arc<dyn BoardClient> = Arc::new(TrelloBoard::new(
        http.clone(),
        &config.trello.api_base_url,
        config.trello.app_key.clone(),
        config.trello.token.clone(),
    ));

    let rtm = RtmClient::new(
        config.slack.token.clone(),
        RtmSettings {
            api_base_url: config.slack.api_base_url.clone(),
            ping_interval: Duration::from_secs(config.slack.ping_interval_secs),
            http_timeout: Duration::from_secs(config.http.timeout_secs),
            reconnect: ReconnectPolicy {
                max_retries: config.slack.reconnect.max_retries,
                base_delay_ms: config.slack.reconnect.base_delay_ms,
                max_delay_ms: config.slack.reconnect.max_delay_ms,
            },
        },
    )
    .map_err(BootstrapError::Messaging)?;
    let messaging: Arc<dyn MessagingClient> = Arc::new(rtm);

    let collaborators = Collaborators {
        board: board.clone(),
        jokes: Arc::new(DadJokeClient::new(http.clone(), &config.http.joke_url)),
        prices: Arc::new(SharePriceScraper::new(http.clone(), &config.http.price_search_url)),
        meetups: Arc::new(MeetupPageClient::new(http)),
        messaging: messaging.clone(),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let session = Session::new(
        collaborators,
        clock.clone(),
        SessionSettings::from_config(&config),
        CancellationToken::new(),
    );

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        meetup_sharing = config.chat.meetup_sharing,
        tickers = config.notifications.tickers.len(),
        "application bootstrap complete"
    );

    Ok(Application { config, session, board, messaging, clock })
}

/// Posts today's meetups (in the reminder timezone) to the reminder channel.
pub async fn send_meetup_reminder(
    board: &dyn BoardClient,
    messaging: &dyn MessagingClient,
    clock: &dyn Clock,
    config: &AppConfig,
) -> Result<ReminderOutcome, ReminderError> {
    let timezone = clock.resolve_timezone(&config.notifications.reminder_timezone)?;
    let cards = board.list_cards(&config.board.meetups_list_id).await?;

    let Some(reminder) = render_meetup_reminder(&cards, clock.now(), timezone) else {
        return Ok(ReminderOutcome::NothingDue);
    };

    messaging.send_message(&reminder, &config.notifications.reminder_channel_id).await?;
    Ok(ReminderOutcome::Sent)
}
