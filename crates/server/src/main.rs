mod bootstrap;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use rudolph_core::config::{AppConfig, LoadOptions};
use rudolph_slack::StopReason;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bootstrap::{bootstrap_with_config, send_meetup_reminder, ReminderOutcome};

#[derive(Debug, Parser)]
#[command(name = "rudolph", about = "Slack bot for the meetup team board")]
struct Args {
    /// Path to a rudolph.toml config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(config: &AppConfig) {
    use rudolph_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let args = Args::parse();
    let require_file = args.config.is_some();
    let config = AppConfig::load(LoadOptions {
        config_path: args.config,
        require_file,
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let mut app = bootstrap_with_config(config)?;

    match send_meetup_reminder(
        app.board.as_ref(),
        app.messaging.as_ref(),
        app.clock.as_ref(),
        &app.config,
    )
    .await
    {
        Ok(ReminderOutcome::Sent) => info!(
            event_name = "system.reminder.sent",
            correlation_id = "bootstrap",
            channel_id = %app.config.notifications.reminder_channel_id,
            "sent meetup reminder"
        ),
        Ok(ReminderOutcome::NothingDue) => info!(
            event_name = "system.reminder.nothing_due",
            correlation_id = "bootstrap",
            "no meetups today"
        ),
        Err(error) => warn!(
            event_name = "system.reminder.failed",
            correlation_id = "bootstrap",
            error = %error,
            "could not send meetup reminder"
        ),
    }

    let cancellation = app.session.cancellation_token();
    let shutdown = tokio::spawn(wait_for_shutdown(cancellation));

    info!(event_name = "system.server.started", correlation_id = "bootstrap", "rudolph started");
    let reason = app.session.run().await?;
    shutdown.abort();

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        reason = ?reason,
        "rudolph stopping"
    );

    match reason {
        StopReason::Cancelled => Ok(()),
        StopReason::AuthenticationRejected => bail!("slack rejected the bot token"),
        StopReason::StreamClosed => bail!("slack connection lost and reconnect retries exhausted"),
    }
}

async fn wait_for_shutdown(cancellation: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                warn!(
                    event_name = "system.server.signal_failed",
                    error = %error,
                    "could not listen for ctrl-c"
                );
                return;
            }
            info!(
                event_name = "system.server.shutdown_requested",
                correlation_id = "shutdown",
                "ctrl-c received"
            );
            cancellation.cancel();
        }
        _ = cancellation.cancelled() => {}
    }
}
