use std::sync::Arc;

use rudolph_core::clock::Clock;
use rudolph_core::config::{AppConfig, BoardConfig, FailureReply};
use rudolph_core::market::{scheduled_digest, PriceLookup};
use rudolph_core::meetups::MEETUP_LINK_PREFIX;
use rudolph_core::schedule::due_window;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::commands::{normalize, Collaborators, CommandRouter, FAILURE_NOTICE};
use crate::events::{InboundEvent, SelfInfo, TextMessageEvent};
use crate::messaging::{MessagingClient, MessagingError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    AuthenticationRejected,
    /// The connection-management activity gave up and dropped the stream.
    StreamClosed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already ran; build a new session to reconnect")]
    AlreadyRan,
    #[error("could not open the real-time connection: {0}")]
    Connect(#[source] MessagingError),
    #[error("could not read the bot identity: {0}")]
    SelfInfo(#[source] MessagingError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub lists: BoardConfig,
    pub broadcast_channel_id: String,
    pub tickers: Vec<String>,
    pub meetup_sharing: bool,
    pub failure_reply: FailureReply,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lists: config.board.clone(),
            broadcast_channel_id: config.notifications.broadcast_channel_id.clone(),
            tickers: config.notifications.tickers.clone(),
            meetup_sharing: config.chat.meetup_sharing,
            failure_reply: config.chat.failure_reply,
        }
    }
}

/// Connection supervisor: owns one real-time connection for its lifetime and
/// dispatches the events it delivers, one at a time.
pub struct Session {
    messaging: Arc<dyn MessagingClient>,
    prices: Arc<dyn PriceLookup>,
    router: CommandRouter,
    clock: Arc<dyn Clock>,
    broadcast_channel_id: String,
    tickers: Vec<String>,
    failure_reply: FailureReply,
    cancellation: CancellationToken,
    state: SessionState,
    last_digest_minute: Option<i64>,
}

impl Session {
    pub fn new(
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
        cancellation: CancellationToken,
    ) -> Self {
        let messaging = collaborators.messaging.clone();
        let prices = collaborators.prices.clone();
        let router = CommandRouter::new(collaborators, settings.lists, settings.meetup_sharing);

        Self {
            messaging,
            prices,
            router,
            clock,
            broadcast_channel_id: settings.broadcast_channel_id,
            tickers: settings.tickers,
            failure_reply: settings.failure_reply,
            cancellation,
            state: SessionState::Idle,
            last_digest_minute: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Connects and runs the dispatch loop until cancellation, an
    /// authentication rejection, or the end of the event stream.
    pub async fn run(&mut self) -> Result<StopReason, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyRan);
        }

        self.state = SessionState::Connecting;
        info!(event_name = "session.connecting", "opening real-time connection");

        let mut events = match self.messaging.connect().await {
            Ok(events) => events,
            Err(error) => {
                self.stop();
                return Err(SessionError::Connect(error));
            }
        };

        let me = match self.messaging.self_info().await {
            Ok(me) => me,
            Err(error) => {
                self.stop();
                drop(events);
                self.disconnect().await;
                return Err(SessionError::SelfInfo(error));
            }
        };

        let cancellation = self.cancellation.clone();
        let reason = loop {
            if cancellation.is_cancelled() {
                break StopReason::Cancelled;
            }

            let next = tokio::select! {
                biased;
                _ = cancellation.cancelled() => None,
                event = events.recv() => Some(event),
            };
            let Some(next) = next else {
                break StopReason::Cancelled;
            };
            let Some(event) = next else {
                break StopReason::StreamClosed;
            };

            if self.state == SessionState::Connecting {
                self.state = SessionState::Running;
                info!(
                    event_name = "session.running",
                    self_id = %me.user_id,
                    "event stream is live"
                );
            }

            if let Some(reason) = self.dispatch(event, &me).await {
                break reason;
            }
        };

        self.stop();
        // The connection task may be parked on a full stream; release it first.
        drop(events);
        self.disconnect().await;
        info!(event_name = "session.stopped", reason = ?reason, "session stopped");
        Ok(reason)
    }

    async fn dispatch(&mut self, event: InboundEvent, me: &SelfInfo) -> Option<StopReason> {
        let correlation_id = Uuid::new_v4().to_string();
        debug!(
            event_name = "ingress.slack.event_received",
            event_type = event.event_type().as_str(),
            correlation_id = %correlation_id,
            "received inbound event"
        );

        match event {
            InboundEvent::ConnectionEstablished { connection_count } => {
                info!(
                    event_name = "ingress.slack.connected",
                    correlation_id = %correlation_id,
                    connection_count,
                    "real-time connection established"
                );
                None
            }
            InboundEvent::TextMessage(message) => {
                self.handle_text_message(message, me, &correlation_id).await;
                None
            }
            InboundEvent::TransportError { description } => {
                warn!(
                    event_name = "ingress.slack.transport_error",
                    correlation_id = %correlation_id,
                    error = %description,
                    "transport error reported on event stream"
                );
                None
            }
            InboundEvent::LivenessSignal { latency } => {
                debug!(
                    event_name = "ingress.slack.liveness",
                    correlation_id = %correlation_id,
                    latency_ms = latency.as_millis() as u64,
                    "liveness signal"
                );
                self.handle_liveness(&correlation_id).await;
                None
            }
            InboundEvent::AuthenticationRejected => {
                error!(
                    event_name = "ingress.slack.auth_rejected",
                    correlation_id = %correlation_id,
                    "slack rejected the bot credentials; stopping session"
                );
                Some(StopReason::AuthenticationRejected)
            }
        }
    }

    async fn handle_text_message(
        &self,
        message: TextMessageEvent,
        me: &SelfInfo,
        correlation_id: &str,
    ) {
        let prefix = me.address_prefix();
        let from_self = message.user_id == me.user_id;
        let addressed = message.text.starts_with(&prefix);
        let shared_meetup =
            self.router.meetup_sharing() && message.text.starts_with(MEETUP_LINK_PREFIX);
        let reply = !from_self && (addressed || shared_meetup);

        let command = normalize(&message.text, &prefix);
        info!(
            event_name = "ingress.slack.text_message",
            correlation_id,
            channel_id = %message.channel_id,
            user_id = %message.user_id,
            command = self.router.classify(&command).name(),
            addressed,
            reply,
            "routing text message"
        );

        match self.router.route(&command).await {
            Ok(text) if reply => {
                self.send(&text, &message.channel_id, correlation_id).await;
            }
            Ok(_) => {
                debug!(
                    event_name = "command.reply_suppressed",
                    correlation_id,
                    channel_id = %message.channel_id,
                    "message was not addressed to the bot; reply not sent"
                );
            }
            Err(error) => {
                warn!(
                    event_name = "command.failed",
                    correlation_id,
                    channel_id = %message.channel_id,
                    error_class = error.error_class(),
                    error = %error,
                    "command failed"
                );
                if reply && self.failure_reply == FailureReply::Notice {
                    self.send(FAILURE_NOTICE, &message.channel_id, correlation_id).await;
                }
            }
        }
    }

    async fn handle_liveness(&mut self, correlation_id: &str) {
        let Some(minute) = due_window(self.clock.as_ref()) else {
            return;
        };
        if self.last_digest_minute == Some(minute) {
            debug!(
                event_name = "schedule.digest.already_sent",
                correlation_id,
                "digest already sent in this window"
            );
            return;
        }
        self.last_digest_minute = Some(minute);

        let digest = scheduled_digest(self.prices.as_ref(), &self.tickers).await;
        if digest.is_empty() {
            warn!(
                event_name = "schedule.digest.empty",
                correlation_id,
                tickers = self.tickers.len(),
                "every ticker lookup failed; digest not sent"
            );
            return;
        }

        info!(
            event_name = "schedule.digest.fired",
            correlation_id,
            channel_id = %self.broadcast_channel_id,
            "sending scheduled share price digest"
        );
        self.send(&digest, &self.broadcast_channel_id, correlation_id).await;
    }

    async fn send(&self, text: &str, channel_id: &str, correlation_id: &str) {
        if text.is_empty() {
            debug!(
                event_name = "egress.slack.empty_reply",
                correlation_id,
                channel_id,
                "reply is empty; nothing sent"
            );
            return;
        }

        match self.messaging.send_message(text, channel_id).await {
            Ok(()) => debug!(
                event_name = "egress.slack.message_sent",
                correlation_id,
                channel_id,
                "message sent"
            ),
            Err(error) => warn!(
                event_name = "egress.slack.message_failed",
                correlation_id,
                channel_id,
                error_class = error.error_class(),
                error = %error,
                "could not send message"
            ),
        }
    }

    fn stop(&mut self) {
        self.state = SessionState::Stopped;
        self.cancellation.cancel();
    }

    async fn disconnect(&self) {
        if let Err(error) = self.messaging.disconnect().await {
            warn!(
                event_name = "session.disconnect_failed",
                error = %error,
                "could not close real-time connection cleanly"
            );
        }
    }
}
