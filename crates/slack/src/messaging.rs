use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::{InboundEvent, SelfInfo};

/// Receiving half of the event stream. The connection-management activity
/// holds the only sender.
pub type EventStream = mpsc::Receiver<InboundEvent>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MessagingError {
    #[error("messaging transport failed: {0}")]
    Transport(String),
    #[error("slack api `{method}` returned `{error}`")]
    Api { method: String, error: String },
    #[error("slack rejected the bot credentials")]
    AuthenticationRejected,
    #[error("a real-time connection is already open")]
    AlreadyConnected,
    #[error("no real-time connection is open")]
    NotConnected,
}

impl MessagingError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Transport(_) => "messaging_transport",
            Self::Api { .. } => "messaging_api",
            Self::AuthenticationRejected => "messaging_auth",
            Self::AlreadyConnected => "messaging_already_connected",
            Self::NotConnected => "messaging_not_connected",
        }
    }
}

/// The chat platform as seen by the supervisor and the router.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Opens the real-time connection and hands back its event stream.
    /// At most one connection may be open at a time.
    async fn connect(&self) -> Result<EventStream, MessagingError>;

    async fn self_info(&self) -> Result<SelfInfo, MessagingError>;

    async fn send_message(&self, text: &str, channel_id: &str) -> Result<(), MessagingError>;

    async fn open_private_channel(&self, user_id: &str) -> Result<String, MessagingError>;

    async fn user_display_name(&self, user_id: &str) -> Result<String, MessagingError>;

    async fn channel_members(&self, channel_id: &str) -> Result<Vec<String>, MessagingError>;

    async fn disconnect(&self) -> Result<(), MessagingError>;
}
