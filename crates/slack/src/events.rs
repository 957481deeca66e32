use std::time::Duration;

/// One unit delivered on the real-time event stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    ConnectionEstablished { connection_count: u32 },
    TextMessage(TextMessageEvent),
    TransportError { description: String },
    /// Reply to a liveness ping; `latency` is the measured round trip.
    LivenessSignal { latency: Duration },
    AuthenticationRejected,
}

impl InboundEvent {
    pub fn event_type(&self) -> InboundEventType {
        match self {
            Self::ConnectionEstablished { .. } => InboundEventType::ConnectionEstablished,
            Self::TextMessage(_) => InboundEventType::TextMessage,
            Self::TransportError { .. } => InboundEventType::TransportError,
            Self::LivenessSignal { .. } => InboundEventType::LivenessSignal,
            Self::AuthenticationRejected => InboundEventType::AuthenticationRejected,
        }
    }

    pub fn text_message(
        user_id: impl Into<String>,
        text: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self::TextMessage(TextMessageEvent {
            user_id: user_id.into(),
            text: text.into(),
            channel_id: channel_id.into(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InboundEventType {
    ConnectionEstablished,
    TextMessage,
    TransportError,
    LivenessSignal,
    AuthenticationRejected,
}

impl InboundEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionEstablished => "connection_established",
            Self::TextMessage => "text_message",
            Self::TransportError => "transport_error",
            Self::LivenessSignal => "liveness_signal",
            Self::AuthenticationRejected => "authentication_rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessageEvent {
    pub user_id: String,
    pub text: String,
    pub channel_id: String,
}

/// The bot's own identity on the workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelfInfo {
    pub user_id: String,
    pub name: String,
}

impl SelfInfo {
    pub fn address_prefix(&self) -> String {
        address_prefix(&self.user_id)
    }
}

/// `<@id> `, the text a message must start with to address user `id`.
pub fn address_prefix(user_id: &str) -> String {
    format!("<@{user_id}> ")
}
