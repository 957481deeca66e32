//! Slack RTM client.
//!
//! `SlackWebApi` wraps the handful of Web API methods the bot calls.
//! `RtmClient` owns the websocket: `connect` spawns one manager task that
//! keeps the socket alive (pings, reconnects with backoff) and feeds the
//! event stream; the supervisor only ever sees the receiving half.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{InboundEvent, SelfInfo};
use crate::messaging::{EventStream, MessagingClient, MessagingError};

const EVENT_BUFFER: usize = 64;

/// Web API error codes that mean the token itself is no good.
const AUTH_ERROR_CODES: [&str; 4] =
    ["invalid_auth", "not_authed", "account_inactive", "token_revoked"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Debug)]
pub struct RtmSettings {
    pub api_base_url: String,
    pub ping_interval: Duration,
    pub http_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

pub fn is_auth_error(code: &str) -> bool {
    AUTH_ERROR_CODES.contains(&code)
}

pub struct SlackWebApi {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    ok: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct RtmConnectResponse {
    url: String,
    #[serde(rename = "self")]
    me: RtmSelf,
}

#[derive(Deserialize)]
struct RtmSelf {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ConversationsOpenResponse {
    channel: ConversationRef,
}

#[derive(Deserialize)]
struct ConversationRef {
    id: String,
}

#[derive(Deserialize)]
struct UsersInfoResponse {
    user: SlackUser,
}

#[derive(Deserialize)]
struct SlackUser {
    name: Option<String>,
    real_name: Option<String>,
    profile: Option<SlackProfile>,
}

#[derive(Deserialize)]
struct SlackProfile {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct MembersResponse {
    members: Vec<String>,
}

impl SlackWebApi {
    pub fn new(
        base_url: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, MessagingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| MessagingError::Transport(error.to_string()))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_owned(), token })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, MessagingError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.expose_secret())
            .form(params)
            .send()
            .await
            .map_err(|error| MessagingError::Transport(format!("{method}: {error}")))?;

        if !response.status().is_success() {
            return Err(MessagingError::Api {
                method: method.to_owned(),
                error: format!("http_{}", response.status().as_u16()),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|error| MessagingError::Transport(format!("{method}: {error}")))?;
        let envelope: ApiEnvelope = serde_json::from_value(body.clone())
            .map_err(|error| MessagingError::Transport(format!("{method}: {error}")))?;

        if !envelope.ok {
            let code = envelope.error.unwrap_or_else(|| "unknown_error".to_owned());
            if is_auth_error(&code) {
                return Err(MessagingError::AuthenticationRejected);
            }
            return Err(MessagingError::Api { method: method.to_owned(), error: code });
        }

        serde_json::from_value(body)
            .map_err(|error| MessagingError::Transport(format!("{method}: {error}")))
    }

    /// Returns the websocket url and the bot identity.
    pub async fn rtm_connect(&self) -> Result<(String, SelfInfo), MessagingError> {
        let response: RtmConnectResponse = self.call("rtm.connect", &[]).await?;
        Ok((response.url, SelfInfo { user_id: response.me.id, name: response.me.name }))
    }

    pub async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), MessagingError> {
        let _: serde_json::Value =
            self.call("chat.postMessage", &[("channel", channel_id), ("text", text)]).await?;
        Ok(())
    }

    pub async fn open_conversation(&self, user_id: &str) -> Result<String, MessagingError> {
        let response: ConversationsOpenResponse =
            self.call("conversations.open", &[("users", user_id)]).await?;
        Ok(response.channel.id)
    }

    /// Display name, falling back to the real name and then the handle.
    pub async fn user_name(&self, user_id: &str) -> Result<String, MessagingError> {
        let response: UsersInfoResponse = self.call("users.info", &[("user", user_id)]).await?;
        let user = response.user;
        let display_name = user.profile.and_then(|profile| profile.display_name);

        [display_name, user.real_name, user.name]
            .into_iter()
            .flatten()
            .find(|name| !name.trim().is_empty())
            .ok_or_else(|| MessagingError::Api {
                method: "users.info".to_owned(),
                error: "no_display_name".to_owned(),
            })
    }

    pub async fn conversation_members(
        &self,
        channel_id: &str,
    ) -> Result<Vec<String>, MessagingError> {
        let response: MembersResponse =
            self.call("conversations.members", &[("channel", channel_id)]).await?;
        Ok(response.members)
    }
}

/// A frame read off the RTM websocket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RtmFrame {
    Hello,
    Event(InboundEvent),
    Pong { reply_to: u64 },
    Goodbye,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    subtype: Option<String>,
    user: Option<String>,
    text: Option<String>,
    channel: Option<String>,
    reply_to: Option<u64>,
    error: Option<RawFrameError>,
}

#[derive(Deserialize)]
struct RawFrameError {
    code: Option<i64>,
    msg: Option<String>,
}

/// Classifies one websocket text frame. Frames the bot has no use for
/// (presence changes, typing, edited messages) yield `None`.
pub fn parse_frame(raw: &str) -> Option<RtmFrame> {
    let frame: RawFrame = serde_json::from_str(raw).ok()?;

    match frame.kind.as_deref()? {
        "hello" => Some(RtmFrame::Hello),
        "goodbye" => Some(RtmFrame::Goodbye),
        "pong" => frame.reply_to.map(|reply_to| RtmFrame::Pong { reply_to }),
        "message" if frame.subtype.is_none() => {
            let (user_id, text, channel_id) = (frame.user?, frame.text?, frame.channel?);
            Some(RtmFrame::Event(InboundEvent::text_message(user_id, text, channel_id)))
        }
        "error" => {
            let description = match frame.error {
                Some(RawFrameError { code, msg }) => format!(
                    "rtm error {}: {}",
                    code.unwrap_or_default(),
                    msg.unwrap_or_else(|| "unspecified".to_owned())
                ),
                None => "rtm error".to_owned(),
            };
            Some(RtmFrame::Event(InboundEvent::TransportError { description }))
        }
        _ => None,
    }
}

struct ActiveConnection {
    me: SelfInfo,
    shutdown: CancellationToken,
    manager: JoinHandle<()>,
}

pub struct RtmClient {
    api: Arc<SlackWebApi>,
    settings: RtmSettings,
    active: Mutex<Option<ActiveConnection>>,
}

impl RtmClient {
    pub fn new(token: SecretString, settings: RtmSettings) -> Result<Self, MessagingError> {
        let api = SlackWebApi::new(settings.api_base_url.clone(), token, settings.http_timeout)?;
        Ok(Self { api: Arc::new(api), settings, active: Mutex::new(None) })
    }
}

#[async_trait]
impl MessagingClient for RtmClient {
    async fn connect(&self) -> Result<EventStream, MessagingError> {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|connection| !connection.manager.is_finished()) {
            return Err(MessagingError::AlreadyConnected);
        }

        let (url, me) = self.api.rtm_connect().await?;
        info!(
            event_name = "ingress.slack.rtm_connect",
            self_id = %me.user_id,
            "rtm.connect accepted the bot token"
        );

        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        let shutdown = CancellationToken::new();
        let manager = tokio::spawn(manage_connection(
            self.api.clone(),
            url,
            sender,
            self.settings.clone(),
            shutdown.clone(),
        ));

        *active = Some(ActiveConnection { me, shutdown, manager });
        Ok(receiver)
    }

    async fn self_info(&self) -> Result<SelfInfo, MessagingError> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|connection| connection.me.clone())
            .ok_or(MessagingError::NotConnected)
    }

    async fn send_message(&self, text: &str, channel_id: &str) -> Result<(), MessagingError> {
        self.api.post_message(channel_id, text).await
    }

    async fn open_private_channel(&self, user_id: &str) -> Result<String, MessagingError> {
        self.api.open_conversation(user_id).await
    }

    async fn user_display_name(&self, user_id: &str) -> Result<String, MessagingError> {
        self.api.user_name(user_id).await
    }

    async fn channel_members(&self, channel_id: &str) -> Result<Vec<String>, MessagingError> {
        self.api.conversation_members(channel_id).await
    }

    async fn disconnect(&self) -> Result<(), MessagingError> {
        let Some(connection) = self.active.lock().await.take() else {
            return Ok(());
        };

        connection.shutdown.cancel();
        connection
            .manager
            .await
            .map_err(|error| MessagingError::Transport(format!("connection task failed: {error}")))
    }
}

enum PumpExit {
    Shutdown,
    ReceiverGone,
    Closed,
}

async fn manage_connection(
    api: Arc<SlackWebApi>,
    first_url: String,
    sender: mpsc::Sender<InboundEvent>,
    settings: RtmSettings,
    shutdown: CancellationToken,
) {
    let mut next_url = Some(first_url);
    let mut connection_count = 0_u32;
    let mut failures = 0_u32;

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let url = match next_url.take() {
            Some(url) => url,
            None => match api.rtm_connect().await {
                Ok((url, _)) => url,
                Err(MessagingError::AuthenticationRejected) => {
                    forward(&sender, &shutdown, InboundEvent::AuthenticationRejected).await;
                    return;
                }
                Err(error) => {
                    let description = error.to_string();
                    let retry = retry_after_failure(
                        &sender,
                        &settings,
                        &shutdown,
                        &mut failures,
                        description,
                    );
                    if !retry.await {
                        return;
                    }
                    continue;
                }
            },
        };

        let connections_before = connection_count;
        let outcome = pump(&url, &sender, &settings, &shutdown, &mut connection_count).await;
        if connection_count > connections_before {
            failures = 0;
        }

        match outcome {
            Ok(PumpExit::Shutdown) | Ok(PumpExit::ReceiverGone) => return,
            Ok(PumpExit::Closed) => {
                info!(event_name = "ingress.slack.rtm_closed", "rtm socket closed; reconnecting");
            }
            Err(description) => {
                if !retry_after_failure(&sender, &settings, &shutdown, &mut failures, description)
                    .await
                {
                    return;
                }
            }
        }
    }
}

/// Reports a failed attempt on the stream and waits out the backoff.
/// Returns false once retries are exhausted or shutdown was requested.
async fn retry_after_failure(
    sender: &mpsc::Sender<InboundEvent>,
    settings: &RtmSettings,
    shutdown: &CancellationToken,
    failures: &mut u32,
    description: String,
) -> bool {
    let attempt = *failures;
    *failures += 1;
    warn!(
        event_name = "ingress.slack.rtm_failed",
        attempt,
        max_retries = settings.reconnect.max_retries,
        error = %description,
        "rtm connection failed"
    );

    if !forward(sender, shutdown, InboundEvent::TransportError { description }).await {
        return false;
    }

    if attempt >= settings.reconnect.max_retries {
        warn!(
            event_name = "ingress.slack.rtm_retries_exhausted",
            max_retries = settings.reconnect.max_retries,
            "rtm reconnect retries exhausted; closing event stream"
        );
        return false;
    }

    let delay = settings.reconnect.backoff(attempt);
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Hands `event` to the supervisor. Returns false when the receiver is gone
/// or shutdown was requested while the stream was full.
async fn forward(
    sender: &mpsc::Sender<InboundEvent>,
    shutdown: &CancellationToken,
    event: InboundEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        sent = sender.send(event) => sent.is_ok(),
    }
}

async fn pump(
    url: &str,
    sender: &mpsc::Sender<InboundEvent>,
    settings: &RtmSettings,
    shutdown: &CancellationToken,
    connection_count: &mut u32,
) -> Result<PumpExit, String> {
    let (socket, _) =
        tokio_tungstenite::connect_async(url).await.map_err(|error| error.to_string())?;
    *connection_count += 1;
    let (mut sink, mut source) = socket.split();

    let mut ticker = tokio::time::interval(settings.ping_interval);
    ticker.tick().await;
    let mut next_ping_id = 1_u64;
    let mut pending_pings: HashMap<u64, Instant> = HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.close().await;
                return Ok(PumpExit::Shutdown);
            }
            _ = ticker.tick() => {
                let ping = serde_json::json!({ "id": next_ping_id, "type": "ping" }).to_string();
                sink.send(Message::Text(ping)).await.map_err(|error| error.to_string())?;
                pending_pings.insert(next_ping_id, Instant::now());
                next_ping_id += 1;
            }
            frame = source.next() => {
                let event = match frame {
                    None | Some(Ok(Message::Close(_))) => return Ok(PumpExit::Closed),
                    Some(Err(error)) => return Err(error.to_string()),
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        Some(RtmFrame::Hello) => Some(InboundEvent::ConnectionEstablished {
                            connection_count: *connection_count,
                        }),
                        Some(RtmFrame::Event(event)) => Some(event),
                        Some(RtmFrame::Pong { reply_to }) => pending_pings
                            .remove(&reply_to)
                            .map(|sent| InboundEvent::LivenessSignal { latency: sent.elapsed() }),
                        Some(RtmFrame::Goodbye) => return Ok(PumpExit::Closed),
                        None => None,
                    },
                    Some(Ok(_)) => None,
                };

                if let Some(event) = event {
                    debug!(
                        event_name = "ingress.slack.frame",
                        event_type = event.event_type().as_str(),
                        "forwarding rtm event"
                    );
                    if !forward(sender, shutdown, event).await {
                        let _ = sink.close().await;
                        return Ok(PumpExit::ReceiverGone);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{extract::Form, routing::post, Json, Router};
    use chrono::{TimeZone, Utc};
    use futures_util::{SinkExt, StreamExt};
    use rudolph_core::board::{BoardCard, BoardClient};
    use rudolph_core::clock::FixedClock;
    use rudolph_core::config::FailureReply;
    use rudolph_core::errors::CollaboratorError;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::WebSocketStream;
    use tokio_util::sync::CancellationToken;

    use super::{parse_frame, ReconnectPolicy, RtmClient, RtmFrame, RtmSettings, SlackWebApi};
    use crate::commands::Collaborators;
    use crate::events::InboundEvent;
    use crate::messaging::{EventStream, MessagingClient, MessagingError};
    use crate::session::{Session, SessionSettings, StopReason};
    use crate::testing::{lists, FlatPrices, StaticJoke, StaticMeetupPage};

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(3), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(5_000));
    }

    #[test]
    fn parses_plain_messages_into_text_events() {
        let frame = parse_frame(
            r#"{"type":"message","user":"U1","text":"<@UBOT> ideas","channel":"C1","ts":"1.2"}"#,
        );
        assert_eq!(
            frame,
            Some(RtmFrame::Event(InboundEvent::text_message("U1", "<@UBOT> ideas", "C1")))
        );
    }

    #[test]
    fn ignores_edited_messages_and_unknown_frames() {
        assert_eq!(parse_frame(r#"{"type":"message","subtype":"message_changed"}"#), None);
        assert_eq!(parse_frame(r#"{"type":"user_typing","channel":"C1"}"#), None);
        assert_eq!(parse_frame("not json"), None);
    }

    #[test]
    fn parses_control_frames() {
        assert_eq!(parse_frame(r#"{"type":"hello"}"#), Some(RtmFrame::Hello));
        assert_eq!(parse_frame(r#"{"type":"goodbye"}"#), Some(RtmFrame::Goodbye));
        assert_eq!(
            parse_frame(r#"{"type":"pong","reply_to":7}"#),
            Some(RtmFrame::Pong { reply_to: 7 })
        );
        assert_eq!(
            parse_frame(r#"{"type":"error","error":{"code":1,"msg":"Socket URL has expired"}}"#),
            Some(RtmFrame::Event(InboundEvent::TransportError {
                description: "rtm error 1: Socket URL has expired".to_owned()
            }))
        );
    }

    async fn stub_api(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let address = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    fn api(base_url: &str) -> SlackWebApi {
        let token = SecretString::from("xoxb-test".to_owned());
        SlackWebApi::new(base_url, token, Duration::from_secs(5)).expect("api client")
    }

    #[tokio::test]
    async fn post_message_sends_channel_and_text() {
        let router = Router::new().route(
            "/chat.postMessage",
            post(|Form(form): Form<Vec<(String, String)>>| async move {
                let channel = form.iter().any(|(key, value)| key == "channel" && value == "C1");
                let text = form.iter().any(|(key, value)| key == "text" && value == "hi");
                if channel && text {
                    Json(json!({ "ok": true }))
                } else {
                    Json(json!({ "ok": false, "error": "bad_request" }))
                }
            }),
        );
        let base_url = stub_api(router).await;

        api(&base_url).post_message("C1", "hi").await.expect("post message");
    }

    #[tokio::test]
    async fn api_errors_carry_method_and_code() {
        let router = Router::new().route(
            "/conversations.open",
            post(|| async { Json(json!({ "ok": false, "error": "user_not_found" })) }),
        );
        let base_url = stub_api(router).await;

        let error = api(&base_url).open_conversation("U404").await.expect_err("api error");

        assert_eq!(
            error,
            MessagingError::Api {
                method: "conversations.open".to_owned(),
                error: "user_not_found".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn user_name_prefers_display_name_then_real_name() {
        let router = Router::new().route(
            "/users.info",
            post(|Form(form): Form<Vec<(String, String)>>| async move {
                let user =
                    form.iter().find(|(key, _)| key == "user").map(|(_, value)| value.clone());
                let body: Value = match user.as_deref() {
                    Some("U1") => json!({ "ok": true, "user": {
                        "name": "kal", "real_name": "Kal El", "profile": { "display_name": "kally" }
                    }}),
                    _ => json!({ "ok": true, "user": {
                        "name": "sam", "real_name": "Sam Smith", "profile": { "display_name": "" }
                    }}),
                };
                Json(body)
            }),
        );
        let base_url = stub_api(router).await;
        let api = api(&base_url);

        assert_eq!(api.user_name("U1").await.expect("display name"), "kally");
        assert_eq!(api.user_name("U2").await.expect("real name"), "Sam Smith");
    }

    #[tokio::test]
    async fn connect_with_revoked_token_is_authentication_rejected() {
        let router = Router::new().route(
            "/rtm.connect",
            post(|| async { Json(json!({ "ok": false, "error": "invalid_auth" })) }),
        );
        let base_url = stub_api(router).await;
        let client = RtmClient::new(
            SecretString::from("xoxb-revoked".to_owned()),
            RtmSettings {
                api_base_url: base_url,
                ping_interval: Duration::from_secs(30),
                http_timeout: Duration::from_secs(5),
                reconnect: ReconnectPolicy::default(),
            },
        )
        .expect("client");

        let error = client.connect().await.expect_err("connect should be rejected");

        assert_eq!(error, MessagingError::AuthenticationRejected);
        assert_eq!(
            client.self_info().await.expect_err("not connected"),
            MessagingError::NotConnected
        );
        client.disconnect().await.expect("disconnect without connection is a no-op");
    }

    #[tokio::test]
    async fn conversation_members_lists_user_ids() {
        let router = Router::new().route(
            "/conversations.members",
            post(|Form(form): Form<Vec<(String, String)>>| async move {
                let channel = form.iter().any(|(key, value)| key == "channel" && value == "C1");
                if channel {
                    Json(json!({ "ok": true, "members": ["U1", "U2", "UBOT"] }))
                } else {
                    Json(json!({ "ok": false, "error": "channel_not_found" }))
                }
            }),
        );
        let base_url = stub_api(router).await;

        let members = api(&base_url).conversation_members("C1").await.expect("members");

        assert_eq!(members, vec!["U1", "U2", "UBOT"]);
    }

    fn connect_ok(socket_url: &str) -> Value {
        json!({ "ok": true, "url": socket_url, "self": { "id": "UBOT", "name": "rudolph" } })
    }

    /// Web API stub whose `rtm.connect` answers with `responses` in order,
    /// repeating the last one.
    async fn web_api(responses: Vec<Value>) -> String {
        let responses = Arc::new(responses);
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/rtm.connect",
                post(move || {
                    let responses = responses.clone();
                    let calls = calls.clone();
                    async move {
                        let call = calls.fetch_add(1, Ordering::SeqCst);
                        Json(responses[call.min(responses.len() - 1)].clone())
                    }
                }),
            )
            .route("/chat.postMessage", post(|| async { Json(json!({ "ok": true })) }));
        stub_api(router).await
    }

    /// Accepts websocket connections and hands each one, numbered from zero,
    /// to `handler`.
    async fn socket_server<H, F>(handler: H) -> String
    where
        H: Fn(usize, WebSocketStream<TcpStream>) -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind socket");
        let address = listener.local_addr().expect("socket address");
        tokio::spawn(async move {
            let mut index = 0;
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(socket) = tokio_tungstenite::accept_async(stream).await {
                    tokio::spawn(handler(index, socket));
                    index += 1;
                }
            }
        });
        format!("ws://{address}/")
    }

    fn hello() -> Message {
        Message::Text(json!({ "type": "hello" }).to_string())
    }

    async fn hello_then_answer_pings(mut socket: WebSocketStream<TcpStream>) {
        if socket.send(hello()).await.is_err() {
            return;
        }
        while let Some(Ok(message)) = socket.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let Ok(ping) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            if ping["type"] == "ping" {
                let pong = json!({ "type": "pong", "reply_to": ping["id"] }).to_string();
                if socket.send(Message::Text(pong)).await.is_err() {
                    return;
                }
            }
        }
    }

    async fn hello_then_close(mut socket: WebSocketStream<TcpStream>) {
        let _ = socket.send(hello()).await;
        let _ = socket.close(None).await;
    }

    fn rtm_client(base_url: String, ping_interval: Duration) -> RtmClient {
        RtmClient::new(
            SecretString::from("xoxb-test".to_owned()),
            RtmSettings {
                api_base_url: base_url,
                ping_interval,
                http_timeout: Duration::from_secs(5),
                reconnect: ReconnectPolicy { max_retries: 2, base_delay_ms: 10, max_delay_ms: 50 },
            },
        )
        .expect("client")
    }

    async fn next_event(events: &mut EventStream) -> Option<InboundEvent> {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event stream should move within five seconds")
    }

    /// Next event that is not a transport error report.
    async fn next_significant_event(events: &mut EventStream) -> Option<InboundEvent> {
        loop {
            match next_event(events).await {
                Some(InboundEvent::TransportError { .. }) => continue,
                other => return other,
            }
        }
    }

    #[tokio::test]
    async fn hello_frames_count_connections_across_reconnects() {
        let socket_url = socket_server(|index, socket| async move {
            if index == 0 {
                hello_then_close(socket).await;
            } else {
                hello_then_answer_pings(socket).await;
            }
        })
        .await;
        let base_url = web_api(vec![connect_ok(&socket_url)]).await;
        let client = rtm_client(base_url, Duration::from_secs(30));

        let mut events = client.connect().await.expect("connect");

        assert_eq!(
            next_significant_event(&mut events).await,
            Some(InboundEvent::ConnectionEstablished { connection_count: 1 })
        );
        assert_eq!(
            next_significant_event(&mut events).await,
            Some(InboundEvent::ConnectionEstablished { connection_count: 2 })
        );

        client.disconnect().await.expect("disconnect");
        assert_eq!(next_event(&mut events).await, None);
    }

    #[tokio::test]
    async fn pongs_become_liveness_signals_with_latency() {
        let socket_url = socket_server(|_, socket| hello_then_answer_pings(socket)).await;
        let client =
            rtm_client(web_api(vec![connect_ok(&socket_url)]).await, Duration::from_millis(20));

        let mut events = client.connect().await.expect("connect");

        assert_eq!(
            next_event(&mut events).await,
            Some(InboundEvent::ConnectionEstablished { connection_count: 1 })
        );
        match next_event(&mut events).await {
            Some(InboundEvent::LivenessSignal { latency }) => {
                assert!(latency < Duration::from_secs(5), "latency was {latency:?}");
            }
            other => panic!("expected a liveness signal, got {other:?}"),
        }

        client.disconnect().await.expect("disconnect");
    }

    #[tokio::test]
    async fn token_rejected_on_reconnect_is_reported_and_ends_the_stream() {
        let socket_url = socket_server(|_, socket| hello_then_close(socket)).await;
        let base_url = web_api(vec![
            connect_ok(&socket_url),
            json!({ "ok": false, "error": "token_revoked" }),
        ])
        .await;
        let client = rtm_client(base_url, Duration::from_secs(30));

        let mut events = client.connect().await.expect("connect");

        assert_eq!(
            next_significant_event(&mut events).await,
            Some(InboundEvent::ConnectionEstablished { connection_count: 1 })
        );
        assert_eq!(
            next_significant_event(&mut events).await,
            Some(InboundEvent::AuthenticationRejected)
        );
        assert_eq!(next_event(&mut events).await, None);
    }

    fn session_settings() -> SessionSettings {
        SessionSettings {
            lists: lists(),
            broadcast_channel_id: "DBROADCAST".to_owned(),
            tickers: vec!["xro asx".to_owned()],
            meetup_sharing: false,
            failure_reply: FailureReply::Silent,
        }
    }

    fn rtm_session(
        client: RtmClient,
        board: Arc<dyn BoardClient>,
        cancellation: CancellationToken,
    ) -> Session {
        let collaborators = Collaborators {
            board,
            jokes: Arc::new(StaticJoke),
            prices: Arc::new(FlatPrices::default()),
            meetups: Arc::new(StaticMeetupPage),
            messaging: Arc::new(client),
        };
        // Saturday: the digest gate stays shut.
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2018, 9, 22, 12, 0, 0).unwrap());
        Session::new(collaborators, Arc::new(clock), session_settings(), cancellation)
    }

    struct EmptyBoard;

    #[async_trait]
    impl BoardClient for EmptyBoard {
        async fn list_cards(&self, _list_id: &str) -> Result<Vec<BoardCard>, CollaboratorError> {
            Ok(Vec::new())
        }

        async fn create_item(&self, _title: &str, _list_id: &str) -> Result<(), CollaboratorError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn session_stops_with_stream_closed_once_retries_run_out() {
        let unused = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let dead_url = format!("ws://{}/", unused.local_addr().expect("address"));
        drop(unused);
        let base_url = web_api(vec![connect_ok(&dead_url)]).await;
        let client = rtm_client(base_url, Duration::from_secs(30));
        let mut session = rtm_session(client, Arc::new(EmptyBoard), CancellationToken::new());

        let outcome = tokio::time::timeout(Duration::from_secs(5), session.run()).await;

        assert!(matches!(outcome, Ok(Ok(StopReason::StreamClosed))), "got {outcome:?}");
    }

    /// Takes a while to add a card, then requests shutdown.
    struct SlowBoard {
        cancellation: CancellationToken,
    }

    #[async_trait]
    impl BoardClient for SlowBoard {
        async fn list_cards(&self, _list_id: &str) -> Result<Vec<BoardCard>, CollaboratorError> {
            Ok(Vec::new())
        }

        async fn create_item(&self, _title: &str, _list_id: &str) -> Result<(), CollaboratorError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.cancellation.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn shutdown_returns_promptly_while_the_event_stream_is_full() {
        let socket_url = socket_server(|_, mut socket| async move {
            let _ = socket.send(hello()).await;
            for index in 0..200 {
                let frame = json!({
                    "type": "message",
                    "user": "U1",
                    "channel": "C1",
                    "text": format!("<@UBOT> add idea {index}"),
                });
                if socket.send(Message::Text(frame.to_string())).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(_)) = socket.next().await {}
        })
        .await;
        let base_url = web_api(vec![connect_ok(&socket_url)]).await;
        let client = rtm_client(base_url, Duration::from_secs(30));
        let cancellation = CancellationToken::new();
        let board = Arc::new(SlowBoard { cancellation: cancellation.clone() });
        let mut session = rtm_session(client, board, cancellation);

        let outcome = tokio::time::timeout(Duration::from_secs(5), session.run()).await;

        assert!(matches!(outcome, Ok(Ok(StopReason::Cancelled))), "got {outcome:?}");
    }
}
