//! In-memory collaborators shared by the router and session tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use rudolph_core::board::{BoardCard, BoardClient};
use rudolph_core::config::BoardConfig;
use rudolph_core::errors::CollaboratorError;
use rudolph_core::jokes::JokeSource;
use rudolph_core::market::{price_line, PriceLookup};
use rudolph_core::meetups::MeetupPages;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::commands::{Collaborators, CommandRouter};
use crate::events::{InboundEvent, SelfInfo};
use crate::messaging::{EventStream, MessagingClient, MessagingError};

pub const SELF_ID: &str = "UBOT";

pub fn lists() -> BoardConfig {
    BoardConfig {
        ideas_list_id: "ideas-list".to_owned(),
        scheduled_list_id: "scheduled-list".to_owned(),
        meetups_list_id: "meetups-list".to_owned(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoardCall {
    List(String),
    Create { title: String, list_id: String },
}

#[derive(Default)]
pub struct RecordingBoard {
    state: Mutex<BoardState>,
}

#[derive(Default)]
struct BoardState {
    lists: HashMap<String, Vec<BoardCard>>,
    calls: Vec<BoardCall>,
    fail_creates: bool,
    cancel_on_create: Option<CancellationToken>,
}

impl RecordingBoard {
    pub async fn seed(&self, list_id: &str, titles: &[&str]) {
        let cards = titles.iter().map(|title| BoardCard::new(*title)).collect();
        self.state.lock().await.lists.insert(list_id.to_owned(), cards);
    }

    pub async fn fail_creates(&self) {
        self.state.lock().await.fail_creates = true;
    }

    /// Cancels `token` as a side effect of the next create call.
    pub async fn cancel_on_create(&self, token: CancellationToken) {
        self.state.lock().await.cancel_on_create = Some(token);
    }

    pub async fn calls(&self) -> Vec<BoardCall> {
        self.state.lock().await.calls.clone()
    }
}

#[async_trait]
impl BoardClient for RecordingBoard {
    async fn list_cards(&self, list_id: &str) -> Result<Vec<BoardCard>, CollaboratorError> {
        let mut state = self.state.lock().await;
        state.calls.push(BoardCall::List(list_id.to_owned()));
        Ok(state.lists.get(list_id).cloned().unwrap_or_default())
    }

    async fn create_item(&self, title: &str, list_id: &str) -> Result<(), CollaboratorError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(BoardCall::Create { title: title.to_owned(), list_id: list_id.to_owned() });
        if let Some(token) = state.cancel_on_create.take() {
            token.cancel();
        }
        if state.fail_creates {
            return Err(CollaboratorError::status(format!("could not add card to {list_id}"), 500));
        }
        Ok(())
    }
}

pub struct StaticJoke;

#[async_trait]
impl JokeSource for StaticJoke {
    async fn fetch_joke(&self) -> Result<String, CollaboratorError> {
        Ok("I used to hate facial hair, but then it grew on me.".to_owned())
    }
}

/// Quotes 11.99 for every symbol except the ones marked as failing.
#[derive(Default)]
pub struct FlatPrices {
    failing: HashSet<String>,
}

impl FlatPrices {
    pub fn failing(symbols: &[&str]) -> Self {
        Self { failing: symbols.iter().map(|symbol| (*symbol).to_owned()).collect() }
    }
}

#[async_trait]
impl PriceLookup for FlatPrices {
    async fn fetch_price(&self, symbol: &str) -> Result<String, CollaboratorError> {
        if self.failing.contains(symbol) {
            return Err(CollaboratorError::malformed(format!("price for {symbol}"), "no marker"));
        }
        Ok(price_line(symbol, "11.99"))
    }
}

pub struct StaticMeetupPage;

#[async_trait]
impl MeetupPages for StaticMeetupPage {
    async fn event_title(&self, _url: &str) -> Result<String, CollaboratorError> {
        Ok("Rust Night".to_owned())
    }
}

pub struct ScriptedMessaging {
    state: Mutex<MessagingState>,
}

#[derive(Default)]
struct MessagingState {
    stream: Option<EventStream>,
    connect_error: Option<MessagingError>,
    disconnects: u32,
    sent: Vec<(String, String)>,
    opened: Vec<String>,
    display_names: HashMap<String, String>,
}

impl ScriptedMessaging {
    /// A connection whose stream yields `events` and then closes.
    pub fn with_events(events: Vec<InboundEvent>) -> Self {
        let (sender, receiver) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = sender.try_send(event);
        }
        Self::with_stream(receiver)
    }

    pub fn with_stream(stream: EventStream) -> Self {
        Self {
            state: Mutex::new(MessagingState { stream: Some(stream), ..MessagingState::default() }),
        }
    }

    pub fn failing_connect(error: MessagingError) -> Self {
        Self {
            state: Mutex::new(MessagingState {
                connect_error: Some(error),
                ..MessagingState::default()
            }),
        }
    }

    pub async fn set_display_name(&self, user_id: &str, name: &str) {
        self.state.lock().await.display_names.insert(user_id.to_owned(), name.to_owned());
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().await.sent.clone()
    }

    pub async fn opened_channels(&self) -> Vec<String> {
        self.state.lock().await.opened.clone()
    }

    pub async fn disconnects(&self) -> u32 {
        self.state.lock().await.disconnects
    }
}

#[async_trait]
impl MessagingClient for ScriptedMessaging {
    async fn connect(&self) -> Result<EventStream, MessagingError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.connect_error.clone() {
            return Err(error);
        }
        state.stream.take().ok_or(MessagingError::AlreadyConnected)
    }

    async fn self_info(&self) -> Result<SelfInfo, MessagingError> {
        Ok(SelfInfo { user_id: SELF_ID.to_owned(), name: "rudolph".to_owned() })
    }

    async fn send_message(&self, text: &str, channel_id: &str) -> Result<(), MessagingError> {
        self.state.lock().await.sent.push((text.to_owned(), channel_id.to_owned()));
        Ok(())
    }

    async fn open_private_channel(&self, user_id: &str) -> Result<String, MessagingError> {
        self.state.lock().await.opened.push(user_id.to_owned());
        Ok(format!("D-{user_id}"))
    }

    async fn user_display_name(&self, user_id: &str) -> Result<String, MessagingError> {
        self.state.lock().await.display_names.get(user_id).cloned().ok_or_else(|| {
            MessagingError::Api {
                method: "users.info".to_owned(),
                error: "user_not_found".to_owned(),
            }
        })
    }

    async fn channel_members(&self, _channel_id: &str) -> Result<Vec<String>, MessagingError> {
        Ok(vec![SELF_ID.to_owned()])
    }

    async fn disconnect(&self) -> Result<(), MessagingError> {
        self.state.lock().await.disconnects += 1;
        Ok(())
    }
}

pub fn collaborators(
    board: Arc<RecordingBoard>,
    prices: FlatPrices,
    messaging: Arc<ScriptedMessaging>,
) -> Collaborators {
    Collaborators {
        board,
        jokes: Arc::new(StaticJoke),
        prices: Arc::new(prices),
        meetups: Arc::new(StaticMeetupPage),
        messaging,
    }
}

pub struct Harness {
    pub router: CommandRouter,
    pub board: Arc<RecordingBoard>,
    pub messaging: Arc<ScriptedMessaging>,
}

pub fn harness() -> Harness {
    let board = Arc::new(RecordingBoard::default());
    let messaging = Arc::new(ScriptedMessaging::with_events(Vec::new()));
    let router = CommandRouter::new(
        collaborators(board.clone(), FlatPrices::default(), messaging.clone()),
        lists(),
        true,
    );
    Harness { router, board, messaging }
}
