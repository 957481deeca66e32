use std::sync::Arc;

use rudolph_core::board::{render_titles, BoardClient};
use rudolph_core::config::BoardConfig;
use rudolph_core::errors::CollaboratorError;
use rudolph_core::jokes::JokeSource;
use rudolph_core::market::PriceLookup;
use rudolph_core::meetups::{
    meetup_card_title, unwrap_link, MeetupPages, MEETUP_LINK_PREFIX, MEETUP_SHARED_REPLY,
};
use thiserror::Error;
use tracing::debug;

use crate::messaging::{MessagingClient, MessagingError};

pub const HELP_TEXT: &str = "I can help you with: \n Fetching ideas - @rudolph ideas \n Fetching scheduled talks - @rudolph scheduled \n Adding an idea: @rudolph add <talk title> \n Dad joke - @rudolph make me laugh \n Help - @rudolph help";

pub const CONTRIBUTE_PREFIX: &str = "Sorry buddy, I don't know how to do that yet, why don't you contribute to my code base? \nhttps://github.com/dhruv11/rudolph\n";

pub const ADD_CONFIRMATION: &str = "easy, your idea is in there!";

pub const WAKE_UP_NUDGE: &str = "buddy stop napping at work, people are looking for you...";

pub const FAILURE_NOTICE: &str = "Sorry buddy, something went wrong on my end. Try again in a bit.";

/// Text of a message after the address prefix has been removed.
///
/// `text` is trimmed and case-folded and drives classification; `verbatim`
/// keeps the original casing for arguments that are identifiers (user
/// handles, links).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedCommand {
    pub text: String,
    pub verbatim: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Scheduled,
    Ideas,
    Add { title: String },
    Price { symbol: String },
    Joke,
    Help,
    WakeUp { handle: Option<String> },
    ShareMeetup { url: String },
    Unknown,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Ideas => "ideas",
            Self::Add { .. } => "add",
            Self::Price { .. } => "price",
            Self::Joke => "joke",
            Self::Help => "help",
            Self::WakeUp { .. } => "wake_up",
            Self::ShareMeetup { .. } => "share_meetup",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error("`wake up` needs a user mention such as <@U123>")]
    MissingHandle,
}

impl CommandRouteError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Collaborator(error) => error.error_class(),
            Self::Messaging(error) => error.error_class(),
            Self::MissingHandle => "command_missing_handle",
        }
    }
}

pub fn normalize(raw: &str, address_prefix: &str) -> NormalizedCommand {
    let stripped = raw.strip_prefix(address_prefix).unwrap_or(raw);
    let verbatim = stripped.trim().to_owned();
    NormalizedCommand { text: verbatim.to_lowercase(), verbatim }
}

/// Maps a normalized command to exactly one intent. The first matching
/// clause wins and the order below is load-bearing: suffix and prefix tests
/// can both match the same input.
pub fn classify(command: &NormalizedCommand, meetup_sharing: bool) -> Command {
    let text = command.text.as_str();

    if text.ends_with("scheduled") {
        Command::Scheduled
    } else if text.ends_with("ideas") {
        Command::Ideas
    } else if let Some(rest) = text.strip_prefix("add") {
        Command::Add { title: rest.trim().to_owned() }
    } else if let Some(rest) = text.strip_prefix("price") {
        Command::Price { symbol: rest.trim().to_owned() }
    } else if text == "make me laugh" {
        Command::Joke
    } else if text.starts_with("help") {
        Command::Help
    } else if text.starts_with("wake up") {
        Command::WakeUp { handle: extract_handle(&command.verbatim) }
    } else if meetup_sharing && command.verbatim.starts_with(MEETUP_LINK_PREFIX) {
        Command::ShareMeetup { url: unwrap_link(&command.verbatim).to_owned() }
    } else {
        Command::Unknown
    }
}

/// Pulls `U123` out of the first `<@U123>` (or `<@U123|name>`) mention.
pub fn extract_handle(text: &str) -> Option<String> {
    let start = text.find("<@")? + 2;
    let rest = &text[start..];
    let end = rest.find('>')?;
    let handle = rest[..end].split('|').next().unwrap_or_default().trim();
    (!handle.is_empty()).then(|| handle.to_owned())
}

pub fn contribute_text() -> String {
    format!("{CONTRIBUTE_PREFIX}{HELP_TEXT}")
}

/// Handles to every external system a command can touch.
#[derive(Clone)]
pub struct Collaborators {
    pub board: Arc<dyn BoardClient>,
    pub jokes: Arc<dyn JokeSource>,
    pub prices: Arc<dyn PriceLookup>,
    pub meetups: Arc<dyn MeetupPages>,
    pub messaging: Arc<dyn MessagingClient>,
}

pub struct CommandRouter {
    collaborators: Collaborators,
    lists: BoardConfig,
    meetup_sharing: bool,
}

impl CommandRouter {
    pub fn new(collaborators: Collaborators, lists: BoardConfig, meetup_sharing: bool) -> Self {
        Self { collaborators, lists, meetup_sharing }
    }

    pub fn meetup_sharing(&self) -> bool {
        self.meetup_sharing
    }

    pub fn classify(&self, command: &NormalizedCommand) -> Command {
        classify(command, self.meetup_sharing)
    }

    /// Runs the action for `command` and returns the text to send back.
    pub async fn route(&self, command: &NormalizedCommand) -> Result<String, CommandRouteError> {
        match self.classify(command) {
            Command::Scheduled => self.render_list(&self.lists.scheduled_list_id).await,
            Command::Ideas => self.render_list(&self.lists.ideas_list_id).await,
            Command::Add { title } => {
                self.collaborators.board.create_item(&title, &self.lists.ideas_list_id).await?;
                Ok(ADD_CONFIRMATION.to_owned())
            }
            Command::Price { symbol } => Ok(self.collaborators.prices.fetch_price(&symbol).await?),
            Command::Joke => Ok(self.collaborators.jokes.fetch_joke().await?),
            Command::Help => Ok(HELP_TEXT.to_owned()),
            Command::WakeUp { handle } => {
                let handle = handle.ok_or(CommandRouteError::MissingHandle)?;
                self.wake_up(&handle).await
            }
            Command::ShareMeetup { url } => self.share_meetup(&url).await,
            Command::Unknown => Ok(contribute_text()),
        }
    }

    async fn render_list(&self, list_id: &str) -> Result<String, CommandRouteError> {
        let titles = self.collaborators.board.list_titles(list_id).await?;
        Ok(render_titles(&titles))
    }

    async fn wake_up(&self, handle: &str) -> Result<String, CommandRouteError> {
        let messaging = &self.collaborators.messaging;
        let channel_id = messaging.open_private_channel(handle).await?;
        messaging.send_message(WAKE_UP_NUDGE, &channel_id).await?;

        match messaging.user_display_name(handle).await {
            Ok(name) if !name.trim().is_empty() => {
                Ok(format!("I've just pinged {name} for you :)"))
            }
            Ok(_) => Ok("I've just pinged them for you :)".to_owned()),
            Err(error) => {
                debug!(
                    event_name = "command.wake_up.display_name_unavailable",
                    user_id = handle,
                    error = %error,
                    "falling back to generic wake up reply"
                );
                Ok("I've just pinged them for you :)".to_owned())
            }
        }
    }

    async fn share_meetup(&self, url: &str) -> Result<String, CommandRouteError> {
        let title = self.collaborators.meetups.event_title(url).await?;
        self.collaborators
            .board
            .create_item(&meetup_card_title(&title, url), &self.lists.meetups_list_id)
            .await?;
        Ok(MEETUP_SHARED_REPLY.to_owned())
    }
}
