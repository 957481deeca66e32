use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::errors::CollaboratorError;

pub const MEETUP_REMINDER_HEADER: &str = "It's your lucky day, we have a meetup later today:\n";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardCard {
    pub title: String,
    pub due: Option<DateTime<Utc>>,
}

impl BoardCard {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), due: None }
    }

    pub fn due(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }
}

/// The team board (lists of cards).
#[async_trait]
pub trait BoardClient: Send + Sync {
    async fn list_cards(&self, list_id: &str) -> Result<Vec<BoardCard>, CollaboratorError>;

    async fn create_item(&self, title: &str, list_id: &str) -> Result<(), CollaboratorError>;

    async fn list_titles(&self, list_id: &str) -> Result<Vec<String>, CollaboratorError> {
        let cards = self.list_cards(list_id).await?;
        Ok(cards.into_iter().map(|card| card.title).collect())
    }
}

/// One title per line, newline-terminated.
pub fn render_titles<S: AsRef<str>>(titles: &[S]) -> String {
    let mut rendered = String::new();
    for title in titles {
        rendered.push_str(title.as_ref());
        rendered.push('\n');
    }
    rendered
}

/// Builds the startup reminder for meetups due on `now`'s calendar day in
/// `timezone`. Returns `None` when nothing is due.
pub fn render_meetup_reminder(
    cards: &[BoardCard],
    now: DateTime<Utc>,
    timezone: Tz,
) -> Option<String> {
    let today = now.with_timezone(&timezone).date_naive();
    let due_today: Vec<&str> = cards
        .iter()
        .filter(|card| {
            card.due.is_some_and(|due| due.with_timezone(&timezone).date_naive() == today)
        })
        .map(|card| card.title.as_str())
        .collect();

    if due_today.is_empty() {
        return None;
    }

    Some(format!("{MEETUP_REMINDER_HEADER}{}", render_titles(&due_today)))
}
