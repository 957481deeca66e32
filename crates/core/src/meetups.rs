//! Shared meetup links.

use async_trait::async_trait;

use crate::errors::CollaboratorError;

/// Messages starting with this are treated as a shared meetup link.
pub const MEETUP_LINK_PREFIX: &str = "<https://www.meetup.com/";

pub const MEETUP_SHARED_REPLY: &str =
    "looks like you just shared a meetup, I've added it to the trello board for you :)";

/// Reads the public title of a meetup event page.
#[async_trait]
pub trait MeetupPages: Send + Sync {
    async fn event_title(&self, url: &str) -> Result<String, CollaboratorError>;
}

/// Unwraps Slack's `<url>` / `<url|label>` link markup.
pub fn unwrap_link(text: &str) -> &str {
    let inner = text.trim().trim_start_matches('<');
    let inner = inner.split('>').next().unwrap_or(inner);
    inner.split('|').next().unwrap_or(inner)
}

pub fn meetup_card_title(title: &str, url: &str) -> String {
    format!("{} - {url}", title.trim())
}
