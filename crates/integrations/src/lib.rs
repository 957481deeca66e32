//! HTTP collaborators: the Trello board, the dad-joke API, the share price
//! scraper and the meetup page reader.

use std::time::Duration;

use rudolph_core::errors::CollaboratorError;

pub mod jokes;
pub mod meetup;
pub mod shares;
pub mod trello;

pub use jokes::DadJokeClient;
pub use meetup::MeetupPageClient;
pub use shares::SharePriceScraper;
pub use trello::TrelloBoard;

const USER_AGENT: &str = concat!("rudolph/", env!("CARGO_PKG_VERSION"));

/// One client per process; every collaborator clones it.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, CollaboratorError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|error| CollaboratorError::request("could not build http client", error))
}
