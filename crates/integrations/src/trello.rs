//! Trello REST client backing the team board.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rudolph_core::board::{BoardCard, BoardClient};
use rudolph_core::errors::CollaboratorError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

pub struct TrelloBoard {
    http: reqwest::Client,
    base_url: String,
    app_key: SecretString,
    token: SecretString,
}

#[derive(Deserialize)]
struct TrelloCard {
    name: String,
    due: Option<DateTime<Utc>>,
}

impl TrelloBoard {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        app_key: SecretString,
        token: SecretString,
    ) -> Self {
        Self { http, base_url: base_url.into().trim_end_matches('/').to_owned(), app_key, token }
    }

    fn auth(&self) -> [(&'static str, &str); 2] {
        [("key", self.app_key.expose_secret()), ("token", self.token.expose_secret())]
    }
}

#[async_trait]
impl BoardClient for TrelloBoard {
    async fn list_cards(&self, list_id: &str) -> Result<Vec<BoardCard>, CollaboratorError> {
        let context = format!("could not get cards for list {list_id}");
        let response = self
            .http
            .get(format!("{}/lists/{list_id}/cards", self.base_url))
            .query(&self.auth())
            .query(&[("fields", "name,due")])
            .send()
            .await
            .map_err(|error| CollaboratorError::request(&context, error))?;

        if !response.status().is_success() {
            return Err(CollaboratorError::status(context, response.status().as_u16()));
        }

        let cards: Vec<TrelloCard> =
            response.json().await.map_err(|error| CollaboratorError::malformed(&context, error))?;
        debug!(
            event_name = "collaborator.board.cards_listed",
            list_id,
            cards = cards.len(),
            "listed board cards"
        );

        Ok(cards
            .into_iter()
            .map(|card| BoardCard { title: card.name, due: card.due })
            .collect())
    }

    async fn create_item(&self, title: &str, list_id: &str) -> Result<(), CollaboratorError> {
        let context = format!("could not create card `{title}` on list {list_id}");
        let response = self
            .http
            .post(format!("{}/cards", self.base_url))
            .query(&self.auth())
            .query(&[("idList", list_id), ("name", title)])
            .send()
            .await
            .map_err(|error| CollaboratorError::request(&context, error))?;

        if !response.status().is_success() {
            return Err(CollaboratorError::status(context, response.status().as_u16()));
        }

        debug!(event_name = "collaborator.board.card_created", list_id, "created board card");
        Ok(())
    }
}
