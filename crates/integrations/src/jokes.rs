use async_trait::async_trait;
use reqwest::header::ACCEPT;
use rudolph_core::errors::CollaboratorError;
use rudolph_core::jokes::JokeSource;
use tracing::debug;

pub struct DadJokeClient {
    http: reqwest::Client,
    url: String,
}

impl DadJokeClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }
}

#[async_trait]
impl JokeSource for DadJokeClient {
    async fn fetch_joke(&self) -> Result<String, CollaboratorError> {
        let context = format!("could not fetch joke from {}", self.url);
        let response = self
            .http
            .get(&self.url)
            .header(ACCEPT, "text/plain")
            .send()
            .await
            .map_err(|error| CollaboratorError::request(&context, error))?;

        if !response.status().is_success() {
            return Err(CollaboratorError::status(context, response.status().as_u16()));
        }

        let joke =
            response.text().await.map_err(|error| CollaboratorError::request(&context, error))?;
        debug!(event_name = "collaborator.joke.fetched", bytes = joke.len(), "fetched joke");
        Ok(joke)
    }
}
