use async_trait::async_trait;

use crate::errors::CollaboratorError;

#[async_trait]
pub trait JokeSource: Send + Sync {
    async fn fetch_joke(&self) -> Result<String, CollaboratorError>;
}
