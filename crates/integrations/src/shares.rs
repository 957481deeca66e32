use async_trait::async_trait;
use rudolph_core::errors::CollaboratorError;
use rudolph_core::market::{price_line, PriceLookup};

/// The search result page renders the quote as `<span style="font-size:157%"><b>11.99</b>`.
pub const PRICE_MARKER: &str = "<span style=\"font-size:157%\"><b>";
const PRICE_END: &str = "</b>";

pub struct SharePriceScraper {
    http: reqwest::Client,
    search_url: String,
}

impl SharePriceScraper {
    pub fn new(http: reqwest::Client, search_url: impl Into<String>) -> Self {
        Self { http, search_url: search_url.into() }
    }
}

pub fn extract_share_price(page: &str) -> Option<&str> {
    let start = page.find(PRICE_MARKER)? + PRICE_MARKER.len();
    let rest = &page[start..];
    let end = rest.find(PRICE_END)?;
    Some(rest[..end].trim())
}

#[async_trait]
impl PriceLookup for SharePriceScraper {
    async fn fetch_price(&self, symbol: &str) -> Result<String, CollaboratorError> {
        let symbol = symbol.trim();
        let context = format!("could not look up share price for `{symbol}`");
        let response = self
            .http
            .get(&self.search_url)
            .query(&[("q", symbol)])
            .send()
            .await
            .map_err(|error| CollaboratorError::request(&context, error))?;

        if !response.status().is_success() {
            return Err(CollaboratorError::status(context, response.status().as_u16()));
        }

        let page =
            response.text().await.map_err(|error| CollaboratorError::request(&context, error))?;
        let value = extract_share_price(&page)
            .ok_or_else(|| CollaboratorError::malformed(&context, "price marker not found"))?;
        Ok(price_line(symbol, value))
    }
}
