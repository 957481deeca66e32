use async_trait::async_trait;
use tracing::debug;

use crate::errors::CollaboratorError;

/// Looks up a share price. Implementations return `"<symbol>: $<value>"`.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn fetch_price(&self, symbol: &str) -> Result<String, CollaboratorError>;
}

pub fn price_line(symbol: &str, value: &str) -> String {
    format!("{symbol}: ${value}")
}

/// Fetches every ticker and joins the successful lines, newline-terminated.
///
/// A failing ticker is skipped so one bad symbol does not suppress the digest.
pub async fn scheduled_digest<S: AsRef<str>>(prices: &dyn PriceLookup, tickers: &[S]) -> String {
    let mut digest = String::new();
    for ticker in tickers {
        match prices.fetch_price(ticker.as_ref()).await {
            Ok(line) => {
                digest.push_str(&line);
                digest.push('\n');
            }
            Err(error) => {
                debug!(
                    event_name = "schedule.digest.ticker_skipped",
                    ticker = ticker.as_ref(),
                    error = %error,
                    "skipping ticker in scheduled digest"
                );
            }
        }
    }
    digest
}
