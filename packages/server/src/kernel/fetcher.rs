//! HTTP page fetcher.
//!
//! Fetches candidate pages for extraction. Bodies are truncated to a fixed
//! character bound so an arbitrarily large page cannot blow up the
//! downstream completion payload.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::traits::BasePageFetcher;

/// Payload bound applied to fetched bodies.
pub const MAX_PAGE_CHARS: usize = 300_000;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub struct HttpPageFetcher {
    client: reqwest::Client,
    user_agent: String,
    max_chars: usize,
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpPageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            user_agent: USER_AGENT.to_string(),
            max_chars: MAX_PAGE_CHARS,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

#[async_trait]
impl BasePageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url = %url, "Page fetch starting");

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Page fetch failed");
                anyhow::anyhow!("Failed to fetch {}: {}", url, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} fetching {}", status, url);
        }

        let body = response.text().await?;
        Ok(truncate_chars(body, self.max_chars))
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
pub fn truncate_chars(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}
