use crate::fetcher::Fetcher;
use crate::model::{FetchError, RawDocument};

use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout_seconds: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<RawDocument, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::InvalidResponse {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let effective_url = response.url().to_string();
        let body = response.text().await?;
        debug!(url = %effective_url, bytes = body.len(), "fetched document");

        Ok(RawDocument { url: effective_url, body })
    }
}
