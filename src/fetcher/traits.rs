use crate::model::{FetchError, RawDocument};

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawDocument, FetchError>;
}
