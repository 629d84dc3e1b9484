pub mod sqlite;

pub use sqlite::SqliteStorage;

use crate::model::{Article, ArticleCandidate, StorageError};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Process-wide store handle, opened in `main` and passed to whoever needs it.
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// The store as the scrape pipeline sees it: one independent insert per record.
#[async_trait::async_trait]
pub trait ArticleSink: Send + Sync {
    async fn insert(&self, candidate: ArticleCandidate) -> Result<Article, StorageError>;
}

#[async_trait::async_trait]
impl ArticleSink for Mutex<SqliteStorage> {
    async fn insert(&self, candidate: ArticleCandidate) -> Result<Article, StorageError> {
        self.lock().await.insert_article(&candidate)
    }
}
