// Core structs: RawDocument, ArticleCandidate, Article, Note
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Markup pulled from the remote site, alive for one pipeline run.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub url: String,
    pub body: String,
}

/// A headline as it came out of the page, before the store gives it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleCandidate {
    pub title: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub saved: bool,
    pub notes: Vec<i64>,
    pub date_pulled: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNote {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

/// An article with its notes resolved, in the order they were attached.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleWithNotes {
    #[serde(flatten)]
    pub article: Article,
    #[serde(rename = "note_list")]
    pub notes: Vec<Note>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    InvalidResponse { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}
