use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::model::{Article, ArticleWithNotes, NewNote, StorageError};
use crate::pipeline::MetricsSnapshot;
use crate::web::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage(e) => {
                error!(error = %e, "storage error while handling request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SavedUpdate {
    pub saved: bool,
}

fn found(location: impl Into<String>) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.into())]).into_response()
}

/// Kicks off a scrape and redirects right away; storage outcomes show up in the logs and `/metrics`.
pub async fn scrape(State(state): State<Arc<AppState>>) -> Response {
    state.pipeline.trigger();
    info!("scrape triggered");
    found("/")
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Article>>, ApiError> {
    let articles = state.storage.lock().await.find_all(state.listing_limit)?;
    Ok(Json(articles))
}

pub async fn list_saved(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Article>>, ApiError> {
    let articles = state.storage.lock().await.find_saved()?;
    Ok(Json(articles))
}

pub async fn save_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(update): Json<SavedUpdate>,
) -> Result<Response, ApiError> {
    match state.storage.lock().await.set_saved(id, update.saved)? {
        Some(article) => info!(id, title = %article.title, saved = article.saved, "saved flag updated"),
        None => warn!(id, "saved flag update for unknown article"),
    }
    Ok(found("/"))
}

pub async fn unsave_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(update): Json<SavedUpdate>,
) -> Result<Response, ApiError> {
    match state.storage.lock().await.set_saved(id, update.saved)? {
        Some(article) => info!(id, title = %article.title, saved = article.saved, "article removed from saved"),
        None => warn!(id, "unsave for unknown article"),
    }
    Ok(found("/saved"))
}

pub async fn get_notes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ArticleWithNotes>, ApiError> {
    state
        .storage
        .lock()
        .await
        .get_article(id)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn create_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(note): Json<NewNote>,
) -> Result<Response, ApiError> {
    let note = state
        .storage
        .lock()
        .await
        .add_note(id, &note)?
        .ok_or(ApiError::NotFound)?;
    info!(article_id = id, note_id = note.id, "note added");
    Ok(found(format!("/notes/{id}")))
}

pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    if state.storage.lock().await.delete_note(id)? {
        info!(note_id = id, "note deleted");
    } else {
        warn!(note_id = id, "delete for unknown note");
    }
    Ok(found("/saved"))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.pipeline.metrics().snapshot())
}
