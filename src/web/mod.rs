use axum::{
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub mod handlers;
pub mod state;

pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::list_articles))
        .route("/scrape", get(handlers::scrape))
        .route("/saved", get(handlers::list_saved))
        .route("/metrics", get(handlers::metrics))
        .route("/:id", put(handlers::save_article))
        .route("/delete/:id", put(handlers::unsave_article))
        .route("/notes/:id", get(handlers::get_notes).post(handlers::create_note))
        .route("/note/:id", put(handlers::delete_note))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(Arc::new(state))
}
