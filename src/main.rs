use headline_keeper::config::load_config;
use headline_keeper::fetcher::HttpFetcher;
use headline_keeper::pipeline::{PipelineMetrics, ScrapePipeline};
use headline_keeper::storage::{SharedStorage, SqliteStorage};
use headline_keeper::web::{self, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Route panics through the logger
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Panic occurred: {}", panic_info);
    }));

    let config = match load_config("config.json") {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error: {}", e);
            return;
        }
    };

    // One connection for the whole process, handed to everything that needs it
    let storage: SharedStorage = match SqliteStorage::new(&config.database_path) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            error!(path = %config.database_path, "Failed to initialize storage: {}", e);
            return;
        }
    };
    info!(path = %config.database_path, "Database opened");

    let fetcher = match HttpFetcher::new(&config.user_agent, config.request_timeout_seconds) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return;
        }
    };

    let pipeline = Arc::new(ScrapePipeline::new(
        config.source_url.clone(),
        Arc::new(fetcher),
        storage.clone(),
        Arc::new(PipelineMetrics::default()),
    ));

    let app = web::create_app(AppState {
        storage: storage.clone(),
        pipeline,
        listing_limit: config.listing_limit,
    });

    let addr = config.listen_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, "Failed to bind: {}", e);
            return;
        }
    };

    info!(%addr, source = %config.source_url, "App running");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    close_storage(storage);
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

fn close_storage(storage: SharedStorage) {
    match Arc::try_unwrap(storage) {
        Ok(mutex) => match mutex.into_inner().close() {
            Ok(()) => info!("Database closed"),
            Err(e) => warn!("Database close failed: {}", e),
        },
        // a detached insert still holds the handle; the connection closes when it drops
        Err(_) => warn!("Database still in use at shutdown"),
    }
}
