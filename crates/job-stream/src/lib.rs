//! Per-connection simulated job-progress streaming over WebSocket.
//!
//! Each client connecting to `/ws/jobs?period=<ms>` gets a private batch of
//! synthetic jobs and a stream of progress updates until it disconnects.

pub mod config;
pub mod health;
pub mod job;
pub mod period;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod state;
pub mod ws;

use std::path::PathBuf;

use axum::{routing::get, Router};
use state::AppState;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the router: health check, the job stream, and optionally static
/// files from `static_dir` for everything else.
pub fn app(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/ws/jobs", get(ws::ws_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
