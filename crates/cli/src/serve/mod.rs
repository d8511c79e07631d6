//! `rfidgate serve` -- HTTP JSON API for gate readers and dashboards.
//!
//! Endpoints:
//! - GET  /health  - Server status and version
//! - GET  /logs    - Most recent log entries, newest first (`?limit=N`, max 50)
//! - GET  /scan    - Process a scan (`?rfid_data=...`)
//! - POST /scan    - Process a scan (`{"rfid_data": "..."}`)
//! - POST /status  - Set a tag's status directly (`{"rfid_data", "new_status"}`)
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rfidgate_core::ToggleWorkflow;
use rfidgate_sqlite::SqliteStorage;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use self::handlers::{
    handle_health, handle_logs, handle_not_found, handle_scan_get, handle_scan_post,
    handle_status,
};
use self::state::AppState;

/// Maximum request body size: 64 KB. Scan and status bodies are tiny.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Upper bound on entries returned by `/logs`.
const MAX_LOG_ENTRIES: usize = 50;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(handle_health))
        .route("/logs", get(handle_logs))
        .route("/scan", get(handle_scan_get).post(handle_scan_post))
        .route("/status", post(handle_status))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Serve the API on `port` until Ctrl+C or SIGTERM.
pub async fn start_server(
    port: u16,
    workflow: ToggleWorkflow<SqliteStorage>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState { workflow });
    let app = router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("rfidgate listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.workflow.storage().close().await;
    info!("Server shut down");
    Ok(())
}

/// Wait for Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
