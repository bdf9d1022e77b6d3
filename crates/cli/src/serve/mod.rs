//! `speedwatch serve` -- read-only HTTP JSON API over the measurement history.
//!
//! Records are read from the mirror when it holds a copy, otherwise from the
//! local store. Every request re-reads the file, so new measurements show up
//! without a restart.
//!
//! Endpoints:
//! - GET /health           - Server status
//! - GET /api/records      - Records, `?limit=&hours=` (alias `/api/data`)
//! - GET /api/recent       - Last `?limit=` records (default 10)
//! - GET /api/stats        - Summary over the last `?hours=` (default 24)
//! - GET /api/chart-data   - Chart series over the last `?hours=` (default 24)
//! - GET /api/status       - Local file, mirror and replication target state
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use self::handlers::{
    handle_chart_data, handle_health, handle_not_found, handle_recent, handle_records,
    handle_stats, handle_status,
};
use self::state::AppState;
use crate::inspect::Sources;

/// Window applied by `/api/stats` and `/api/chart-data` without `?hours=`.
const DEFAULT_WINDOW_HOURS: u32 = 24;

/// Records returned by `/api/recent` without `?limit=`.
const DEFAULT_RECENT_LIMIT: usize = 10;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/records", get(handle_records))
        .route("/api/data", get(handle_records))
        .route("/api/recent", get(handle_recent))
        .route("/api/stats", get(handle_stats))
        .route("/api/chart-data", get(handle_chart_data))
        .route("/api/status", get(handle_status))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the given port.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls. Otherwise it uses plain HTTP.
pub async fn start_server(
    port: u16,
    sources: Sources,
    _tls_cert: Option<PathBuf>,
    _tls_key: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        local = %sources.local.display(),
        mirror = ?sources.mirror,
        "serving measurement history"
    );
    let app = router(Arc::new(AppState { sources }));
    let addr = format!("0.0.0.0:{}", port);

    // TLS support via axum-server + rustls (requires `tls` feature)
    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        info!("listening on https://0.0.0.0:{}", port);
        axum_server::bind_rustls(socket_addr, config)
            .serve(app.into_make_service())
            .await?;
        return Ok(());
    }

    #[cfg(not(feature = "tls"))]
    if _tls_cert.is_some() {
        return Err("TLS requires building with the `tls` feature".into());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C; stop the process to shut down");
            std::future::pending::<()>().await;
        }
    }
}
