//! HTTP route handlers: health, records, stats, chart data, status.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use speedwatch_analyze::{chart_data, select, summarize_at, Query as Selection};
use speedwatch_storage::{Record, StoreError};
use time::OffsetDateTime;
use tracing::warn;

use super::state::AppState;
use super::{json_error, DEFAULT_RECENT_LIMIT, DEFAULT_WINDOW_HOURS};

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// Run a blocking read against the sources off the async workers.
async fn blocking<T, F>(state: Arc<AppState>, read: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || read(&state)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(error = %e, "cannot read history");
            Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("cannot read history: {}", e),
            )
            .into_response())
        }
        Err(e) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("internal error: {}", e),
        )
        .into_response()),
    }
}

/// Unwrap query parameters, answering malformed ones with a JSON 400.
fn selection(query: Result<Query<Selection>, QueryRejection>) -> Result<Selection, Response> {
    query.map(|Query(selection)| selection).map_err(|rejection| {
        json_error(rejection.status(), &rejection.body_text()).into_response()
    })
}

async fn records(state: Arc<AppState>) -> Result<Vec<Record>, Response> {
    blocking(state, |s| s.sources.read_records()).await
}

/// GET /api/records and /api/data
pub(crate) async fn handle_records(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Selection>, QueryRejection>,
) -> Response {
    let selection = match selection(query) {
        Ok(selection) => selection,
        Err(response) => return response,
    };
    match records(state).await {
        Ok(all) => Json(select(all, selection, OffsetDateTime::now_utc())).into_response(),
        Err(response) => response,
    }
}

/// GET /api/recent
pub(crate) async fn handle_recent(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Selection>, QueryRejection>,
) -> Response {
    let selection = match selection(query) {
        Ok(selection) => selection,
        Err(response) => return response,
    };
    let selection = Selection {
        limit: Some(selection.limit.unwrap_or(DEFAULT_RECENT_LIMIT)),
        hours: None,
    };
    match records(state).await {
        Ok(all) => Json(select(all, selection, OffsetDateTime::now_utc())).into_response(),
        Err(response) => response,
    }
}

/// GET /api/stats
pub(crate) async fn handle_stats(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Selection>, QueryRejection>,
) -> Response {
    let selection = match selection(query) {
        Ok(selection) => selection,
        Err(response) => return response,
    };
    let hours = selection.hours.unwrap_or(DEFAULT_WINDOW_HOURS);
    match records(state).await {
        Ok(all) => Json(summarize_at(&all, Some(hours), OffsetDateTime::now_utc())).into_response(),
        Err(response) => response,
    }
}

/// GET /api/chart-data
pub(crate) async fn handle_chart_data(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Selection>, QueryRejection>,
) -> Response {
    let selection = match selection(query) {
        Ok(selection) => selection,
        Err(response) => return response,
    };
    let hours = selection.hours.unwrap_or(DEFAULT_WINDOW_HOURS);
    match records(state).await {
        Ok(all) => Json(chart_data(&all, Some(hours), OffsetDateTime::now_utc())).into_response(),
        Err(response) => response,
    }
}

/// GET /api/status
pub(crate) async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    match blocking(state, |s| s.sources.status()).await {
        Ok(status) => Json(status).into_response(),
        Err(response) => response,
    }
}
