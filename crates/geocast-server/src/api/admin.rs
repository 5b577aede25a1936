//! Development-only admin endpoints. No authentication.
//!
//! - `GET  /api/data`                 record count
//! - `GET  /api/data/{client_id}`     latest record for a client
//! - `POST /api/add`                  insert a report
//! - `POST /api/clear-collection`     delete every record

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use geocast_core::PositionReport;
use geocast_store::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::realtime::dispatcher::with_store;
use crate::server::AppState;

/// Admin request failure.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No record for the requested client.
    #[error("Data not found")]
    NotFound,
    /// The store could not serve the request.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Store(e) => {
                warn!(error = %e, "admin request failed");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Admin routes, merged into the main router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/data", get(count_records))
        .route("/api/data/{client_id}", get(latest_record))
        .route("/api/add", post(add_record))
        .route("/api/clear-collection", post(clear_records))
}

/// GET /api/data
async fn count_records(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let count = with_store(&state.store, |store| store.count()).await?;
    Ok(Json(json!({ "count": count })))
}

/// GET /api/data/{client_id}
async fn latest_record(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Response, ApiError> {
    let found = with_store(&state.store, move |store| store.find_latest_by_client(&client_id)).await?;
    match found {
        Some(stored) => Ok(Json(stored).into_response()),
        None => Err(ApiError::NotFound),
    }
}

/// POST /api/add
async fn add_record(
    State(state): State<AppState>,
    Json(report): Json<PositionReport>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stored = with_store(&state.store, move |store| store.save(&report)).await?;
    info!(id = %stored.id, client_id = %stored.client_id, "record added via admin api");
    Ok(Json(json!({
        "success": "Document added successfully",
        "id": stored.id,
    })))
}

/// POST /api/clear-collection
async fn clear_records(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = with_store(&state.store, |store| store.clear()).await?;
    info!(removed, "collection cleared via admin api");
    Ok(Json(json!({ "removed": removed })))
}
