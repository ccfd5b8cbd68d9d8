//! Health check endpoint.
//!
//! Used by load balancers; it verifies the database is reachable.

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// `GET /health`
///
/// # Errors
///
/// 503 when the store does not answer.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.store.ping().await.map_err(|e| {
        tracing::warn!(error = %e, "Health check failed");
        AppError::unavailable("Database unavailable")
    })?;
    Ok(Json(json!({ "status": "ok" })))
}
