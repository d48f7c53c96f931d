use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::app_state::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    cache: String,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "Health check successful", body = HealthResponse),
        (status = 503, description = "Cache store unreachable")
    )
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    if state.pipeline.cache().ping().await {
        Ok(Json(HealthResponse {
            status: "OK".to_string(),
            cache: "healthy".to_string(),
        }))
    } else {
        error!("Cache store health check failed");
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
