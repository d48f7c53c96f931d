use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::{
    analyze::dtos::{AnalysisRequest, AnalysisResponse},
    app_state::AppState,
    auth::{dtos::ErrorResponse, middleware::ApiKeyAuth},
    pipeline::PipelineError,
};

pub const UPSTREAM_FAILURE_MESSAGE: &str = "Upstream analysis service failed";

#[utoipa::path(
    post,
    path = "/api/analyze",
    tag = "analysis",
    request_body = AnalysisRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Product analysis", body = AnalysisResponse),
        (status = 400, description = "Invalid product URL", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 502, description = "Extraction or analysis failed", body = ErrorResponse)
    )
)]
pub async fn analyze_product(
    _auth: ApiKeyAuth,
    State(state): State<AppState>,
    Json(payload): Json<AnalysisRequest>,
) -> Response {
    match state.pipeline.analyze(&payload).await {
        Ok(outcome) => Json(AnalysisResponse::from(outcome)).into_response(),
        Err(e) => pipeline_error_response(e),
    }
}

fn pipeline_error_response(err: PipelineError) -> Response {
    match &err {
        PipelineError::InvalidRequest(reason) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(reason.as_str()))).into_response()
        }
        PipelineError::Extraction(_) | PipelineError::Analysis(_) => {
            error!(error = %err, "Analysis pipeline failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::new(UPSTREAM_FAILURE_MESSAGE)),
            )
                .into_response()
        }
    }
}
