//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the storage credentials

use crate::services::upload_service::UploadService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::warn;

/// `GET /healthz`
///
/// Very small liveness probe. Always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that asks the storage backend for an access token.
/// HTTP 200 when one is available, HTTP 503 otherwise. The failure cause is
/// logged, not returned.
pub async fn readyz(State(service): State<UploadService>) -> impl IntoResponse {
    match service.check_store().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".into(),
            }),
        ),
        Err(err) => {
            warn!(error = %err, "storage backend not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".into(),
                }),
            )
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}
