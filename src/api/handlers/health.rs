use crate::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

/// Key that is looked up, never written, to check the blob store answers.
const STORAGE_HEALTH_KEY: &str = ".health";

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when a backing service is down
    pub status: String,
    pub database: String,
    pub storage: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database and blob storage reachable", body = HealthResponse),
        (status = 503, description = "A backing service is unreachable", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database_up = state.db.ping().await.is_ok();
    let storage_up = match state.storage.file_exists(STORAGE_HEALTH_KEY).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Storage health check failed: {}", e);
            false
        }
    };

    let code = if database_up && storage_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if code == StatusCode::OK { "ok" } else { "degraded" }.to_string(),
        database: if database_up { "connected" } else { "disconnected" }.to_string(),
        storage: if storage_up { "available" } else { "unavailable" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (code, Json(response))
}
