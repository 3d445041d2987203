use axum::{extract::State, http::StatusCode, Json};
use crate::{db, models::HealthResponse, AppState};
use tracing::{debug, error};

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        storage: None,
    })
}

/// Readiness check endpoint: the database must answer when one is configured
pub async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    debug!("Readiness check requested");
    let storage = Some(state.storage_name().to_string());
    if let Some(pool) = &state.db {
        if let Err(e) = db::ping(pool).await {
            error!("Readiness check failed: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                    message: "Database is not reachable".to_string(),
                    storage,
                }),
            );
        }
    }
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            message: "Service is ready".to_string(),
            storage,
        }),
    )
}
