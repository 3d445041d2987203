use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use tracing::{debug, error, warn};

use crate::models::{CoordError, ErrorResponse};
use crate::services::auth_service::{authenticate, get_auth_token};
use crate::AppState;

/// Resolve the caller from the bearer token or `auth_token` cookie and put
/// the `AuthUser` into the request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {

    // 1. Get the auth token from the request
    let token = get_auth_token(&req).map_err(|e| {
        debug!("No auth token: {}", e);
        CoordError::Unauthenticated(e)
    })?;

    // 2. Validate it
    let secret = state.config.auth_jwt_secret.as_deref().ok_or_else(|| {
        error!("Auth JWT secret not configured");
        CoordError::Internal("Authentication is not configured".to_string())
    })?;
    let user = authenticate(&token, secret).await.map_err(|e| {
        warn!("Authentication failed: {}", e);
        CoordError::Unauthenticated("Invalid authentication token".to_string())
    })?;

    // 3. Hand the user to downstream handlers
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
