use axum::{extract::{Extension, Path, State}, http::StatusCode, Json};
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::models::{ErrorResponse, ExtendRouteRequest, RouteVersion};
use crate::AppState;

pub async fn remove_control_point(
    State(state): State<AppState>,
    Path((route_id, index)): Path<(Uuid, u32)>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<RouteVersion>), (StatusCode, Json<ErrorResponse>)> {
    let version = state.coordinator.remove_control_point(route_id, &user, index).await?;
    Ok((StatusCode::OK, Json(version)))
}

pub async fn extend_route(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ExtendRouteRequest>,
) -> Result<(StatusCode, Json<RouteVersion>), (StatusCode, Json<ErrorResponse>)> {
    let version = state.coordinator.extend_route(route_id, &user, req).await?;
    Ok((StatusCode::OK, Json(version)))
}
