use axum::{extract::{Extension, Path, State}, http::StatusCode, Json};
use tracing::info;
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::models::{
    ActiveSessionsResponse, ErrorResponse, HeartbeatResponse, JoinSessionRequest, JoinSessionResponse,
};
use crate::AppState;

/// Join (or re-join) the editing session of a route
pub async fn join_session(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<JoinSessionRequest>>,
) -> Result<(StatusCode, Json<JoinSessionResponse>), (StatusCode, Json<ErrorResponse>)> {
    let display_name = body.and_then(|Json(req)| req.display_name);
    let joined = state.coordinator.join(route_id, &user, display_name).await?;
    Ok((StatusCode::OK, Json(joined)))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<HeartbeatResponse>), (StatusCode, Json<ErrorResponse>)> {
    let beat = state.coordinator.heartbeat(route_id, user.user_id)?;
    Ok((StatusCode::OK, Json(beat)))
}

pub async fn leave_session(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> StatusCode {
    state.coordinator.leave(route_id, user.user_id);
    info!("Leave requested by {} on route {}", user.user_id, route_id);
    StatusCode::NO_CONTENT
}

/// Members currently editing the route
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
) -> (StatusCode, Json<ActiveSessionsResponse>) {
    let active_sessions = state.coordinator.active_members(route_id);
    (StatusCode::OK, Json(ActiveSessionsResponse { active_sessions }))
}
