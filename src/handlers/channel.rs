use axum::{
    extract::{ws::WebSocketUpgrade, Extension, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::models::ErrorResponse;
use crate::ws::channel::handle_socket;
use crate::AppState;

/// Open the live channel of a route. Requires an active editing session.
pub async fn route_channel(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    // Subscribe before the upgrade so no broadcast is missed and failures map to HTTP errors
    let subscription = state.coordinator.subscribe(route_id, user.user_id)?;
    info!("New channel connection attempt by {} on route {}", user.user_id, route_id);
    let coordinator = state.coordinator.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, coordinator, route_id, user, subscription)))
}
