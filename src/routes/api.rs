use crate::{
    handlers::{
        diagnostics, extend_route, health_check, heartbeat, join_session, leave_session, list_point_changes,
        list_sessions, ready_check, remove_control_point, route_channel, submit_point_change,
        update_point_change_status,
    },
    routes::auth_middleware::auth_middleware,
    AppState,
};
use axum::{middleware, routing::{delete, get, patch, post}, Router};

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route(
            "/routes/:route_id/editing-session",
            post(join_session).get(list_sessions).delete(leave_session),
        )
        .route("/routes/:route_id/editing-session/heartbeat", post(heartbeat))
        .route(
            "/routes/:route_id/point-changes",
            post(submit_point_change).get(list_point_changes),
        )
        .route("/point-changes/:change_id", patch(update_point_change_status))
        .route("/routes/:route_id/control-points", post(extend_route))
        .route("/routes/:route_id/control-points/:index", delete(remove_control_point))
        .route("/routes/:route_id/channel", get(route_channel))
        // Applies to all routes added above
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .merge(authenticated)
        .with_state(state)
}
