use utoipa::OpenApi;
use crate::models::*;
#[allow(unused_imports)]
use uuid::Uuid;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check, including the database when one is configured
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Storage unavailable", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Join (or rejoin) the editing session of a route
#[utoipa::path(
    post,
    path = "/api/routes/{route_id}/editing-session",
    params(("route_id" = Uuid, Path, description = "Route id")),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Joined", body = JoinSessionResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Unknown route", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn join_session_doc() {}

/// List the active members of a route
#[utoipa::path(
    get,
    path = "/api/routes/{route_id}/editing-session",
    params(("route_id" = Uuid, Path, description = "Route id")),
    responses(
        (status = 200, description = "Active members", body = ActiveSessionsResponse)
    )
)]
#[allow(dead_code)]
pub async fn list_sessions_doc() {}

/// Leave the editing session of a route
#[utoipa::path(
    delete,
    path = "/api/routes/{route_id}/editing-session",
    params(("route_id" = Uuid, Path, description = "Route id")),
    responses(
        (status = 204, description = "Left")
    )
)]
#[allow(dead_code)]
pub async fn leave_session_doc() {}

/// Keep the caller's session alive
#[utoipa::path(
    post,
    path = "/api/routes/{route_id}/editing-session/heartbeat",
    params(("route_id" = Uuid, Path, description = "Route id")),
    responses(
        (status = 200, description = "Session refreshed", body = HeartbeatResponse),
        (status = 404, description = "No active session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn heartbeat_doc() {}

/// Submit a point move
#[utoipa::path(
    post,
    path = "/api/routes/{route_id}/point-changes",
    params(("route_id" = Uuid, Path, description = "Route id")),
    request_body = CreatePointChangeRequest,
    responses(
        (status = 200, description = "Applied by the owner", body = PointChangeOutcome),
        (status = 201, description = "Recorded as a pending proposal", body = PointChangeOutcome),
        (status = 400, description = "Invalid move", body = ErrorResponse),
        (status = 409, description = "Point locked by another user", body = ErrorResponse),
        (status = 502, description = "Route could not be persisted", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn submit_point_change_doc() {}

/// List the proposals of a route, newest first
#[utoipa::path(
    get,
    path = "/api/routes/{route_id}/point-changes",
    params(
        ("route_id" = Uuid, Path, description = "Route id"),
        ("status" = Option<ProposalStatus>, Query, description = "Only proposals with this status")
    ),
    responses(
        (status = 200, description = "Proposals", body = [PointChangeProposal])
    )
)]
#[allow(dead_code)]
pub async fn list_point_changes_doc() {}

/// Accept or reject a proposal
#[utoipa::path(
    patch,
    path = "/api/point-changes/{change_id}",
    params(("change_id" = Uuid, Path, description = "Proposal id")),
    request_body = UpdatePointChangeStatusRequest,
    responses(
        (status = 200, description = "Resolved", body = PointChangeProposal),
        (status = 403, description = "Caller is not the route owner", body = ErrorResponse),
        (status = 404, description = "Unknown proposal", body = ErrorResponse),
        (status = 409, description = "Already resolved", body = ErrorResponse),
        (status = 502, description = "Route could not be persisted", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn update_point_change_status_doc() {}

/// Append a control point at either end of a route (owner only)
#[utoipa::path(
    post,
    path = "/api/routes/{route_id}/control-points",
    params(("route_id" = Uuid, Path, description = "Route id")),
    request_body = ExtendRouteRequest,
    responses(
        (status = 200, description = "Route extended", body = RouteVersion),
        (status = 403, description = "Caller is not the route owner", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn extend_route_doc() {}

/// Remove a control point (owner only)
#[utoipa::path(
    delete,
    path = "/api/routes/{route_id}/control-points/{index}",
    params(
        ("route_id" = Uuid, Path, description = "Route id"),
        ("index" = u32, Path, description = "Control point index")
    ),
    responses(
        (status = 200, description = "Point removed", body = RouteVersion),
        (status = 400, description = "Index out of range or route too short", body = ErrorResponse),
        (status = 403, description = "Caller is not the route owner", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn remove_control_point_doc() {}

/// Websocket channel carrying cursor and drag traffic of a route
#[utoipa::path(
    get,
    path = "/api/routes/{route_id}/channel",
    params(("route_id" = Uuid, Path, description = "Route id")),
    responses(
        (status = 101, description = "Switching to the websocket protocol"),
        (status = 404, description = "No active session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn route_channel_doc() {}

/// Runtime diagnostics (route-admin role)
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics", body = DiagnosticsResponse),
        (status = 403, description = "Missing route-admin role", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        join_session_doc,
        list_sessions_doc,
        leave_session_doc,
        heartbeat_doc,
        submit_point_change_doc,
        list_point_changes_doc,
        update_point_change_status_doc,
        extend_route_doc,
        remove_control_point_doc,
        route_channel_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            Coordinate,
            EditingSession,
            JoinSessionRequest,
            JoinSessionResponse,
            HeartbeatResponse,
            ActiveSessionsResponse,
            PointChangeProposal,
            ProposalStatus,
            ProposalDecision,
            CreatePointChangeRequest,
            UpdatePointChangeStatusRequest,
            RouteVersion,
            PointChangeOutcome,
            RouteEnd,
            ExtendRouteRequest,
            DiagnosticsResponse,
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
