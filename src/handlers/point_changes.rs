use axum::{extract::{Extension, Path, Query, State}, http::StatusCode, Json};
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::models::{
    CreatePointChangeRequest, ErrorResponse, ListPointChangesQuery, PointChangeOutcome, PointChangeProposal,
    UpdatePointChangeStatusRequest,
};
use crate::AppState;

/// Submit a point move. The owner's move is applied (200), anyone
/// else's is recorded as a pending proposal (201).
pub async fn submit_point_change(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreatePointChangeRequest>,
) -> Result<(StatusCode, Json<PointChangeOutcome>), (StatusCode, Json<ErrorResponse>)> {
    let outcome = state.coordinator.submit_point_change(route_id, &user, req).await?;
    let status = match outcome {
        PointChangeOutcome::Applied { .. } => StatusCode::OK,
        PointChangeOutcome::Proposed { .. } => StatusCode::CREATED,
    };
    Ok((status, Json(outcome)))
}

pub async fn list_point_changes(
    State(state): State<AppState>,
    Path(route_id): Path<Uuid>,
    Query(query): Query<ListPointChangesQuery>,
) -> Result<(StatusCode, Json<Vec<PointChangeProposal>>), (StatusCode, Json<ErrorResponse>)> {
    let proposals = state.coordinator.list_point_changes(route_id, query.status).await?;
    Ok((StatusCode::OK, Json(proposals)))
}

/// Accept or reject a pending proposal (route owner only)
pub async fn update_point_change_status(
    State(state): State<AppState>,
    Path(change_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdatePointChangeStatusRequest>,
) -> Result<(StatusCode, Json<PointChangeProposal>), (StatusCode, Json<ErrorResponse>)> {
    let proposal = state
        .coordinator
        .resolve_point_change(change_id, &user, req.status)
        .await?;
    Ok((StatusCode::OK, Json(proposal)))
}
