use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Response for an error
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
        (status, Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: error.into(),
        }))
    }
}

/// Errors surfaced by the coordinator to its callers
#[derive(Debug, Clone, PartialEq)]
pub enum CoordError {
    /// No or invalid identity
    Unauthenticated(String),
    /// Caller is not allowed to perform the action (e.g. non-owner resolving)
    Unauthorized(String),
    /// Session, route or proposal does not exist (or the session went stale)
    NotFound(String),
    /// The point is being dragged by someone else
    AlreadyLocked { holder: Uuid },
    /// The proposal has already been accepted or rejected
    AlreadyResolved(Uuid),
    InvalidRequest(String),
    /// The routing component rejected the geometry write
    UpstreamPersistenceFailure(String),
    Internal(String),
}

impl CoordError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoordError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            CoordError::Unauthorized(_) => StatusCode::FORBIDDEN,
            CoordError::NotFound(_) => StatusCode::NOT_FOUND,
            CoordError::AlreadyLocked { .. } => StatusCode::CONFLICT,
            CoordError::AlreadyResolved(_) => StatusCode::CONFLICT,
            CoordError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CoordError::UpstreamPersistenceFailure(_) => StatusCode::BAD_GATEWAY,
            CoordError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine readable kind, used on the websocket channel
    pub fn kind(&self) -> &'static str {
        match self {
            CoordError::Unauthenticated(_) => "unauthenticated",
            CoordError::Unauthorized(_) => "unauthorized",
            CoordError::NotFound(_) => "not_found",
            CoordError::AlreadyLocked { .. } => "already_locked",
            CoordError::AlreadyResolved(_) => "already_resolved",
            CoordError::InvalidRequest(_) => "invalid_request",
            CoordError::UpstreamPersistenceFailure(_) => "upstream_persistence_failure",
            CoordError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::Unauthenticated(msg) => write!(f, "Unauthenticated: {}", msg),
            CoordError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            CoordError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CoordError::AlreadyLocked { holder } => write!(f, "Point is being dragged by user {}", holder),
            CoordError::AlreadyResolved(id) => write!(f, "Point change {} is already resolved", id),
            CoordError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            CoordError::UpstreamPersistenceFailure(msg) => write!(f, "Failed to persist geometry: {}", msg),
            CoordError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CoordError {}

impl From<CoordError> for (StatusCode, Json<ErrorResponse>) {
    fn from(e: CoordError) -> Self {
        ErrorResponse::new(e.status_code(), e.to_string())
    }
}
