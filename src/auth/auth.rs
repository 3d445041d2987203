use axum::{http::StatusCode, Json};
use uuid::Uuid;
use crate::models::ErrorResponse;

const ROUTE_ADMIN_ROLE: &str = "route-admin";

/// The authenticated caller, put into the request extensions by the auth middleware
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub display_name: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn new(user_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            roles: Vec::new(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

pub fn is_route_admin(user: &AuthUser) -> bool {
    user.has_role(ROUTE_ADMIN_ROLE)
}

pub fn ensure_route_admin(user: &AuthUser) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_route_admin(user) {
        return Ok(());
    }
    Err(ErrorResponse::new(StatusCode::FORBIDDEN, "Route admin access required"))
}
