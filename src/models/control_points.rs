use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Coordinate;

/// Which end of the route a new control point is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RouteEnd {
    Start,
    End,
}

/// Request body for extending a route by one control point
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtendRouteRequest {
    pub end: RouteEnd,
    pub position: Coordinate,
}
