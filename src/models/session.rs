use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A heartbeat-backed record of a user editing a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EditingSession {
    pub id: Uuid,
    pub route_id: Uuid,
    pub user_id: Uuid,
    pub user_display: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

/// Request body for joining an editing session
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct JoinSessionRequest {
    /// Overrides the display name taken from the identity token
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Response returned after joining an editing session
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JoinSessionResponse {
    pub session: EditingSession,
    /// The other users currently editing the route
    pub active_sessions: Vec<EditingSession>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HeartbeatResponse {
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActiveSessionsResponse {
    pub active_sessions: Vec<EditingSession>,
}
