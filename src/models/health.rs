use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API response for the health and readiness probes
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    /// Storage backend in use ("postgres" or "memory"), reported by the readiness probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}
