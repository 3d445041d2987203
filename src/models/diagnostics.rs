use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub n_rooms: u32,
    pub n_sessions: u32,
    pub n_drag_locks: u32,
    pub n_subscribers: u32,
    pub n_messages_sent: u64,
    pub n_messages_dropped: u64,
    pub n_user_ctx: u32,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
