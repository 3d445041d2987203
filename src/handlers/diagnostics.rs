use crate::{auth::auth::{self, AuthUser}, models::{DiagnosticsResponse, ErrorResponse}, ws::userctx, AppState};
use axum::{extract::{State, Extension}, http::StatusCode, Json};
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Coordinator counters and host load
pub async fn diagnostics(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    auth::ensure_route_admin(&user)?;

    let stats = state.coordinator.stats();
    let n_user_ctx = userctx::get_user_ctx_cache().entry_count() as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Rooms: {}, Sessions: {}, Dropped: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        stats.rooms,
        stats.sessions,
        stats.messages_dropped
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_rooms: stats.rooms as u32,
            n_sessions: stats.sessions as u32,
            n_drag_locks: stats.drag_locks as u32,
            n_subscribers: stats.subscribers as u32,
            n_messages_sent: stats.messages_sent,
            n_messages_dropped: stats.messages_dropped,
            n_user_ctx,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
