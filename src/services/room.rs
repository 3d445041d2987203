use chrono::TimeDelta;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::models::Coordinate;
use crate::services::broadcast_hub::BroadcastHub;
use crate::services::drag_locks::DragLockTable;
use crate::services::session_registry::SessionRegistry;

/// Tunables shared by every room
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub session_stale_after: TimeDelta,
    pub drag_lock_ttl: TimeDelta,
    pub broadcast_capacity: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            session_stale_after: TimeDelta::minutes(5),
            drag_lock_ttl: TimeDelta::seconds(30),
            broadcast_capacity: 256,
        }
    }
}

/// All coordination state of one route.
///
/// The session and lock tables sit behind plain mutexes and must never be
/// held across an await. `geometry` caches the control points and is the
/// single serialization point for geometry reads and replacements on this
/// route. `writes` is held shared by single-point writes for as long as they
/// are in flight and exclusively by structural edits, which shift indices.
#[derive(Debug)]
pub struct RouteRoom {
    route_id: Uuid,
    sessions: Mutex<SessionRegistry>,
    locks: Mutex<DragLockTable>,
    hub: BroadcastHub,
    geometry: tokio::sync::Mutex<Option<Vec<Coordinate>>>,
    writes: tokio::sync::RwLock<()>,
}

impl RouteRoom {
    pub fn new(route_id: Uuid, settings: RoomSettings) -> Self {
        Self {
            route_id,
            sessions: Mutex::new(SessionRegistry::new(route_id, settings.session_stale_after)),
            locks: Mutex::new(DragLockTable::new(settings.drag_lock_ttl)),
            hub: BroadcastHub::new(settings.broadcast_capacity),
            geometry: tokio::sync::Mutex::new(None),
            writes: tokio::sync::RwLock::new(()),
        }
    }

    pub fn route_id(&self) -> Uuid {
        self.route_id
    }

    pub fn sessions(&self) -> MutexGuard<'_, SessionRegistry> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn locks(&self) -> MutexGuard<'_, DragLockTable> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn geometry(&self) -> &tokio::sync::Mutex<Option<Vec<Coordinate>>> {
        &self.geometry
    }

    /// Gate between index-addressed writes and structural edits.
    /// Always taken before `geometry`.
    pub fn write_gate(&self) -> &tokio::sync::RwLock<()> {
        &self.writes
    }

    /// No sessions, no locks and nobody listening
    pub fn is_idle(&self) -> bool {
        self.sessions().is_empty() && self.locks().is_empty() && self.hub.subscriber_count() == 0
    }
}

/// Route rooms keyed by route id. Rooms are created on first use.
#[derive(Debug)]
pub struct RouteRooms {
    settings: RoomSettings,
    rooms: RwLock<HashMap<Uuid, Arc<RouteRoom>>>,
}

impl RouteRooms {
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            settings,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, route_id: Uuid) -> Option<Arc<RouteRoom>> {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        rooms.get(&route_id).cloned()
    }

    pub fn get_or_create(&self, route_id: Uuid) -> Arc<RouteRoom> {
        if let Some(room) = self.get(route_id) {
            return room;
        }
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        rooms
            .entry(route_id)
            .or_insert_with(|| {
                debug!("Opening room for route {}", route_id);
                Arc::new(RouteRoom::new(route_id, self.settings))
            })
            .clone()
    }

    pub fn all(&self) -> Vec<Arc<RouteRoom>> {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        rooms.values().cloned().collect()
    }

    /// Drop idle rooms nobody else holds a handle to; returns how many
    pub fn prune_idle(&self) -> usize {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let before = rooms.len();
        rooms.retain(|_, room| Arc::strong_count(room) > 1 || !room.is_idle());
        before - rooms.len()
    }

    pub fn len(&self) -> usize {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
