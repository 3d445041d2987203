use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use crate::models::{CoordError, Coordinate};

/// Who is writing a new route version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionAuthor {
    pub applied_by: Uuid,
    /// The proposer credited for an accepted suggestion
    pub contributor: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteDirectoryError {
    RouteNotFound(Uuid),
    IndexOutOfRange { index: usize, len: usize },
    Backend(String),
}

impl fmt::Display for RouteDirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteDirectoryError::RouteNotFound(id) => write!(f, "Route {} not found", id),
            RouteDirectoryError::IndexOutOfRange { index, len } => {
                write!(f, "Control point {} is out of range (route has {} points)", index, len)
            }
            RouteDirectoryError::Backend(msg) => write!(f, "Routing component error: {}", msg),
        }
    }
}

impl std::error::Error for RouteDirectoryError {}

impl From<RouteDirectoryError> for CoordError {
    fn from(e: RouteDirectoryError) -> Self {
        match e {
            RouteDirectoryError::RouteNotFound(_) => CoordError::NotFound(e.to_string()),
            RouteDirectoryError::IndexOutOfRange { .. } => CoordError::InvalidRequest(e.to_string()),
            RouteDirectoryError::Backend(msg) => CoordError::Internal(msg),
        }
    }
}

/// The routing/CRUD component that owns authoritative route geometry
pub trait RouteDirectory: Send + Sync {
    fn get_route_owner(&self, route_id: Uuid) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>>;

    fn get_control_points(&self, route_id: Uuid) -> BoxFuture<'_, Result<Vec<Coordinate>, RouteDirectoryError>>;

    /// Persist a new version with one point replaced; returns the version id
    fn replace_control_point(
        &self,
        route_id: Uuid,
        index: usize,
        position: Coordinate,
        author: VersionAuthor,
    ) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>>;

    /// Persist a new version with the whole sequence replaced
    fn replace_control_points(
        &self,
        route_id: Uuid,
        points: Vec<Coordinate>,
        author: VersionAuthor,
    ) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>>;
}

/// A version written to the in-memory directory
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVersion {
    pub version_id: Uuid,
    pub control_points: Vec<Coordinate>,
    pub author: VersionAuthor,
}

#[derive(Debug, Clone)]
struct MemoryRoute {
    owner: Uuid,
    control_points: Vec<Coordinate>,
    versions: Vec<StoredVersion>,
}

/// In-memory routing component for tests and database-less development
#[derive(Debug, Default)]
pub struct MemoryRouteDirectory {
    routes: RwLock<HashMap<Uuid, MemoryRoute>>,
    fail_writes: AtomicBool,
}

impl MemoryRouteDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_route(&self, route_id: Uuid, owner: Uuid, control_points: Vec<Coordinate>) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.insert(route_id, MemoryRoute {
            owner,
            control_points,
            versions: Vec::new(),
        });
    }

    /// Transfer ownership of a route
    pub fn set_owner(&self, route_id: Uuid, owner: Uuid) {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if let Some(route) = routes.get_mut(&route_id) {
            route.owner = owner;
        }
    }

    /// Make every subsequent write fail, simulating an unavailable backend
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn versions(&self, route_id: Uuid) -> Vec<StoredVersion> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.get(&route_id).map(|r| r.versions.clone()).unwrap_or_default()
    }

    fn write_version(
        &self,
        route_id: Uuid,
        author: VersionAuthor,
        mutate: impl FnOnce(&mut Vec<Coordinate>) -> Result<(), RouteDirectoryError>,
    ) -> Result<Uuid, RouteDirectoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RouteDirectoryError::Backend("write rejected".to_string()));
        }
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        let route = routes
            .get_mut(&route_id)
            .ok_or(RouteDirectoryError::RouteNotFound(route_id))?;
        mutate(&mut route.control_points)?;
        let version = StoredVersion {
            version_id: Uuid::new_v4(),
            control_points: route.control_points.clone(),
            author,
        };
        let version_id = version.version_id;
        route.versions.push(version);
        Ok(version_id)
    }
}

impl RouteDirectory for MemoryRouteDirectory {
    fn get_route_owner(&self, route_id: Uuid) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>> {
        Box::pin(async move {
            let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
            routes
                .get(&route_id)
                .map(|r| r.owner)
                .ok_or(RouteDirectoryError::RouteNotFound(route_id))
        })
    }

    fn get_control_points(&self, route_id: Uuid) -> BoxFuture<'_, Result<Vec<Coordinate>, RouteDirectoryError>> {
        Box::pin(async move {
            let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
            routes
                .get(&route_id)
                .map(|r| r.control_points.clone())
                .ok_or(RouteDirectoryError::RouteNotFound(route_id))
        })
    }

    fn replace_control_point(
        &self,
        route_id: Uuid,
        index: usize,
        position: Coordinate,
        author: VersionAuthor,
    ) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>> {
        Box::pin(async move {
            self.write_version(route_id, author, |points| {
                let len = points.len();
                let slot = points
                    .get_mut(index)
                    .ok_or(RouteDirectoryError::IndexOutOfRange { index, len })?;
                *slot = position;
                Ok(())
            })
        })
    }

    fn replace_control_points(
        &self,
        route_id: Uuid,
        new_points: Vec<Coordinate>,
        author: VersionAuthor,
    ) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>> {
        Box::pin(async move {
            self.write_version(route_id, author, |points| {
                *points = new_points;
                Ok(())
            })
        })
    }
}
