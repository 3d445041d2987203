use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::route_directory::{RouteDirectory, RouteDirectoryError, VersionAuthor};
use crate::models::{
    CoordError, Coordinate, CreatePointChangeRequest, NewPointChange, PointChangeOutcome, PointChangeProposal,
    ProposalDecision, ProposalStatus, RouteEnd, RouteVersion,
};
use crate::services::proposal_store::ProposalStore;
use crate::services::room::RouteRoom;

/// Outcome of an owner decision
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub proposal: PointChangeProposal,
    /// The version written when the proposal was accepted
    pub version: Option<RouteVersion>,
}

/// Geometry write errors. A backend failure is reported as upstream.
fn persistence_error(e: RouteDirectoryError) -> CoordError {
    match e {
        RouteDirectoryError::Backend(msg) => CoordError::UpstreamPersistenceFailure(msg),
        other => other.into(),
    }
}

fn validate_position(position: &Coordinate) -> Result<(), CoordError> {
    position.validate().map_err(CoordError::InvalidRequest)
}

/// A route is a single line, addressed as feature 0
pub fn check_feature(feature_index: u32) -> Result<(), CoordError> {
    if feature_index != 0 {
        return Err(CoordError::InvalidRequest(format!(
            "Feature {} does not exist (routes have a single feature 0)",
            feature_index
        )));
    }
    Ok(())
}

fn check_index(index: usize, len: usize) -> Result<(), CoordError> {
    if index >= len {
        return Err(CoordError::InvalidRequest(format!(
            "Control point {} is out of range (route has {} points)",
            index, len
        )));
    }
    Ok(())
}

/// Decides between applying a move and recording it as a proposal, and
/// performs the geometry writes.
pub struct ReconciliationEngine {
    routes: Arc<dyn RouteDirectory>,
    proposals: Arc<dyn ProposalStore>,
}

impl ReconciliationEngine {
    pub fn new(routes: Arc<dyn RouteDirectory>, proposals: Arc<dyn ProposalStore>) -> Self {
        Self { routes, proposals }
    }

    /// Cached control points of the room, fetched on a miss
    async fn load_points<'a>(
        &self,
        route_id: Uuid,
        cache: &'a mut Option<Vec<Coordinate>>,
    ) -> Result<&'a mut Vec<Coordinate>, CoordError> {
        let points = match cache.take() {
            Some(points) => points,
            None => self.routes.get_control_points(route_id).await?,
        };
        Ok(cache.insert(points))
    }

    async fn require_owner(&self, route_id: Uuid, user_id: Uuid, action: &str) -> Result<Uuid, CoordError> {
        let owner = self.routes.get_route_owner(route_id).await?;
        if owner != user_id {
            return Err(CoordError::Unauthorized(format!("Only the route owner can {}", action)));
        }
        Ok(owner)
    }

    /// Handle a finished drag (or an HTTP submit).
    ///
    /// The owner is looked up on every call: the owner's move is applied, any
    /// other user's move becomes a pending proposal and geometry stays as is.
    pub async fn submit_move(
        &self,
        room: &RouteRoom,
        user_id: Uuid,
        change: &CreatePointChangeRequest,
        now: DateTime<Utc>,
    ) -> Result<PointChangeOutcome, CoordError> {
        check_feature(change.feature_index)?;
        validate_position(&change.original_position)?;
        validate_position(&change.new_position)?;
        let route_id = room.route_id();
        let owner = self.routes.get_route_owner(route_id).await?;

        if owner == user_id {
            let author = VersionAuthor {
                applied_by: owner,
                contributor: None,
            };
            let route_version = self
                .apply_move(room, change.point_index as usize, change.new_position, author)
                .await?;
            return Ok(PointChangeOutcome::Applied { route_version });
        }

        let user_display = room
            .sessions()
            .get_active(user_id, now)
            .map(|session| session.user_display.clone())
            .ok_or_else(|| CoordError::NotFound("No active editing session for this route".to_string()))?;

        {
            let mut cache = room.geometry().lock().await;
            let points = self.load_points(route_id, &mut cache).await?;
            check_index(change.point_index as usize, points.len())?;
        }

        let proposal = self
            .proposals
            .create(NewPointChange {
                route_id,
                user_id,
                user_display,
                feature_index: change.feature_index,
                point_index: change.point_index,
                original_position: change.original_position,
                new_position: change.new_position,
            })
            .await?;
        info!(
            "Recorded point change {} on route {} (point {}) by {}",
            proposal.id, route_id, proposal.point_index, user_id
        );
        Ok(PointChangeOutcome::Proposed { proposal })
    }

    /// Replace one control point and persist a new version.
    ///
    /// Only the read-replace step runs under the room's geometry lock; the
    /// shared write gate stays held until the write completes so no
    /// structural edit can shift the index meanwhile. If the write fails, the
    /// cached point is restored unless a later write already replaced it.
    pub async fn apply_move(
        &self,
        room: &RouteRoom,
        index: usize,
        position: Coordinate,
        author: VersionAuthor,
    ) -> Result<RouteVersion, CoordError> {
        let route_id = room.route_id();
        let _in_flight = room.write_gate().read().await;
        let (previous, control_points) = {
            let mut cache = room.geometry().lock().await;
            let points = self.load_points(route_id, &mut cache).await?;
            check_index(index, points.len())?;
            let previous = points[index];
            points[index] = position;
            (previous, points.clone())
        };

        match self.routes.replace_control_point(route_id, index, position, author).await {
            Ok(version_id) => {
                info!("Route {} point {} moved, version {}", route_id, index, version_id);
                Ok(RouteVersion {
                    route_id,
                    version_id,
                    control_points,
                    applied_by: author.applied_by,
                    contributor: author.contributor,
                })
            }
            Err(e) => {
                warn!("Persisting point {} of route {} failed: {}", index, route_id, e);
                let mut cache = room.geometry().lock().await;
                if matches!(e, RouteDirectoryError::IndexOutOfRange { .. }) {
                    // Our view of the route is wrong, refetch next time
                    *cache = None;
                } else if let Some(points) = cache.as_mut() {
                    if points.get(index) == Some(&position) {
                        points[index] = previous;
                    }
                }
                Err(persistence_error(e))
            }
        }
    }

    /// Accept or reject a pending proposal.
    ///
    /// Acceptance claims the proposal before writing, and reopens it if the
    /// write fails, so geometry changes at most once per proposal.
    pub async fn resolve(
        &self,
        room: &RouteRoom,
        proposal: &PointChangeProposal,
        resolver: Uuid,
        decision: ProposalDecision,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CoordError> {
        let owner = self
            .require_owner(proposal.route_id, resolver, "resolve point changes")
            .await?;
        if proposal.status != ProposalStatus::Pending {
            return Err(CoordError::AlreadyResolved(proposal.id));
        }

        let resolved = self.proposals.resolve(proposal.id, resolver, decision, now).await?;
        if decision == ProposalDecision::Rejected {
            info!("Point change {} rejected by {}", proposal.id, resolver);
            return Ok(Resolution {
                proposal: resolved,
                version: None,
            });
        }

        let author = VersionAuthor {
            applied_by: owner,
            contributor: Some(proposal.user_id),
        };
        match self
            .apply_move(room, proposal.point_index as usize, proposal.new_position, author)
            .await
        {
            Ok(version) => {
                info!("Point change {} accepted by {}", proposal.id, resolver);
                Ok(Resolution {
                    proposal: resolved,
                    version: Some(version),
                })
            }
            Err(e) => {
                if let Err(reopen_err) = self.proposals.reopen(proposal.id).await {
                    error!("Failed to reopen point change {}: {}", proposal.id, reopen_err);
                }
                Err(e)
            }
        }
    }

    /// Owner-only removal of one control point
    pub async fn remove_point(&self, room: &RouteRoom, user_id: Uuid, index: usize) -> Result<RouteVersion, CoordError> {
        let owner = self.require_owner(room.route_id(), user_id, "remove control points").await?;
        self.replace_all(room, owner, |points| {
            check_index(index, points.len())?;
            if points.len() <= 2 {
                return Err(CoordError::InvalidRequest(
                    "A route needs at least 2 control points".to_string(),
                ));
            }
            points.remove(index);
            Ok(())
        })
        .await
    }

    /// Owner-only extension of the route at either end.
    ///
    /// Returns the new version and the index the point was inserted at.
    pub async fn extend_route(
        &self,
        room: &RouteRoom,
        user_id: Uuid,
        end: RouteEnd,
        position: Coordinate,
    ) -> Result<(RouteVersion, usize), CoordError> {
        validate_position(&position)?;
        let owner = self.require_owner(room.route_id(), user_id, "extend the route").await?;
        let mut inserted_at = 0;
        let version = self
            .replace_all(room, owner, |points| {
                inserted_at = match end {
                    RouteEnd::Start => 0,
                    RouteEnd::End => points.len(),
                };
                points.insert(inserted_at, position);
                Ok(())
            })
            .await?;
        Ok((version, inserted_at))
    }

    /// Structural edit on a fresh copy of the points. Indices shift, so it
    /// waits for single-point writes in flight and holds the geometry lock
    /// until the write completes.
    async fn replace_all(
        &self,
        room: &RouteRoom,
        owner: Uuid,
        edit: impl FnOnce(&mut Vec<Coordinate>) -> Result<(), CoordError>,
    ) -> Result<RouteVersion, CoordError> {
        let route_id = room.route_id();
        let _exclusive = room.write_gate().write().await;
        let mut cache = room.geometry().lock().await;
        let mut points = self.routes.get_control_points(route_id).await?;
        edit(&mut points)?;

        let author = VersionAuthor {
            applied_by: owner,
            contributor: None,
        };
        match self.routes.replace_control_points(route_id, points.clone(), author).await {
            Ok(version_id) => {
                info!("Route {} now has {} control points, version {}", route_id, points.len(), version_id);
                *cache = Some(points.clone());
                Ok(RouteVersion {
                    route_id,
                    version_id,
                    control_points: points,
                    applied_by: owner,
                    contributor: None,
                })
            }
            Err(e) => {
                warn!("Persisting control points of route {} failed: {}", route_id, e);
                *cache = None;
                Err(persistence_error(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::route_directory::MemoryRouteDirectory;
    use crate::services::proposal_store::MemoryProposalStore;
    use crate::services::room::RoomSettings;
    use futures_util::future::BoxFuture;
    use std::time::Duration;

    /// Directory whose single-point writes take a while
    struct SlowDirectory {
        inner: Arc<MemoryRouteDirectory>,
        delay: Duration,
    }

    impl RouteDirectory for SlowDirectory {
        fn get_route_owner(&self, route_id: Uuid) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>> {
            self.inner.get_route_owner(route_id)
        }

        fn get_control_points(&self, route_id: Uuid) -> BoxFuture<'_, Result<Vec<Coordinate>, RouteDirectoryError>> {
            self.inner.get_control_points(route_id)
        }

        fn replace_control_point(
            &self,
            route_id: Uuid,
            index: usize,
            position: Coordinate,
            author: VersionAuthor,
        ) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.inner.replace_control_point(route_id, index, position, author).await
            })
        }

        fn replace_control_points(
            &self,
            route_id: Uuid,
            points: Vec<Coordinate>,
            author: VersionAuthor,
        ) -> BoxFuture<'_, Result<Uuid, RouteDirectoryError>> {
            self.inner.replace_control_points(route_id, points, author)
        }
    }

    struct Fixture {
        routes: Arc<MemoryRouteDirectory>,
        proposals: Arc<MemoryProposalStore>,
        engine: ReconciliationEngine,
        room: RouteRoom,
        owner: Uuid,
        guest: Uuid,
    }

    fn fixture() -> Fixture {
        let routes = Arc::new(MemoryRouteDirectory::new());
        let proposals = Arc::new(MemoryProposalStore::new());
        let route_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let guest = Uuid::new_v4();
        routes.insert_route(route_id, owner, vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(2.0, 2.0),
        ]);
        let room = RouteRoom::new(route_id, RoomSettings::default());
        room.sessions().join(guest, "guest", Utc::now());
        let engine = ReconciliationEngine::new(routes.clone(), proposals.clone());
        Fixture {
            routes,
            proposals,
            engine,
            room,
            owner,
            guest,
        }
    }

    fn move_request(index: u32, to: Coordinate) -> CreatePointChangeRequest {
        CreatePointChangeRequest {
            feature_index: 0,
            point_index: index,
            original_position: Coordinate::new(1.0, 1.0),
            new_position: to,
        }
    }

    async fn points(f: &Fixture) -> Vec<Coordinate> {
        f.routes.get_control_points(f.room.route_id()).await.unwrap()
    }

    #[tokio::test]
    async fn owner_move_is_applied_without_proposal() {
        let f = fixture();
        let outcome = f
            .engine
            .submit_move(&f.room, f.owner, &move_request(1, Coordinate::new(1.0, 2.0)), Utc::now())
            .await
            .unwrap();

        match outcome {
            PointChangeOutcome::Applied { route_version } => {
                assert_eq!(route_version.control_points[1], Coordinate::new(1.0, 2.0));
                assert_eq!(route_version.contributor, None);
            }
            other => panic!("expected applied, got {:?}", other),
        }
        assert_eq!(points(&f).await[1], Coordinate::new(1.0, 2.0));
        assert!(f.proposals.is_empty());
    }

    #[tokio::test]
    async fn guest_move_becomes_a_proposal_and_geometry_is_untouched() {
        let f = fixture();
        let outcome = f
            .engine
            .submit_move(&f.room, f.guest, &move_request(1, Coordinate::new(1.0, 2.0)), Utc::now())
            .await
            .unwrap();

        match outcome {
            PointChangeOutcome::Proposed { proposal } => {
                assert_eq!(proposal.status, ProposalStatus::Pending);
                assert_eq!(proposal.user_display, "guest");
            }
            other => panic!("expected proposed, got {:?}", other),
        }
        assert_eq!(points(&f).await[1], Coordinate::new(1.0, 1.0));
        assert_eq!(f.proposals.len(), 1);
        assert!(f.routes.versions(f.room.route_id()).is_empty());
    }

    #[tokio::test]
    async fn guest_without_session_cannot_propose() {
        let f = fixture();
        let stranger = Uuid::new_v4();
        let err = f
            .engine
            .submit_move(&f.room, stranger, &move_request(1, Coordinate::new(1.0, 2.0)), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::NotFound(_)));
        assert!(f.proposals.is_empty());
    }

    #[tokio::test]
    async fn structural_edit_waits_for_moves_in_flight() {
        let routes = Arc::new(MemoryRouteDirectory::new());
        let route_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let line = |n: usize| (0..n).map(|i| Coordinate::new(i as f64, i as f64)).collect::<Vec<_>>();
        routes.insert_route(route_id, owner, line(4));
        let slow = Arc::new(SlowDirectory {
            inner: routes.clone(),
            delay: Duration::from_millis(200),
        });
        let engine = ReconciliationEngine::new(slow, Arc::new(MemoryProposalStore::new()));
        let room = RouteRoom::new(route_id, RoomSettings::default());
        let author = VersionAuthor {
            applied_by: owner,
            contributor: None,
        };

        let (moved, removed) = tokio::join!(
            engine.apply_move(&room, 2, Coordinate::new(2.0, 9.0), author),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                engine.remove_point(&room, owner, 0).await
            }
        );

        let moved = moved.unwrap();
        assert_eq!(moved.control_points[2], Coordinate::new(2.0, 9.0));
        assert_eq!(moved.control_points.len(), 4);
        let expected = vec![Coordinate::new(1.0, 1.0), Coordinate::new(2.0, 9.0), Coordinate::new(3.0, 3.0)];
        assert_eq!(removed.unwrap().control_points, expected);
        assert_eq!(routes.get_control_points(route_id).await.unwrap(), expected);
        assert_eq!(room.geometry().lock().await.clone(), Some(expected));
    }

    #[tokio::test]
    async fn moves_on_other_features_are_rejected() {
        let f = fixture();
        let mut change = move_request(1, Coordinate::new(5.0, 5.0));
        change.feature_index = 7;
        for user in [f.owner, f.guest] {
            let err = f.engine.submit_move(&f.room, user, &change, Utc::now()).await.unwrap_err();
            assert!(matches!(err, CoordError::InvalidRequest(_)));
        }
        assert!(f.proposals.is_empty());
        assert_eq!(points(&f).await[1], Coordinate::new(1.0, 1.0));
    }

    #[tokio::test]
    async fn invalid_moves_are_rejected() {
        let f = fixture();
        let out_of_range = f
            .engine
            .submit_move(&f.room, f.owner, &move_request(7, Coordinate::new(1.0, 2.0)), Utc::now())
            .await;
        assert!(matches!(out_of_range, Err(CoordError::InvalidRequest(_))));

        let bad_lat = f
            .engine
            .submit_move(&f.room, f.guest, &move_request(1, Coordinate::new(1.0, 95.0)), Utc::now())
            .await;
        assert!(matches!(bad_lat, Err(CoordError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn accepting_applies_once_with_contributor() {
        let f = fixture();
        let proposal = match f
            .engine
            .submit_move(&f.room, f.guest, &move_request(1, Coordinate::new(1.0, 2.0)), Utc::now())
            .await
            .unwrap()
        {
            PointChangeOutcome::Proposed { proposal } => proposal,
            other => panic!("expected proposed, got {:?}", other),
        };

        let resolution = f
            .engine
            .resolve(&f.room, &proposal, f.owner, ProposalDecision::Accepted, Utc::now())
            .await
            .unwrap();
        assert_eq!(resolution.proposal.status, ProposalStatus::Accepted);
        let version = resolution.version.unwrap();
        assert_eq!(version.applied_by, f.owner);
        assert_eq!(version.contributor, Some(f.guest));
        assert_eq!(points(&f).await[1], Coordinate::new(1.0, 2.0));

        // A stale copy of the pending record still cannot apply twice
        let again = f
            .engine
            .resolve(&f.room, &proposal, f.owner, ProposalDecision::Accepted, Utc::now())
            .await;
        assert_eq!(again, Err(CoordError::AlreadyResolved(proposal.id)));
        assert_eq!(f.routes.versions(f.room.route_id()).len(), 1);
    }

    #[tokio::test]
    async fn only_the_owner_resolves() {
        let f = fixture();
        let proposal = match f
            .engine
            .submit_move(&f.room, f.guest, &move_request(1, Coordinate::new(1.0, 2.0)), Utc::now())
            .await
            .unwrap()
        {
            PointChangeOutcome::Proposed { proposal } => proposal,
            other => panic!("expected proposed, got {:?}", other),
        };
        let err = f
            .engine
            .resolve(&f.room, &proposal, f.guest, ProposalDecision::Accepted, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::Unauthorized(_)));

        // Ownership is looked up each time
        f.routes.set_owner(f.room.route_id(), f.guest);
        let resolution = f
            .engine
            .resolve(&f.room, &proposal, f.guest, ProposalDecision::Rejected, Utc::now())
            .await
            .unwrap();
        assert_eq!(resolution.proposal.status, ProposalStatus::Rejected);
        assert!(resolution.version.is_none());
    }

    #[tokio::test]
    async fn failed_write_rolls_back_and_reopens() {
        let f = fixture();
        let proposal = match f
            .engine
            .submit_move(&f.room, f.guest, &move_request(1, Coordinate::new(1.0, 2.0)), Utc::now())
            .await
            .unwrap()
        {
            PointChangeOutcome::Proposed { proposal } => proposal,
            other => panic!("expected proposed, got {:?}", other),
        };

        f.routes.set_fail_writes(true);
        let err = f
            .engine
            .resolve(&f.room, &proposal, f.owner, ProposalDecision::Accepted, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::UpstreamPersistenceFailure(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);

        let cached = f.room.geometry().lock().await.clone().unwrap();
        assert_eq!(cached[1], Coordinate::new(1.0, 1.0));
        let stored = f.proposals.get(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Pending);

        f.routes.set_fail_writes(false);
        assert!(f
            .engine
            .resolve(&f.room, &stored, f.owner, ProposalDecision::Accepted, Utc::now())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn structural_edits_are_owner_only_and_keep_two_points() {
        let f = fixture();
        let err = f.engine.remove_point(&f.room, f.guest, 1).await.unwrap_err();
        assert!(matches!(err, CoordError::Unauthorized(_)));

        let version = f.engine.remove_point(&f.room, f.owner, 1).await.unwrap();
        assert_eq!(version.control_points.len(), 2);
        let err = f.engine.remove_point(&f.room, f.owner, 0).await.unwrap_err();
        assert!(matches!(err, CoordError::InvalidRequest(_)));

        let (version, at) = f
            .engine
            .extend_route(&f.room, f.owner, RouteEnd::Start, Coordinate::new(-1.0, -1.0))
            .await
            .unwrap();
        assert_eq!(at, 0);
        assert_eq!(version.control_points[0], Coordinate::new(-1.0, -1.0));
        assert_eq!(points(&f).await.len(), 3);

        let err = f
            .engine
            .extend_route(&f.room, f.guest, RouteEnd::End, Coordinate::new(3.0, 3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::Unauthorized(_)));
    }
}
