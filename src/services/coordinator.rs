use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::clients::route_directory::RouteDirectory;
use crate::config::Config;
use crate::models::{
    BroadcastEvent, BroadcastMessage, CoordError, Coordinate, CreatePointChangeRequest, DragOutcome,
    EditingSession, ExtendRouteRequest, HeartbeatResponse, JoinSessionResponse, LeaveReason,
    PointChangeOutcome, PointChangeProposal, ProposalDecision, ProposalStatus, RouteVersion,
};
use crate::services::broadcast_hub::HubSubscription;
use crate::services::drag_locks::{DragLock, LockError, PointKey, TryLock};
use crate::services::proposal_store::ProposalStore;
use crate::services::reconciliation::{check_feature, ReconciliationEngine};
use crate::services::room::{RoomSettings, RouteRoom, RouteRooms};

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    pub room: RoomSettings,
    /// Resolved proposals older than this are archived
    pub proposal_archive_after: TimeDelta,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            room: RoomSettings::default(),
            proposal_archive_after: TimeDelta::hours(24),
        }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            room: RoomSettings {
                session_stale_after: TimeDelta::seconds(config.session_stale_secs as i64),
                drag_lock_ttl: TimeDelta::seconds(config.drag_lock_ttl_secs as i64),
                broadcast_capacity: config.broadcast_capacity,
            },
            proposal_archive_after: TimeDelta::hours(config.proposal_archive_hours as i64),
        }
    }
}

/// Counters reported by the diagnostics endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub rooms: usize,
    pub sessions: usize,
    pub drag_locks: usize,
    pub subscribers: usize,
    pub messages_sent: u64,
    pub messages_dropped: u64,
}

/// Entry point for every editing operation.
///
/// Routes are independent: all state of a route lives in its room.
pub struct Coordinator {
    settings: CoordinatorSettings,
    rooms: RouteRooms,
    routes: Arc<dyn RouteDirectory>,
    proposals: Arc<dyn ProposalStore>,
    engine: ReconciliationEngine,
}

impl Coordinator {
    pub fn new(
        settings: CoordinatorSettings,
        routes: Arc<dyn RouteDirectory>,
        proposals: Arc<dyn ProposalStore>,
    ) -> Self {
        Self {
            settings,
            rooms: RouteRooms::new(settings.room),
            engine: ReconciliationEngine::new(routes.clone(), proposals.clone()),
            routes,
            proposals,
        }
    }

    fn room(&self, route_id: Uuid) -> Result<Arc<RouteRoom>, CoordError> {
        self.rooms
            .get(route_id)
            .ok_or_else(|| CoordError::NotFound("No active editing session for this route".to_string()))
    }

    fn require_session(room: &RouteRoom, user_id: Uuid, now: DateTime<Utc>) -> Result<EditingSession, CoordError> {
        room.sessions()
            .get_active(user_id, now)
            .cloned()
            .ok_or_else(|| CoordError::NotFound("No active editing session for this route".to_string()))
    }

    /// Display name of the user's session, or of the token when there is none
    fn display_for(room: &RouteRoom, user: &AuthUser, now: DateTime<Utc>) -> String {
        room.sessions()
            .get_active(user.user_id, now)
            .map(|session| session.user_display.clone())
            .unwrap_or_else(|| user.display_name.clone())
    }

    /// Synthetic drag ends for released locks, seen by everyone including the holder
    fn publish_aborts(room: &RouteRoom, released: Vec<(PointKey, DragLock)>) {
        for (key, lock) in released {
            debug!(
                "Aborting drag of point {} on route {} held by {}",
                key.point_index,
                room.route_id(),
                lock.user_id
            );
            let message = BroadcastMessage::new(lock.user_id, &lock.user_display, BroadcastEvent::DragEnd {
                feature_index: key.feature_index,
                point_index: key.point_index,
                original_position: lock.original_position,
                final_position: lock.original_position,
                outcome: DragOutcome::Aborted,
            });
            room.hub().publish(None, message);
        }
    }

    // Sessions

    pub async fn join(
        &self,
        route_id: Uuid,
        user: &AuthUser,
        display_name: Option<String>,
    ) -> Result<JoinSessionResponse, CoordError> {
        // Fails with NotFound for unknown routes
        self.routes.get_route_owner(route_id).await?;

        let shown = display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| user.display_name.clone());
        let room = self.rooms.get_or_create(route_id);
        let (session, active_sessions) = room.sessions().join(user.user_id, &shown, Utc::now());
        info!("User {} joined route {} as '{}'", user.user_id, route_id, shown);

        let message = BroadcastMessage::new(user.user_id, &shown, BroadcastEvent::MemberJoined {
            session: session.clone(),
        });
        room.hub().publish(Some(user.user_id), message);
        Ok(JoinSessionResponse {
            session,
            active_sessions,
        })
    }

    pub fn heartbeat(&self, route_id: Uuid, user_id: Uuid) -> Result<HeartbeatResponse, CoordError> {
        let room = self.room(route_id)?;
        let session = room
            .sessions()
            .heartbeat(user_id, Utc::now())
            .ok_or_else(|| CoordError::NotFound("Editing session expired, join again".to_string()))?;
        Ok(HeartbeatResponse {
            last_heartbeat: session.last_heartbeat,
        })
    }

    /// Idempotent. Releases the user's drag locks.
    pub fn leave(&self, route_id: Uuid, user_id: Uuid) {
        let Some(room) = self.rooms.get(route_id) else {
            return;
        };
        let session = room.sessions().leave(user_id);
        let released = room.locks().release_user(user_id);
        Self::publish_aborts(&room, released);

        if let Some(session) = session {
            info!("User {} left route {}", user_id, route_id);
            let message = BroadcastMessage::new(user_id, &session.user_display, BroadcastEvent::MemberLeft {
                reason: LeaveReason::Left,
            });
            room.hub().publish(None, message);
        }
    }

    pub fn active_members(&self, route_id: Uuid) -> Vec<EditingSession> {
        self.rooms
            .get(route_id)
            .map(|room| room.sessions().active(Utc::now()))
            .unwrap_or_default()
    }

    /// Receive the route's broadcasts. Requires an active session.
    pub fn subscribe(&self, route_id: Uuid, user_id: Uuid) -> Result<HubSubscription, CoordError> {
        let room = self.room(route_id)?;
        Self::require_session(&room, user_id, Utc::now())?;
        Ok(room.hub().subscribe(user_id))
    }

    // Drags

    pub fn cursor_move(&self, route_id: Uuid, user_id: Uuid, position: Coordinate) -> Result<(), CoordError> {
        position.validate().map_err(CoordError::InvalidRequest)?;
        let room = self.room(route_id)?;
        let session = Self::require_session(&room, user_id, Utc::now())?;
        let message = BroadcastMessage::new(user_id, &session.user_display, BroadcastEvent::CursorMove { position });
        room.hub().publish(Some(user_id), message);
        Ok(())
    }

    pub fn begin_drag(
        &self,
        route_id: Uuid,
        user_id: Uuid,
        key: PointKey,
        position: Coordinate,
    ) -> Result<(), CoordError> {
        check_feature(key.feature_index)?;
        position.validate().map_err(CoordError::InvalidRequest)?;
        let room = self.room(route_id)?;
        let now = Utc::now();
        let session = Self::require_session(&room, user_id, now)?;

        let locked = room.locks().try_lock(key, user_id, &session.user_display, position, now);
        if let TryLock::AlreadyLocked { holder } = locked {
            debug!("Point {} of route {} already dragged by {}", key.point_index, route_id, holder);
            return Err(CoordError::AlreadyLocked { holder });
        }

        let message = BroadcastMessage::new(user_id, &session.user_display, BroadcastEvent::DragStart {
            feature_index: key.feature_index,
            point_index: key.point_index,
            original_position: position,
        });
        room.hub().publish(Some(user_id), message);
        Ok(())
    }

    /// Relay an in-progress position and keep the lock alive.
    ///
    /// An update after the lock expired takes the lock again if it is free.
    pub fn update_drag(
        &self,
        route_id: Uuid,
        user_id: Uuid,
        key: PointKey,
        original_position: Coordinate,
        current_position: Coordinate,
    ) -> Result<(), CoordError> {
        check_feature(key.feature_index)?;
        current_position.validate().map_err(CoordError::InvalidRequest)?;
        let room = self.room(route_id)?;
        let now = Utc::now();
        let session = Self::require_session(&room, user_id, now)?;

        {
            let mut locks = room.locks();
            match locks.touch(key, user_id, now) {
                Ok(()) => {}
                Err(LockError::NotHolder { holder: Some(holder) }) => {
                    return Err(CoordError::AlreadyLocked { holder });
                }
                Err(LockError::NotHolder { holder: None }) => {
                    if let TryLock::AlreadyLocked { holder } =
                        locks.try_lock(key, user_id, &session.user_display, original_position, now)
                    {
                        return Err(CoordError::AlreadyLocked { holder });
                    }
                }
            }
        }

        let message = BroadcastMessage::new(user_id, &session.user_display, BroadcastEvent::DragUpdate {
            feature_index: key.feature_index,
            point_index: key.point_index,
            original_position,
            current_position,
        });
        room.hub().publish(Some(user_id), message);
        Ok(())
    }

    /// Finish a drag, or submit a move without one.
    ///
    /// Releases the caller's lock, reconciles the move and tells the other
    /// members how it ended. A point locked by someone else is refused.
    pub async fn submit_point_change(
        &self,
        route_id: Uuid,
        user: &AuthUser,
        change: CreatePointChangeRequest,
    ) -> Result<PointChangeOutcome, CoordError> {
        let room = self.rooms.get_or_create(route_id);
        let now = Utc::now();
        let key = PointKey::new(change.feature_index, change.point_index);

        let released = match room.locks().unlock(key, user.user_id, now) {
            Ok(lock) => Some(lock),
            Err(LockError::NotHolder { holder: Some(holder) }) => {
                return Err(CoordError::AlreadyLocked { holder });
            }
            Err(LockError::NotHolder { holder: None }) => None,
        };
        let shown = Self::display_for(&room, user, now);

        let outcome = match self.engine.submit_move(&room, user.user_id, &change, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Point change on route {} by {} failed: {}", route_id, user.user_id, e);
                if let Some(lock) = released {
                    Self::publish_aborts(&room, vec![(key, lock)]);
                }
                return Err(e);
            }
        };

        let drag_outcome = match &outcome {
            PointChangeOutcome::Applied { route_version } => DragOutcome::Applied {
                version_id: route_version.version_id,
            },
            PointChangeOutcome::Proposed { proposal } => {
                let created = BroadcastMessage::new(user.user_id, &shown, BroadcastEvent::ProposalCreated {
                    proposal: proposal.clone(),
                });
                room.hub().publish(Some(user.user_id), created);
                DragOutcome::Proposed {
                    proposal_id: proposal.id,
                }
            }
        };

        // Observers see the applied position, or the ghost of the proposal
        let message = BroadcastMessage::new(user.user_id, &shown, BroadcastEvent::DragEnd {
            feature_index: change.feature_index,
            point_index: change.point_index,
            original_position: change.original_position,
            final_position: change.new_position,
            outcome: drag_outcome,
        });
        room.hub().publish(Some(user.user_id), message);
        Ok(outcome)
    }

    /// Cancel the caller's drag; the point keeps its original position
    pub fn abort_drag(&self, route_id: Uuid, user_id: Uuid, key: PointKey) -> Result<(), CoordError> {
        let room = self.room(route_id)?;
        let unlocked = room.locks().unlock(key, user_id, Utc::now());
        match unlocked {
            Ok(lock) => {
                let message = BroadcastMessage::new(user_id, &lock.user_display, BroadcastEvent::DragEnd {
                    feature_index: key.feature_index,
                    point_index: key.point_index,
                    original_position: lock.original_position,
                    final_position: lock.original_position,
                    outcome: DragOutcome::Aborted,
                });
                room.hub().publish(Some(user_id), message);
                Ok(())
            }
            Err(LockError::NotHolder { holder: Some(holder) }) => Err(CoordError::AlreadyLocked { holder }),
            Err(LockError::NotHolder { holder: None }) => Ok(()),
        }
    }

    /// A channel of the user closed; its drags are aborted, the session stays
    pub fn disconnect(&self, route_id: Uuid, user_id: Uuid) {
        if let Some(room) = self.rooms.get(route_id) {
            let released = room.locks().release_user(user_id);
            if !released.is_empty() {
                info!("Releasing {} drag locks of {} on route {}", released.len(), user_id, route_id);
            }
            Self::publish_aborts(&room, released);
        }
    }

    // Proposals

    pub async fn list_point_changes(
        &self,
        route_id: Uuid,
        status: Option<ProposalStatus>,
    ) -> Result<Vec<PointChangeProposal>, CoordError> {
        Ok(self.proposals.list(route_id, status).await?)
    }

    pub async fn resolve_point_change(
        &self,
        proposal_id: Uuid,
        resolver: &AuthUser,
        decision: ProposalDecision,
    ) -> Result<PointChangeProposal, CoordError> {
        let proposal = self
            .proposals
            .get(proposal_id)
            .await?
            .ok_or_else(|| CoordError::NotFound(format!("Point change {} not found", proposal_id)))?;
        let room = self.rooms.get_or_create(proposal.route_id);
        let now = Utc::now();
        let resolution = self
            .engine
            .resolve(&room, &proposal, resolver.user_id, decision, now)
            .await?;
        let shown = Self::display_for(&room, resolver, now);

        let resolved = BroadcastMessage::new(resolver.user_id, &shown, BroadcastEvent::ProposalResolved {
            proposal: resolution.proposal.clone(),
        });
        room.hub().publish(Some(resolver.user_id), resolved);

        if let Some(version) = resolution.version {
            let applied = BroadcastMessage::new(resolver.user_id, &shown, BroadcastEvent::DragEnd {
                feature_index: proposal.feature_index,
                point_index: proposal.point_index,
                original_position: proposal.original_position,
                final_position: proposal.new_position,
                outcome: DragOutcome::Applied {
                    version_id: version.version_id,
                },
            });
            room.hub().publish(Some(resolver.user_id), applied);
        }
        Ok(resolution.proposal)
    }

    // Structural edits

    pub async fn remove_control_point(
        &self,
        route_id: Uuid,
        user: &AuthUser,
        index: u32,
    ) -> Result<RouteVersion, CoordError> {
        let room = self.rooms.get_or_create(route_id);
        let version = self.engine.remove_point(&room, user.user_id, index as usize).await?;
        self.after_structural_edit(&room, user, index, &version);
        Ok(version)
    }

    pub async fn extend_route(
        &self,
        route_id: Uuid,
        user: &AuthUser,
        request: ExtendRouteRequest,
    ) -> Result<RouteVersion, CoordError> {
        let room = self.rooms.get_or_create(route_id);
        let (version, inserted_at) = self
            .engine
            .extend_route(&room, user.user_id, request.end, request.position)
            .await?;
        self.after_structural_edit(&room, user, inserted_at as u32, &version);
        Ok(version)
    }

    /// Drags on shifted points no longer address the same point
    fn after_structural_edit(&self, room: &RouteRoom, user: &AuthUser, from_index: u32, version: &RouteVersion) {
        let released = room.locks().release_from(from_index);
        Self::publish_aborts(room, released);
        let shown = Self::display_for(room, user, Utc::now());
        let message = BroadcastMessage::new(user.user_id, &shown, BroadcastEvent::RouteUpdated {
            version: version.clone(),
        });
        room.hub().publish(Some(user.user_id), message);
    }

    // Sweeps

    /// Evict stale sessions, abort their drags, prune idle rooms
    pub fn sweep_sessions(&self, now: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        for room in self.rooms.all() {
            let stale = room.sessions().evict_stale(now);
            for session in stale {
                evicted += 1;
                info!("Session of {} on route {} expired", session.user_id, room.route_id());
                let released = room.locks().release_user(session.user_id);
                Self::publish_aborts(&room, released);
                let message =
                    BroadcastMessage::new(session.user_id, &session.user_display, BroadcastEvent::MemberLeft {
                        reason: LeaveReason::Expired,
                    });
                room.hub().publish(None, message);
            }
        }
        let pruned = self.rooms.prune_idle();
        if pruned > 0 {
            debug!("Pruned {} idle rooms", pruned);
        }
        evicted
    }

    /// Expire untouched drag locks
    pub fn sweep_locks(&self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for room in self.rooms.all() {
            let released = room.locks().expire(now);
            expired += released.len();
            Self::publish_aborts(&room, released);
        }
        expired
    }

    /// Delete resolved proposals past the archival age
    pub async fn archive_proposals(&self, now: DateTime<Utc>) -> Result<u64, CoordError> {
        let archived = self
            .proposals
            .archive_resolved(now - self.settings.proposal_archive_after)
            .await?;
        if archived > 0 {
            info!("Archived {} resolved point changes", archived);
        }
        Ok(archived)
    }

    pub fn stats(&self) -> CoordinatorStats {
        let now = Utc::now();
        self.rooms.all().iter().fold(
            CoordinatorStats {
                rooms: self.rooms.len(),
                ..Default::default()
            },
            |mut stats, room| {
                let hub = room.hub().stats();
                stats.sessions += room.sessions().active(now).len();
                stats.drag_locks += room.locks().len();
                stats.subscribers += hub.subscribers;
                stats.messages_sent += hub.messages_sent;
                stats.messages_dropped += hub.messages_dropped;
                stats
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::route_directory::MemoryRouteDirectory;
    use crate::services::proposal_store::MemoryProposalStore;

    struct Fixture {
        coordinator: Arc<Coordinator>,
        routes: Arc<MemoryRouteDirectory>,
        route_id: Uuid,
        owner: AuthUser,
        guest: AuthUser,
    }

    fn fixture() -> Fixture {
        let routes = Arc::new(MemoryRouteDirectory::new());
        let proposals = Arc::new(MemoryProposalStore::new());
        let route_id = Uuid::new_v4();
        let owner = AuthUser::new(Uuid::new_v4(), "owner");
        let guest = AuthUser::new(Uuid::new_v4(), "guest");
        routes.insert_route(route_id, owner.user_id, vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(2.0, 2.0),
        ]);
        let coordinator = Arc::new(Coordinator::new(CoordinatorSettings::default(), routes.clone(), proposals));
        Fixture {
            coordinator,
            routes,
            route_id,
            owner,
            guest,
        }
    }

    fn drag(index: u32, from: Coordinate, to: Coordinate) -> CreatePointChangeRequest {
        CreatePointChangeRequest {
            feature_index: 0,
            point_index: index,
            original_position: from,
            new_position: to,
        }
    }

    #[tokio::test]
    async fn join_requires_an_existing_route() {
        let f = fixture();
        let err = f.coordinator.join(Uuid::new_v4(), &f.owner, None).await.unwrap_err();
        assert!(matches!(err, CoordError::NotFound(_)));

        let joined = f
            .coordinator
            .join(f.route_id, &f.owner, Some("  Ana  ".to_string()))
            .await
            .unwrap();
        assert_eq!(joined.session.user_display, "Ana");
        assert!(joined.active_sessions.is_empty());

        let second = f.coordinator.join(f.route_id, &f.guest, None).await.unwrap();
        assert_eq!(second.active_sessions.len(), 1);
        assert_eq!(f.coordinator.active_members(f.route_id).len(), 2);
    }

    #[tokio::test]
    async fn heartbeat_without_session_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.coordinator.heartbeat(f.route_id, f.guest.user_id),
            Err(CoordError::NotFound(_))
        ));
        f.coordinator.join(f.route_id, &f.guest, None).await.unwrap();
        assert!(f.coordinator.heartbeat(f.route_id, f.guest.user_id).is_ok());
    }

    #[tokio::test]
    async fn observer_sees_owner_drag_end_with_applied_position() {
        let f = fixture();
        f.coordinator.join(f.route_id, &f.owner, None).await.unwrap();
        f.coordinator.join(f.route_id, &f.guest, None).await.unwrap();
        let mut observer = f.coordinator.subscribe(f.route_id, f.guest.user_id).unwrap();

        let key = PointKey::new(0, 0);
        let from = Coordinate::new(0.0, 0.0);
        let to = Coordinate::new(0.5, 0.5);
        f.coordinator.begin_drag(f.route_id, f.owner.user_id, key, from).unwrap();
        f.coordinator
            .update_drag(f.route_id, f.owner.user_id, key, from, Coordinate::new(0.2, 0.2))
            .unwrap();
        let outcome = f
            .coordinator
            .submit_point_change(f.route_id, &f.owner, drag(0, from, to))
            .await
            .unwrap();
        assert!(matches!(outcome, PointChangeOutcome::Applied { .. }));

        assert!(matches!(observer.recv().await.unwrap().event, BroadcastEvent::DragStart { .. }));
        assert!(matches!(observer.recv().await.unwrap().event, BroadcastEvent::DragUpdate { .. }));
        match observer.recv().await.unwrap().event {
            BroadcastEvent::DragEnd {
                final_position,
                outcome: DragOutcome::Applied { .. },
                ..
            } => assert_eq!(final_position, to),
            other => panic!("expected applied drag_end, got {:?}", other),
        }
        assert!(f.coordinator.stats().drag_locks == 0);
    }

    #[tokio::test]
    async fn guest_proposal_accepted_by_owner() {
        let f = fixture();
        f.coordinator.join(f.route_id, &f.owner, None).await.unwrap();
        f.coordinator.join(f.route_id, &f.guest, None).await.unwrap();
        let mut owner_view = f.coordinator.subscribe(f.route_id, f.owner.user_id).unwrap();

        let outcome = f
            .coordinator
            .submit_point_change(f.route_id, &f.guest, drag(1, Coordinate::new(1.0, 1.0), Coordinate::new(1.0, 2.0)))
            .await
            .unwrap();
        let proposal = match outcome {
            PointChangeOutcome::Proposed { proposal } => proposal,
            other => panic!("expected proposed, got {:?}", other),
        };
        assert_eq!(
            f.routes.get_control_points(f.route_id).await.unwrap()[1],
            Coordinate::new(1.0, 1.0)
        );
        assert!(matches!(owner_view.recv().await.unwrap().event, BroadcastEvent::ProposalCreated { .. }));
        assert!(matches!(
            owner_view.recv().await.unwrap().event,
            BroadcastEvent::DragEnd {
                outcome: DragOutcome::Proposed { .. },
                ..
            }
        ));

        let pending = f
            .coordinator
            .list_point_changes(f.route_id, Some(ProposalStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        let err = f
            .coordinator
            .resolve_point_change(proposal.id, &f.guest, ProposalDecision::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::Unauthorized(_)));

        let accepted = f
            .coordinator
            .resolve_point_change(proposal.id, &f.owner, ProposalDecision::Accepted)
            .await
            .unwrap();
        assert_eq!(accepted.status, ProposalStatus::Accepted);
        assert_eq!(
            f.routes.get_control_points(f.route_id).await.unwrap()[1],
            Coordinate::new(1.0, 2.0)
        );
        let versions = f.routes.versions(f.route_id);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].author.contributor, Some(f.guest.user_id));

        let again = f
            .coordinator
            .resolve_point_change(proposal.id, &f.owner, ProposalDecision::Rejected)
            .await;
        assert_eq!(again, Err(CoordError::AlreadyResolved(proposal.id)));
        assert!(matches!(
            f.coordinator
                .resolve_point_change(Uuid::new_v4(), &f.owner, ProposalDecision::Rejected)
                .await,
            Err(CoordError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn submitting_on_a_point_locked_by_someone_else_is_refused() {
        let f = fixture();
        f.coordinator.join(f.route_id, &f.owner, None).await.unwrap();
        f.coordinator.join(f.route_id, &f.guest, None).await.unwrap();
        let key = PointKey::new(0, 1);
        f.coordinator
            .begin_drag(f.route_id, f.guest.user_id, key, Coordinate::new(1.0, 1.0))
            .unwrap();

        assert_eq!(
            f.coordinator
                .begin_drag(f.route_id, f.owner.user_id, key, Coordinate::new(1.0, 1.0)),
            Err(CoordError::AlreadyLocked {
                holder: f.guest.user_id
            })
        );
        let err = f
            .coordinator
            .submit_point_change(f.route_id, &f.owner, drag(1, Coordinate::new(1.0, 1.0), Coordinate::new(3.0, 3.0)))
            .await
            .unwrap_err();
        assert_eq!(err, CoordError::AlreadyLocked { holder: f.guest.user_id });
        assert!(f.routes.versions(f.route_id).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_drag_starts_yield_a_single_lock() {
        let f = fixture();
        let mut users = Vec::new();
        for i in 0..16 {
            let user = AuthUser::new(Uuid::new_v4(), format!("user-{}", i));
            f.coordinator.join(f.route_id, &user, None).await.unwrap();
            users.push(user);
        }

        let key = PointKey::new(0, 2);
        let mut tasks = Vec::new();
        for user in users {
            let coordinator = f.coordinator.clone();
            let route_id = f.route_id;
            tasks.push(tokio::spawn(async move {
                coordinator.begin_drag(route_id, user.user_id, key, Coordinate::new(2.0, 2.0))
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(f.coordinator.stats().drag_locks, 1);
    }

    #[tokio::test]
    async fn leave_aborts_drags_and_notifies_members() {
        let f = fixture();
        f.coordinator.join(f.route_id, &f.owner, None).await.unwrap();
        f.coordinator.join(f.route_id, &f.guest, None).await.unwrap();
        let mut owner_view = f.coordinator.subscribe(f.route_id, f.owner.user_id).unwrap();
        let from = Coordinate::new(1.0, 1.0);
        f.coordinator
            .begin_drag(f.route_id, f.guest.user_id, PointKey::new(0, 1), from)
            .unwrap();
        assert!(matches!(owner_view.recv().await.unwrap().event, BroadcastEvent::DragStart { .. }));

        f.coordinator.leave(f.route_id, f.guest.user_id);
        f.coordinator.leave(f.route_id, f.guest.user_id);

        match owner_view.recv().await.unwrap().event {
            BroadcastEvent::DragEnd {
                final_position,
                outcome: DragOutcome::Aborted,
                ..
            } => assert_eq!(final_position, from),
            other => panic!("expected aborted drag_end, got {:?}", other),
        }
        assert_eq!(
            owner_view.recv().await.unwrap().event,
            BroadcastEvent::MemberLeft {
                reason: LeaveReason::Left
            }
        );
        assert_eq!(f.coordinator.active_members(f.route_id).len(), 1);
        assert_eq!(f.coordinator.stats().drag_locks, 0);
    }

    #[tokio::test]
    async fn sweeps_evict_stale_sessions_and_expired_locks() {
        let f = fixture();
        f.coordinator.join(f.route_id, &f.owner, None).await.unwrap();
        f.coordinator.join(f.route_id, &f.guest, None).await.unwrap();
        let mut guest_view = f.coordinator.subscribe(f.route_id, f.guest.user_id).unwrap();
        let owner_view = f.coordinator.subscribe(f.route_id, f.owner.user_id).unwrap();
        let from = Coordinate::new(0.0, 0.0);
        f.coordinator
            .begin_drag(f.route_id, f.owner.user_id, PointKey::new(0, 0), from)
            .unwrap();
        assert!(matches!(guest_view.recv().await.unwrap().event, BroadcastEvent::DragStart { .. }));

        let now = Utc::now();
        assert_eq!(f.coordinator.sweep_locks(now), 0);
        assert_eq!(f.coordinator.sweep_locks(now + TimeDelta::seconds(31)), 1);
        let aborted = guest_view.recv().await.unwrap();
        assert_eq!(aborted.user_id, f.owner.user_id);
        assert_eq!(
            aborted.event,
            BroadcastEvent::DragEnd {
                feature_index: 0,
                point_index: 0,
                original_position: from,
                final_position: from,
                outcome: DragOutcome::Aborted,
            }
        );

        // The owner's last heartbeat was six minutes ago
        let room = f.coordinator.rooms.get(f.route_id).unwrap();
        room.sessions().join(f.owner.user_id, "owner", now - TimeDelta::minutes(6));
        let members = f.coordinator.active_members(f.route_id);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, f.guest.user_id);
        assert_eq!(room.hub().subscriber_count(), 2);
        drop(room);

        assert_eq!(f.coordinator.sweep_sessions(now), 1);
        let left = guest_view.recv().await.unwrap();
        assert_eq!(left.user_id, f.owner.user_id);
        assert_eq!(
            left.event,
            BroadcastEvent::MemberLeft {
                reason: LeaveReason::Expired
            }
        );

        drop(guest_view);
        drop(owner_view);
        assert_eq!(f.coordinator.sweep_sessions(now + TimeDelta::minutes(6)), 1);
        assert_eq!(f.coordinator.stats().rooms, 0);
    }

    #[tokio::test]
    async fn drags_on_other_features_are_rejected() {
        let f = fixture();
        f.coordinator.join(f.route_id, &f.owner, None).await.unwrap();
        f.coordinator.join(f.route_id, &f.guest, None).await.unwrap();
        let at = Coordinate::new(1.0, 1.0);
        f.coordinator
            .begin_drag(f.route_id, f.owner.user_id, PointKey::new(0, 1), at)
            .unwrap();

        let other = PointKey::new(7, 1);
        assert!(matches!(
            f.coordinator.begin_drag(f.route_id, f.guest.user_id, other, at),
            Err(CoordError::InvalidRequest(_))
        ));
        assert!(matches!(
            f.coordinator
                .update_drag(f.route_id, f.guest.user_id, other, at, Coordinate::new(5.0, 5.0)),
            Err(CoordError::InvalidRequest(_))
        ));
        let change = CreatePointChangeRequest {
            feature_index: 7,
            point_index: 1,
            original_position: at,
            new_position: Coordinate::new(5.0, 5.0),
        };
        let err = f
            .coordinator
            .submit_point_change(f.route_id, &f.guest, change)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::InvalidRequest(_)));
        assert!(f.coordinator.list_point_changes(f.route_id, None).await.unwrap().is_empty());
        assert_eq!(f.coordinator.stats().drag_locks, 1);
    }

    #[tokio::test]
    async fn structural_edit_releases_shifted_locks() {
        let f = fixture();
        f.coordinator.join(f.route_id, &f.owner, None).await.unwrap();
        f.coordinator.join(f.route_id, &f.guest, None).await.unwrap();
        f.coordinator
            .begin_drag(f.route_id, f.guest.user_id, PointKey::new(0, 2), Coordinate::new(2.0, 2.0))
            .unwrap();
        f.coordinator
            .begin_drag(f.route_id, f.guest.user_id, PointKey::new(0, 0), Coordinate::new(0.0, 0.0))
            .unwrap();

        let version = f.coordinator.remove_control_point(f.route_id, &f.owner, 1).await.unwrap();
        assert_eq!(version.control_points.len(), 2);
        assert_eq!(f.coordinator.stats().drag_locks, 1);

        let err = f.coordinator.remove_control_point(f.route_id, &f.guest, 0).await.unwrap_err();
        assert!(matches!(err, CoordError::Unauthorized(_)));
    }
}
