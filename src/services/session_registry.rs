use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::EditingSession;

/// Editing sessions of a single route, keyed by user.
///
/// Staleness is evaluated against the `now` passed in by the caller, so reads
/// exclude expired sessions even before the sweep has removed them.
#[derive(Debug)]
pub struct SessionRegistry {
    route_id: Uuid,
    stale_after: TimeDelta,
    sessions: HashMap<Uuid, EditingSession>,
}

impl SessionRegistry {
    pub fn new(route_id: Uuid, stale_after: TimeDelta) -> Self {
        Self {
            route_id,
            stale_after,
            sessions: HashMap::new(),
        }
    }

    fn is_stale(&self, session: &EditingSession, now: DateTime<Utc>) -> bool {
        now - session.last_heartbeat > self.stale_after
    }

    /// Create or replace the user's session.
    ///
    /// Returns the new session and the other active members.
    pub fn join(&mut self, user_id: Uuid, user_display: &str, now: DateTime<Utc>) -> (EditingSession, Vec<EditingSession>) {
        let session = EditingSession {
            id: Uuid::new_v4(),
            route_id: self.route_id,
            user_id,
            user_display: user_display.to_string(),
            started_at: now,
            last_heartbeat: now,
        };
        self.sessions.insert(user_id, session.clone());

        let others = self
            .active(now)
            .into_iter()
            .filter(|s| s.user_id != user_id)
            .collect();
        (session, others)
    }

    /// Refresh the user's heartbeat. A stale session counts as absent.
    pub fn heartbeat(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Option<EditingSession> {
        let stale_after = self.stale_after;
        let session = self.sessions.get_mut(&user_id)?;
        if now - session.last_heartbeat > stale_after {
            return None;
        }
        session.last_heartbeat = now;
        Some(session.clone())
    }

    pub fn leave(&mut self, user_id: Uuid) -> Option<EditingSession> {
        self.sessions.remove(&user_id)
    }

    pub fn get_active(&self, user_id: Uuid, now: DateTime<Utc>) -> Option<&EditingSession> {
        self.sessions
            .get(&user_id)
            .filter(|session| !self.is_stale(session, now))
    }

    /// Active sessions ordered by join time
    pub fn active(&self, now: DateTime<Utc>) -> Vec<EditingSession> {
        let mut active: Vec<EditingSession> = self
            .sessions
            .values()
            .filter(|session| !self.is_stale(session, now))
            .cloned()
            .collect();
        active.sort_by_key(|session| session.started_at);
        active
    }

    /// Remove and return every stale session
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> Vec<EditingSession> {
        let stale: Vec<Uuid> = self
            .sessions
            .values()
            .filter(|session| self.is_stale(session, now))
            .map(|session| session.user_id)
            .collect();
        stale
            .into_iter()
            .filter_map(|user_id| self.sessions.remove(&user_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
