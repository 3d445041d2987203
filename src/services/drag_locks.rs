use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::models::Coordinate;

/// Addresses one control point within a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointKey {
    pub feature_index: u32,
    pub point_index: u32,
}

impl PointKey {
    pub fn new(feature_index: u32, point_index: u32) -> Self {
        Self { feature_index, point_index }
    }
}

/// Soft claim on a point while it is being dragged. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DragLock {
    pub user_id: Uuid,
    pub user_display: String,
    pub started_at: DateTime<Utc>,
    pub last_touched: DateTime<Utc>,
    /// Position of the point when the drag started, used for aborts
    pub original_position: Coordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TryLock {
    Locked,
    AlreadyLocked { holder: Uuid },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LockError {
    /// The caller does not hold the lock; `holder` is the live holder, if any
    NotHolder { holder: Option<Uuid> },
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::NotHolder { holder: Some(holder) } => write!(f, "Point is locked by {}", holder),
            LockError::NotHolder { holder: None } => write!(f, "Point is not locked"),
        }
    }
}

impl std::error::Error for LockError {}

/// Drag locks of a single route.
///
/// Expired locks are treated as absent by every operation and physically
/// removed by `expire`.
#[derive(Debug)]
pub struct DragLockTable {
    ttl: TimeDelta,
    locks: HashMap<PointKey, DragLock>,
}

impl DragLockTable {
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            locks: HashMap::new(),
        }
    }

    fn is_live(&self, lock: &DragLock, now: DateTime<Utc>) -> bool {
        now - lock.last_touched <= self.ttl
    }

    /// Live lock on the point, if any
    pub fn holder(&self, key: PointKey, now: DateTime<Utc>) -> Option<&DragLock> {
        self.locks.get(&key).filter(|lock| self.is_live(lock, now))
    }

    /// Claim the point. Re-locking by the current holder refreshes the lock.
    pub fn try_lock(
        &mut self,
        key: PointKey,
        user_id: Uuid,
        user_display: &str,
        original_position: Coordinate,
        now: DateTime<Utc>,
    ) -> TryLock {
        if let Some(existing) = self.holder(key, now) {
            if existing.user_id != user_id {
                return TryLock::AlreadyLocked { holder: existing.user_id };
            }
        }
        self.locks.insert(key, DragLock {
            user_id,
            user_display: user_display.to_string(),
            started_at: now,
            last_touched: now,
            original_position,
        });
        TryLock::Locked
    }

    /// Record drag activity by the holder
    pub fn touch(&mut self, key: PointKey, user_id: Uuid, now: DateTime<Utc>) -> Result<(), LockError> {
        let holder = self.holder(key, now).map(|lock| lock.user_id);
        match holder {
            Some(holder) if holder == user_id => {
                if let Some(lock) = self.locks.get_mut(&key) {
                    lock.last_touched = now;
                }
                Ok(())
            }
            holder => Err(LockError::NotHolder { holder }),
        }
    }

    /// Release the caller's lock and return it
    pub fn unlock(&mut self, key: PointKey, user_id: Uuid, now: DateTime<Utc>) -> Result<DragLock, LockError> {
        let holder = self.holder(key, now).map(|lock| lock.user_id);
        match holder {
            Some(holder) if holder == user_id => self
                .locks
                .remove(&key)
                .ok_or(LockError::NotHolder { holder: None }),
            holder => Err(LockError::NotHolder { holder }),
        }
    }

    /// Release every lock held by the user (disconnect / leave / eviction)
    pub fn release_user(&mut self, user_id: Uuid) -> Vec<(PointKey, DragLock)> {
        self.drain_where(|_, lock| lock.user_id == user_id)
    }

    /// Release every lock on points at or after `point_index`, whose indices
    /// shift when a point is inserted or removed before them
    pub fn release_from(&mut self, point_index: u32) -> Vec<(PointKey, DragLock)> {
        self.drain_where(|key, _| key.point_index >= point_index)
    }

    /// Remove and return every lock untouched for longer than the TTL
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<(PointKey, DragLock)> {
        let ttl = self.ttl;
        self.drain_where(|_, lock| now - lock.last_touched > ttl)
    }

    fn drain_where(&mut self, pred: impl Fn(&PointKey, &DragLock) -> bool) -> Vec<(PointKey, DragLock)> {
        let keys: Vec<PointKey> = self
            .locks
            .iter()
            .filter(|(key, lock)| pred(key, lock))
            .map(|(key, _)| *key)
            .collect();
        keys.into_iter()
            .filter_map(|key| self.locks.remove(&key).map(|lock| (key, lock)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: Coordinate = Coordinate { lng: 1.0, lat: 1.0 };

    fn table() -> DragLockTable {
        DragLockTable::new(TimeDelta::seconds(30))
    }

    #[test]
    fn second_user_is_rejected_while_lock_is_live() {
        let mut locks = table();
        let key = PointKey::new(0, 1);
        let ana = Uuid::new_v4();
        let ben = Uuid::new_v4();
        let t0 = Utc::now();

        assert_eq!(locks.try_lock(key, ana, "ana", ORIGIN, t0), TryLock::Locked);
        assert_eq!(
            locks.try_lock(key, ben, "ben", ORIGIN, t0 + TimeDelta::seconds(5)),
            TryLock::AlreadyLocked { holder: ana }
        );
        // The holder may re-lock
        assert_eq!(locks.try_lock(key, ana, "ana", ORIGIN, t0 + TimeDelta::seconds(6)), TryLock::Locked);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn untouched_lock_expires_and_becomes_acquirable() {
        let mut locks = table();
        let key = PointKey::new(0, 1);
        let ana = Uuid::new_v4();
        let ben = Uuid::new_v4();
        let t0 = Utc::now();
        locks.try_lock(key, ana, "ana", ORIGIN, t0);

        let after = t0 + TimeDelta::seconds(31);
        assert!(locks.holder(key, after).is_none());
        assert_eq!(locks.try_lock(key, ben, "ben", ORIGIN, after), TryLock::Locked);
        assert_eq!(locks.holder(key, after).unwrap().user_id, ben);
    }

    #[test]
    fn touch_extends_the_window() {
        let mut locks = table();
        let key = PointKey::new(0, 0);
        let ana = Uuid::new_v4();
        let t0 = Utc::now();
        locks.try_lock(key, ana, "ana", ORIGIN, t0);
        locks.touch(key, ana, t0 + TimeDelta::seconds(20)).unwrap();

        assert!(locks.holder(key, t0 + TimeDelta::seconds(45)).is_some());
        assert!(locks.expire(t0 + TimeDelta::seconds(45)).is_empty());
        assert_eq!(locks.expire(t0 + TimeDelta::seconds(51)).len(), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn only_the_holder_can_unlock() {
        let mut locks = table();
        let key = PointKey::new(0, 2);
        let ana = Uuid::new_v4();
        let ben = Uuid::new_v4();
        let t0 = Utc::now();
        locks.try_lock(key, ana, "ana", ORIGIN, t0);

        assert_eq!(
            locks.unlock(key, ben, t0),
            Err(LockError::NotHolder { holder: Some(ana) })
        );
        let released = locks.unlock(key, ana, t0).unwrap();
        assert_eq!(released.original_position, ORIGIN);
        assert_eq!(locks.unlock(key, ana, t0), Err(LockError::NotHolder { holder: None }));
    }

    #[test]
    fn release_user_and_release_from() {
        let mut locks = table();
        let ana = Uuid::new_v4();
        let ben = Uuid::new_v4();
        let t0 = Utc::now();
        locks.try_lock(PointKey::new(0, 0), ana, "ana", ORIGIN, t0);
        locks.try_lock(PointKey::new(0, 3), ana, "ana", ORIGIN, t0);
        locks.try_lock(PointKey::new(0, 5), ben, "ben", ORIGIN, t0);

        assert_eq!(locks.release_from(3).len(), 2);
        assert_eq!(locks.release_user(ana).len(), 1);
        assert!(locks.is_empty());
    }
}
