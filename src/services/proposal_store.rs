use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use uuid::Uuid;

use crate::models::{CoordError, NewPointChange, PointChangeProposal, ProposalDecision, ProposalStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    NotFound(Uuid),
    AlreadyResolved(Uuid),
    /// Only an accepted proposal can be reopened
    NotAccepted(Uuid),
    /// The record cannot be stored as given
    Invalid(String),
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Point change {} not found", id),
            StoreError::AlreadyResolved(id) => write!(f, "Point change {} is already resolved", id),
            StoreError::NotAccepted(id) => write!(f, "Point change {} is not accepted", id),
            StoreError::Invalid(msg) => write!(f, "Invalid point change: {}", msg),
            StoreError::Backend(msg) => write!(f, "Proposal store error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for CoordError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => CoordError::NotFound(e.to_string()),
            StoreError::AlreadyResolved(id) => CoordError::AlreadyResolved(id),
            StoreError::NotAccepted(_) => CoordError::Internal(e.to_string()),
            StoreError::Invalid(msg) => CoordError::InvalidRequest(msg),
            StoreError::Backend(msg) => CoordError::Internal(msg),
        }
    }
}

/// Durable queue of point-change proposals.
///
/// `resolve` must transition pending -> accepted/rejected atomically so a
/// proposal is never resolved twice.
pub trait ProposalStore: Send + Sync {
    fn create(&self, new: NewPointChange) -> BoxFuture<'_, Result<PointChangeProposal, StoreError>>;

    fn get(&self, id: Uuid) -> BoxFuture<'_, Result<Option<PointChangeProposal>, StoreError>>;

    /// Proposals of a route, newest first. `None` lists every status.
    fn list(&self, route_id: Uuid, status: Option<ProposalStatus>) -> BoxFuture<'_, Result<Vec<PointChangeProposal>, StoreError>>;

    fn resolve(
        &self,
        id: Uuid,
        resolver: Uuid,
        decision: ProposalDecision,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<PointChangeProposal, StoreError>>;

    /// Put an accepted proposal back to pending after its move failed to persist
    fn reopen(&self, id: Uuid) -> BoxFuture<'_, Result<PointChangeProposal, StoreError>>;

    /// Delete resolved proposals resolved before `before`; returns how many
    fn archive_resolved(&self, before: DateTime<Utc>) -> BoxFuture<'_, Result<u64, StoreError>>;
}

/// In-memory store, used by tests and when no database is configured
#[derive(Debug, Default)]
pub struct MemoryProposalStore {
    proposals: RwLock<HashMap<Uuid, PointChangeProposal>>,
}

impl MemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, PointChangeProposal>> {
        self.proposals.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, PointChangeProposal>> {
        self.proposals.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl ProposalStore for MemoryProposalStore {
    fn create(&self, new: NewPointChange) -> BoxFuture<'_, Result<PointChangeProposal, StoreError>> {
        Box::pin(async move {
            let now = Utc::now();
            let proposal = PointChangeProposal {
                id: Uuid::new_v4(),
                route_id: new.route_id,
                user_id: new.user_id,
                user_display: new.user_display,
                feature_index: new.feature_index,
                point_index: new.point_index,
                original_position: new.original_position,
                new_position: new.new_position,
                status: ProposalStatus::Pending,
                created_at: now,
                updated_at: now,
                resolved_at: None,
                resolved_by: None,
            };
            self.write().insert(proposal.id, proposal.clone());
            Ok(proposal)
        })
    }

    fn get(&self, id: Uuid) -> BoxFuture<'_, Result<Option<PointChangeProposal>, StoreError>> {
        Box::pin(async move { Ok(self.read().get(&id).cloned()) })
    }

    fn list(&self, route_id: Uuid, status: Option<ProposalStatus>) -> BoxFuture<'_, Result<Vec<PointChangeProposal>, StoreError>> {
        Box::pin(async move {
            let mut proposals: Vec<PointChangeProposal> = self
                .read()
                .values()
                .filter(|p| p.route_id == route_id)
                .filter(|p| status.map_or(true, |s| p.status == s))
                .cloned()
                .collect();
            proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(proposals)
        })
    }

    fn resolve(
        &self,
        id: Uuid,
        resolver: Uuid,
        decision: ProposalDecision,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<PointChangeProposal, StoreError>> {
        Box::pin(async move {
            let mut proposals = self.write();
            let proposal = proposals.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if proposal.status != ProposalStatus::Pending {
                return Err(StoreError::AlreadyResolved(id));
            }
            proposal.status = decision.into();
            proposal.resolved_at = Some(at);
            proposal.resolved_by = Some(resolver);
            proposal.updated_at = at;
            Ok(proposal.clone())
        })
    }

    fn reopen(&self, id: Uuid) -> BoxFuture<'_, Result<PointChangeProposal, StoreError>> {
        Box::pin(async move {
            let mut proposals = self.write();
            let proposal = proposals.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if proposal.status != ProposalStatus::Accepted {
                return Err(StoreError::NotAccepted(id));
            }
            proposal.status = ProposalStatus::Pending;
            proposal.resolved_at = None;
            proposal.resolved_by = None;
            proposal.updated_at = Utc::now();
            Ok(proposal.clone())
        })
    }

    fn archive_resolved(&self, before: DateTime<Utc>) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            let mut proposals = self.write();
            let count_before = proposals.len();
            proposals.retain(|_, p| {
                p.status == ProposalStatus::Pending || p.resolved_at.map_or(true, |at| at >= before)
            });
            Ok((count_before - proposals.len()) as u64)
        })
    }
}
