use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ProposalStatus::Pending),
            "accepted" => Some(ProposalStatus::Accepted),
            "rejected" => Some(ProposalStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The owner's decision on a pending point change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProposalDecision {
    Accepted,
    Rejected,
}

impl From<ProposalDecision> for ProposalStatus {
    fn from(decision: ProposalDecision) -> Self {
        match decision {
            ProposalDecision::Accepted => ProposalStatus::Accepted,
            ProposalDecision::Rejected => ProposalStatus::Rejected,
        }
    }
}

/// A durable suggestion to move one control point, awaiting the owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PointChangeProposal {
    pub id: Uuid,
    pub route_id: Uuid,
    pub user_id: Uuid,
    pub user_display: String,
    pub feature_index: u32,
    pub point_index: u32,
    pub original_position: Coordinate,
    pub new_position: Coordinate,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
}

/// Input for creating a proposal in a store
#[derive(Debug, Clone)]
pub struct NewPointChange {
    pub route_id: Uuid,
    pub user_id: Uuid,
    pub user_display: String,
    pub feature_index: u32,
    pub point_index: u32,
    pub original_position: Coordinate,
    pub new_position: Coordinate,
}

/// Request body for submitting a point move
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePointChangeRequest {
    pub feature_index: u32,
    pub point_index: u32,
    pub original_position: Coordinate,
    pub new_position: Coordinate,
}

/// Request body for accepting or rejecting a proposal
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdatePointChangeStatusRequest {
    pub status: ProposalDecision,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPointChangesQuery {
    pub status: Option<ProposalStatus>,
}

/// A persisted version of a route's control points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteVersion {
    pub route_id: Uuid,
    pub version_id: Uuid,
    pub control_points: Vec<Coordinate>,
    /// Who wrote the version (always the owner)
    pub applied_by: Uuid,
    /// The proposer whose suggestion this version applies, if any
    pub contributor: Option<Uuid>,
}

/// Result of submitting a point move: applied directly or queued as a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum PointChangeOutcome {
    Applied { route_version: RouteVersion },
    Proposed { proposal: PointChangeProposal },
}
