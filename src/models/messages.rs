use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Coordinate, EditingSession, PointChangeOutcome, PointChangeProposal, RouteVersion};

/// How a drag ended, as seen by observers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DragOutcome {
    Applied { version_id: Uuid },
    Proposed { proposal_id: Uuid },
    Aborted,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    Left,
    Expired,
}

/// Ephemeral event fanned out to the other members of a route
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    CursorMove {
        position: Coordinate,
    },
    DragStart {
        feature_index: u32,
        point_index: u32,
        original_position: Coordinate,
    },
    DragUpdate {
        feature_index: u32,
        point_index: u32,
        original_position: Coordinate,
        current_position: Coordinate,
    },
    DragEnd {
        feature_index: u32,
        point_index: u32,
        original_position: Coordinate,
        final_position: Coordinate,
        outcome: DragOutcome,
    },
    MemberJoined {
        session: EditingSession,
    },
    MemberLeft {
        reason: LeaveReason,
    },
    ProposalCreated {
        proposal: PointChangeProposal,
    },
    ProposalResolved {
        proposal: PointChangeProposal,
    },
    RouteUpdated {
        version: RouteVersion,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BroadcastMessage {
    #[serde(flatten)]
    pub event: BroadcastEvent,
    pub user_id: Uuid,
    pub user_display: String,
    pub sent_at: DateTime<Utc>,
}

impl BroadcastMessage {
    pub fn new(user_id: Uuid, user_display: &str, event: BroadcastEvent) -> Self {
        Self {
            event,
            user_id,
            user_display: user_display.to_string(),
            sent_at: Utc::now(),
        }
    }
}

/// Messages received from a client on the route channel
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CursorMove {
        position: Coordinate,
    },
    DragStart {
        feature_index: u32,
        point_index: u32,
        position: Coordinate,
    },
    DragUpdate {
        feature_index: u32,
        point_index: u32,
        original_position: Coordinate,
        position: Coordinate,
    },
    DragEnd {
        feature_index: u32,
        point_index: u32,
        original_position: Coordinate,
        new_position: Coordinate,
    },
    DragAbort {
        feature_index: u32,
        point_index: u32,
    },
    Ping,
}

/// Messages sent directly to one client on the route channel
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong {
        date: String,
    },
    DragRejected {
        feature_index: u32,
        point_index: u32,
        holder: Uuid,
    },
    DragResult {
        feature_index: u32,
        point_index: u32,
        result: PointChangeOutcome,
    },
    Error {
        kind: String,
        error: String,
    },
    SessionExpired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_message_is_flat() {
        let msg = BroadcastMessage::new(
            Uuid::nil(),
            "ana",
            BroadcastEvent::CursorMove { position: Coordinate::new(3.0, 4.0) },
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "cursor_move");
        assert_eq!(json["user_display"], "ana");
        assert_eq!(json["position"]["lat"], 4.0);
    }

    #[test]
    fn parses_client_drag_messages() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"drag_update","feature_index":0,"point_index":2,"original_position":[1,1],"position":{"lng":1.5,"lat":1.0}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::DragUpdate {
                feature_index: 0,
                point_index: 2,
                original_position: Coordinate::new(1.0, 1.0),
                position: Coordinate::new(1.5, 1.0),
            }
        );
        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientMessage::Ping);
    }
}
