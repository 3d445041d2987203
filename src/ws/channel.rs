use std::sync::Arc;
use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::models::{BroadcastEvent, ClientMessage, CoordError, CreatePointChangeRequest, ServerMessage};
use crate::services::broadcast_hub::HubSubscription;
use crate::services::coordinator::Coordinator;
use crate::services::drag_locks::PointKey;

type SharedSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

async fn send_json<T: serde::Serialize>(sender: &SharedSender, value: &T) -> bool {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize channel message: {}", e);
            return true;
        }
    };
    sender.lock().await.send(Message::Text(text)).await.is_ok()
}

fn rejection(key: PointKey, e: CoordError) -> ServerMessage {
    match e {
        CoordError::AlreadyLocked { holder } => ServerMessage::DragRejected {
            feature_index: key.feature_index,
            point_index: key.point_index,
            holder,
        },
        other => error_message(other),
    }
}

fn error_message(e: CoordError) -> ServerMessage {
    ServerMessage::Error {
        kind: e.kind().to_string(),
        error: e.to_string(),
    }
}

/// Apply one client message; returns the direct reply, if any
pub async fn handle_client_message(
    coordinator: &Coordinator,
    route_id: Uuid,
    user: &AuthUser,
    message: ClientMessage,
) -> Option<ServerMessage> {
    match message {
        ClientMessage::CursorMove { position } => coordinator
            .cursor_move(route_id, user.user_id, position)
            .err()
            .map(error_message),
        ClientMessage::DragStart {
            feature_index,
            point_index,
            position,
        } => {
            let key = PointKey::new(feature_index, point_index);
            coordinator
                .begin_drag(route_id, user.user_id, key, position)
                .err()
                .map(|e| rejection(key, e))
        }
        ClientMessage::DragUpdate {
            feature_index,
            point_index,
            original_position,
            position,
        } => {
            let key = PointKey::new(feature_index, point_index);
            coordinator
                .update_drag(route_id, user.user_id, key, original_position, position)
                .err()
                .map(|e| rejection(key, e))
        }
        ClientMessage::DragEnd {
            feature_index,
            point_index,
            original_position,
            new_position,
        } => {
            let key = PointKey::new(feature_index, point_index);
            let change = CreatePointChangeRequest {
                feature_index,
                point_index,
                original_position,
                new_position,
            };
            match coordinator.submit_point_change(route_id, user, change).await {
                Ok(result) => Some(ServerMessage::DragResult {
                    feature_index,
                    point_index,
                    result,
                }),
                Err(e) => Some(rejection(key, e)),
            }
        }
        ClientMessage::DragAbort {
            feature_index,
            point_index,
        } => {
            let key = PointKey::new(feature_index, point_index);
            coordinator
                .abort_drag(route_id, user.user_id, key)
                .err()
                .map(|e| rejection(key, e))
        }
        ClientMessage::Ping => Some(ServerMessage::Pong {
            date: Utc::now().to_rfc3339(),
        }),
    }
}

/// Serve one channel connection until either side goes away
pub async fn handle_socket(
    socket: WebSocket,
    coordinator: Arc<Coordinator>,
    route_id: Uuid,
    user: AuthUser,
    mut subscription: HubSubscription,
) {
    let user_id = user.user_id;
    info!("Channel established for user {} on route {}", user_id, route_id);

    // Split the socket; both tasks need the sender
    let (sender, mut receiver) = socket.split();
    let sender1: SharedSender = Arc::new(Mutex::new(sender));
    let sender2 = sender1.clone();

    // Broadcasts of the route, forwarded to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            let own_departure = message.user_id == user_id && matches!(message.event, BroadcastEvent::MemberLeft { .. });
            if own_departure {
                send_json(&sender2, &ServerMessage::SessionExpired).await;
                break;
            }
            if !send_json(&sender2, &message).await {
                break;
            }
        }
    });

    // Client messages
    let recv_coordinator = coordinator.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    debug!("Channel message from {} on route {}: {:?}", user.user_id, route_id, message);
                    handle_client_message(&recv_coordinator, route_id, &user, message).await
                }
                Err(e) => {
                    warn!("Failed to parse channel message from {}: {}", user.user_id, e);
                    Some(error_message(CoordError::InvalidRequest(format!("Invalid message: {}", e))))
                }
            };

            if let Some(reply) = reply {
                if !send_json(&sender1, &reply).await {
                    break;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    coordinator.disconnect(route_id, user_id);
    info!("Channel terminated for user {} on route {}", user_id, route_id);
}
