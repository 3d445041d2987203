//! Per-route fan-out of ephemeral messages.
//!
//! One tokio broadcast channel per route keeps messages ordered per sender.
//! Every member receives through its own bounded view of the channel: a member
//! that falls `capacity` messages behind loses the oldest ones instead of
//! slowing the publisher down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::BroadcastMessage;

#[derive(Debug)]
struct HubEnvelope {
    /// Member that published the message; `None` for system notices
    origin: Option<Uuid>,
    message: BroadcastMessage,
}

#[derive(Debug, Default)]
struct HubCounters {
    sent: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub subscribers: usize,
}

#[derive(Debug)]
pub struct BroadcastHub {
    sender: broadcast::Sender<Arc<HubEnvelope>>,
    counters: Arc<HubCounters>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            counters: Arc::new(HubCounters::default()),
        }
    }

    /// Publish to every subscriber except `origin`.
    ///
    /// Never blocks and never fails; returns the number of subscribers the
    /// message was queued for (including the sender's own, which skips it).
    pub fn publish(&self, origin: Option<Uuid>, message: BroadcastMessage) -> usize {
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        let envelope = Arc::new(HubEnvelope { origin, message });
        // No subscribers is fine: nobody is listening, nothing to deliver
        self.sender.send(envelope).unwrap_or(0)
    }

    pub fn subscribe(&self, member: Uuid) -> HubSubscription {
        HubSubscription {
            member,
            receiver: self.sender.subscribe(),
            counters: self.counters.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            messages_sent: self.counters.sent.load(Ordering::Relaxed),
            messages_dropped: self.counters.dropped.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

/// One member's view of a route hub
#[derive(Debug)]
pub struct HubSubscription {
    member: Uuid,
    receiver: broadcast::Receiver<Arc<HubEnvelope>>,
    counters: Arc<HubCounters>,
}

impl HubSubscription {
    pub fn member(&self) -> Uuid {
        self.member
    }

    /// Next message not published by this member, or `None` once the hub is gone
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => {
                    if envelope.origin == Some(self.member) {
                        continue;
                    }
                    return Some(envelope.message.clone());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Member {} lagged behind, dropped {} oldest messages", self.member, skipped);
                    self.counters.dropped.fetch_add(skipped, Ordering::Relaxed);
                }
                Err(RecvError::Closed) => {
                    debug!("Hub closed for member {}", self.member);
                    return None;
                }
            }
        }
    }
}
