use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::services::coordinator::Coordinator;

#[derive(Debug, Clone, Copy)]
pub struct SweepIntervals {
    pub sessions: Duration,
    pub locks: Duration,
    pub proposals: Duration,
}

/// Run the session, lock and proposal sweeps until the task is aborted.
/// Sweep failures are logged and the loop keeps going.
pub fn spawn_sweeper(coordinator: Arc<Coordinator>, intervals: SweepIntervals) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Sweeper started (sessions every {:?}, locks every {:?}, proposals every {:?})",
            intervals.sessions, intervals.locks, intervals.proposals
        );
        let mut sessions = interval(intervals.sessions);
        let mut locks = interval(intervals.locks);
        let mut proposals = interval(intervals.proposals);
        for ticker in [&mut sessions, &mut locks, &mut proposals] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = sessions.tick() => {
                    let evicted = coordinator.sweep_sessions(Utc::now());
                    if evicted > 0 {
                        debug!("Evicted {} stale sessions", evicted);
                    }
                }
                _ = locks.tick() => {
                    let expired = coordinator.sweep_locks(Utc::now());
                    if expired > 0 {
                        debug!("Expired {} drag locks", expired);
                    }
                }
                _ = proposals.tick() => {
                    if let Err(e) = coordinator.archive_proposals(Utc::now()).await {
                        error!("Proposal archival failed: {}", e);
                    }
                }
            }
        }
    })
}
