use crate::bus::{Change, DocumentKey};
use crate::state::AppState;
use crate::types::RoomPhase;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawn a task that reconciles one participant document on every room change.
/// Ends once the room is finished; the owning session aborts it on disconnect.
pub fn spawn_participant_sync(
    state: Arc<AppState>,
    room_id: String,
    participant_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = state.bus.subscribe(&DocumentKey::Room(room_id.clone())).await;

        // Catch up with anything committed before the subscription existed
        if let Err(e) = state.sync_participant(&participant_id).await {
            tracing::debug!("Initial sync of {} skipped: {}", participant_id, e);
        }

        loop {
            let finished = match rx.recv().await {
                Ok(Change::Room(room)) => room.phase == RoomPhase::Finished,
                Ok(Change::Participant(_)) => false,
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!("Sync of {} lagged by {} room changes", participant_id, n);
                    false
                }
                Err(RecvError::Closed) => true,
            };
            if finished {
                break;
            }

            match state.sync_participant(&participant_id).await {
                Ok(true) => tracing::debug!("Reconciled {} against room {}", participant_id, room_id),
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!("Sync of {} stopped: {}", participant_id, e);
                    break;
                }
            }
        }
    })
}

/// Spawn the polling fallback: periodically reconcile every participant of every
/// live room, catching anything a missed notification left behind.
pub fn spawn_reconcile_poller(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.reconcile_poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let live: Vec<String> = state
                .rooms
                .read()
                .await
                .values()
                .filter(|r| r.phase == RoomPhase::Playing)
                .map(|r| r.id.clone())
                .collect();

            for room_id in live {
                let synced = state.sync_room_participants(&room_id).await;
                if synced > 0 {
                    tracing::debug!("Poller reconciled {} participants in room {}", synced, room_id);
                }
            }

            state.bus.prune().await;
        }
    })
}
