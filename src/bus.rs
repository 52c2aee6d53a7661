use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::types::{Participant, ParticipantId, Room, RoomId};

/// Per-channel buffer; slow subscribers lag and catch up from the next version
const CHANNEL_CAPACITY: usize = 100;

/// Key of a notification channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    Room(RoomId),
    Participant(ParticipantId),
    /// Every participant document of a room (the moderator's view)
    Roster(RoomId),
}

/// A committed document version
#[derive(Debug, Clone)]
pub enum Change {
    Room(Room),
    Participant(Participant),
}

impl Change {
    pub fn version(&self) -> u64 {
        match self {
            Change::Room(r) => r.version,
            Change::Participant(p) => p.version,
        }
    }

    /// Channel identity of the document itself (not the roster alias)
    pub fn key(&self) -> DocumentKey {
        match self {
            Change::Room(r) => DocumentKey::Room(r.id.clone()),
            Change::Participant(p) => DocumentKey::Participant(p.id.clone()),
        }
    }
}

/// Publish/subscribe for committed document versions, keyed by document id
#[derive(Debug, Clone, Default)]
pub struct ChangeBus {
    channels: Arc<RwLock<HashMap<DocumentKey, broadcast::Sender<Change>>>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender(&self, key: &DocumentKey) -> broadcast::Sender<Change> {
        if let Some(sender) = self.channels.read().await.get(key) {
            return sender.clone();
        }

        let mut channels = self.channels.write().await;
        channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// The receiver is attached under the write lock so `prune` never sees it unregistered
    pub async fn subscribe(&self, key: &DocumentKey) -> broadcast::Receiver<Change> {
        let mut channels = self.channels.write().await;
        channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub async fn publish(&self, key: &DocumentKey, change: Change) {
        let sender = self.sender(key).await;
        match sender.send(change) {
            Ok(receivers) => debug!(?key, receivers, "Change published"),
            Err(_) => debug!(?key, "Change published with no receivers"),
        }
    }

    pub async fn publish_room(&self, room: &Room) {
        self.publish(&DocumentKey::Room(room.id.clone()), Change::Room(room.clone()))
            .await;
    }

    /// Goes to the participant's own channel and to its room's roster
    pub async fn publish_participant(&self, participant: &Participant) {
        let change = Change::Participant(participant.clone());
        self.publish(&DocumentKey::Participant(participant.id.clone()), change.clone())
            .await;
        self.publish(&DocumentKey::Roster(participant.room_id.clone()), change)
            .await;
    }

    /// Drop channels nobody listens to any more
    pub async fn prune(&self) {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        if channels.len() != before {
            debug!(removed = before - channels.len(), "Pruned idle change channels");
        }
    }
}
