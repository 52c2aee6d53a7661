mod arbiter;
pub mod export;
mod participant;
mod room;

pub use room::DrawOutcome;

use crate::bus::ChangeBus;
use crate::config::GameConfig;
use crate::error::{GameError, GameResult};
use crate::inventory::TermInventory;
use crate::timer::QuestionCycleTimer;
use crate::tracker::ParticipantTracker;
use crate::types::*;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state: the authoritative document store for every room
///
/// Lock order is always `rooms` before `participants` before `join_codes`.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
    pub participants: Arc<RwLock<HashMap<ParticipantId, Participant>>>,
    /// Upper-cased join code -> room
    pub join_codes: Arc<RwLock<HashMap<String, RoomId>>>,
    pub inventory: Arc<TermInventory>,
    pub config: GameConfig,
    pub tracker: ParticipantTracker,
    /// Notification channel for committed document versions
    pub bus: ChangeBus,
}

impl AppState {
    pub fn new(inventory: TermInventory, config: GameConfig) -> Self {
        let tracker = ParticipantTracker::new(QuestionCycleTimer::new(config.question_seconds));
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            participants: Arc::new(RwLock::new(HashMap::new())),
            join_codes: Arc::new(RwLock::new(HashMap::new())),
            inventory: Arc::new(inventory),
            config,
            tracker,
            bus: ChangeBus::new(),
        }
    }

    pub fn timer(&self) -> &QuestionCycleTimer {
        self.tracker.timer()
    }

    pub async fn get_room(&self, room_id: &str) -> Option<Room> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Case-insensitive join code lookup
    pub async fn find_room_by_code(&self, code: &str) -> Option<Room> {
        let room_id = self
            .join_codes
            .read()
            .await
            .get(&normalize_code(code))
            .cloned()?;
        self.get_room(&room_id).await
    }

    pub async fn get_participant(&self, participant_id: &str) -> Option<Participant> {
        self.participants.read().await.get(participant_id).cloned()
    }

    /// Participants of a room, in join order
    pub async fn list_participants(&self, room_id: &str) -> Vec<Participant> {
        let mut list: Vec<Participant> = self
            .participants
            .read()
            .await
            .values()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub async fn participant_count(&self, room_id: &str) -> usize {
        self.participants
            .read()
            .await
            .values()
            .filter(|p| p.room_id == room_id)
            .count()
    }

    /// Conditional update of one room document.
    ///
    /// `f` runs on a copy while the write lock is held; the copy is committed
    /// (version bumped, change published) only if `f` returns `Ok`. Finished
    /// rooms are immutable; a commit that finishes the room first settles
    /// every participant against the final room document.
    pub(crate) async fn update_room<T>(
        &self,
        room_id: &str,
        f: impl FnOnce(&mut Room) -> GameResult<T>,
    ) -> GameResult<(Room, T)> {
        let committed = {
            let mut rooms = self.rooms.write().await;
            let current = rooms
                .get(room_id)
                .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))?;
            if current.phase == RoomPhase::Finished {
                return Err(GameError::invalid("Room is finished"));
            }

            let mut draft = current.clone();
            let out = f(&mut draft)?;
            draft.version += 1;
            draft.updated_at = Utc::now();

            let settled = if draft.phase == RoomPhase::Finished {
                let mut participants = self.participants.write().await;
                settle_participants(&self.tracker, &mut participants, &draft)
            } else {
                Vec::new()
            };
            rooms.insert(room_id.to_string(), draft.clone());
            (draft, out, settled)
        };

        let (room, out, settled) = committed;
        for participant in &settled {
            self.bus.publish_participant(participant).await;
        }
        self.bus.publish_room(&room).await;
        Ok((room, out))
    }

    /// Conditional update of one participant document, given the current room.
    ///
    /// The room is read under its lock first so `f` always validates against
    /// the latest authoritative version. `Ok(false)` from `f` means nothing
    /// changed and no write happens. Participants are frozen once their room
    /// is finished.
    pub(crate) async fn update_participant<T>(
        &self,
        participant_id: &str,
        f: impl FnOnce(&mut Participant, &Room) -> GameResult<(bool, T)>,
    ) -> GameResult<(Participant, T)> {
        let (committed, out, changed) = {
            let rooms = self.rooms.read().await;
            let mut participants = self.participants.write().await;
            let current = participants
                .get(participant_id)
                .ok_or_else(|| GameError::ParticipantNotFound(participant_id.to_string()))?;
            let room = rooms
                .get(&current.room_id)
                .ok_or_else(|| GameError::RoomNotFound(current.room_id.clone()))?;
            if room.phase == RoomPhase::Finished {
                return Err(GameError::invalid("Room is finished"));
            }

            let mut draft = current.clone();
            let (changed, out) = f(&mut draft, room)?;
            if changed {
                draft.version += 1;
                draft.updated_at = Utc::now();
                participants.insert(participant_id.to_string(), draft.clone());
            }
            (draft, out, changed)
        };

        if changed {
            self.bus.publish_participant(&committed).await;
        }
        Ok((committed, out))
    }
}

impl Default for AppState {
    /// Built-in catalog with default settings
    fn default() -> Self {
        Self::new(TermInventory::builtin(), GameConfig::default())
    }
}

/// Reconcile every participant of `room` in place and return the documents
/// that changed. Used right before a room is committed as finished, since
/// participant documents are frozen afterwards.
pub(crate) fn settle_participants(
    tracker: &ParticipantTracker,
    participants: &mut HashMap<ParticipantId, Participant>,
    room: &Room,
) -> Vec<Participant> {
    let now = Utc::now();
    let mut settled = Vec::new();
    for participant in participants.values_mut().filter(|p| p.room_id == room.id) {
        if tracker.reconcile(participant, room) {
            participant.version += 1;
            participant.updated_at = now;
            settled.push(participant.clone());
        }
    }
    settled
}

pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
