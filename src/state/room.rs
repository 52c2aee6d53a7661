use super::{normalize_code, AppState};
use crate::error::{GameError, GameResult};
use crate::types::*;
use chrono::Utc;
use rand::seq::IndexedRandom;
use rand::Rng;

const JOIN_CODE_LEN: usize = 6;
const JOIN_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Result of `draw_question`
#[derive(Debug, Clone)]
pub enum DrawOutcome {
    /// A new question is open on the returned room
    Question(Room),
    /// Every term has been asked; the returned room is finished
    Exhausted(Room),
}

impl DrawOutcome {
    pub fn room(&self) -> &Room {
        match self {
            DrawOutcome::Question(room) | DrawOutcome::Exhausted(room) => room,
        }
    }
}

fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_CHARSET[rng.random_range(0..JOIN_CODE_CHARSET.len())] as char)
        .collect()
}

impl AppState {
    /// Create a room in the Waiting phase with a fresh join code
    pub async fn create_room(&self, host_name: &str) -> GameResult<Room> {
        let host_name = host_name.trim();
        if host_name.is_empty() {
            return Err(GameError::InvalidInput("Host name is required".to_string()));
        }
        self.inventory.ensure_playable()?;

        let mut rooms = self.rooms.write().await;
        let mut codes = self.join_codes.write().await;

        let mut join_code = generate_join_code();
        while codes.contains_key(&join_code) {
            join_code = generate_join_code();
        }

        let now = Utc::now();
        let room = Room {
            id: ulid::Ulid::new().to_string(),
            join_code: join_code.clone(),
            host_name: host_name.to_string(),
            version: 1,
            phase: RoomPhase::Waiting,
            active_question: None,
            answer_revealed: false,
            question_started_at: None,
            question_seq: 0,
            resolved_terms: Vec::new(),
            winner_count: 0,
            winner_id: None,
            created_at: now,
            updated_at: now,
        };

        codes.insert(normalize_code(&join_code), room.id.clone());
        rooms.insert(room.id.clone(), room.clone());

        tracing::info!("Created room {} (code {}) for {}", room.id, join_code, host_name);
        Ok(room)
    }

    /// Waiting -> Playing; needs at least one participant
    pub async fn start(&self, room_id: &str) -> GameResult<Room> {
        // Participants are never removed, so a positive count cannot go stale
        let joined = self.participant_count(room_id).await;

        let (room, ()) = self
            .update_room(room_id, |room| {
                if room.phase != RoomPhase::Waiting {
                    return Err(GameError::invalid("Room has already started"));
                }
                if joined == 0 {
                    return Err(GameError::invalid("No participants have joined"));
                }
                room.phase = RoomPhase::Playing;
                Ok(())
            })
            .await?;

        tracing::info!("Room {} started with {} participants", room_id, joined);
        Ok(room)
    }

    /// Open the next question, or finish the room once every term has been asked
    pub async fn draw_question(&self, room_id: &str) -> GameResult<DrawOutcome> {
        let inventory = &self.inventory;
        let (room, exhausted) = self
            .update_room(room_id, |room| {
                if room.phase != RoomPhase::Playing {
                    return Err(GameError::invalid("Room is not playing"));
                }
                if room.has_open_question() {
                    return Err(GameError::invalid("Current question has not been revealed"));
                }

                let candidates: Vec<_> = inventory.unresolved(&room.resolved_terms).collect();
                let Some(record) = candidates.choose(&mut rand::rng()) else {
                    room.phase = RoomPhase::Finished;
                    return Ok(true);
                };

                room.active_question = Some(ActiveQuestion {
                    prompt_text: record.prompt_text.clone(),
                    answer_term: record.term.clone(),
                    category: record.category.clone(),
                });
                room.answer_revealed = false;
                room.question_started_at = Some(Utc::now());
                room.question_seq += 1;
                Ok(false)
            })
            .await?;

        if exhausted {
            tracing::info!("Room {} exhausted its inventory, game finished", room_id);
            return Ok(DrawOutcome::Exhausted(room));
        }

        tracing::info!("Room {} drew question #{}", room_id, room.question_seq);
        Ok(DrawOutcome::Question(room))
    }

    /// Publish the open question's answer, locking its term for everybody
    pub async fn reveal_answer(&self, room_id: &str) -> GameResult<Room> {
        let (room, term) = self
            .update_room(room_id, |room| {
                if room.answer_revealed {
                    return Err(GameError::invalid("Answer already revealed"));
                }
                let term = room
                    .active_question
                    .as_ref()
                    .map(|q| q.answer_term.clone())
                    .ok_or_else(|| GameError::invalid("No active question"))?;

                if !room.is_resolved(&term) {
                    room.resolved_terms.push(term.clone());
                }
                room.answer_revealed = true;
                Ok(term)
            })
            .await?;

        tracing::info!("Room {} revealed '{}'", room_id, term);
        Ok(room)
    }

    /// Moderator-forced end
    pub async fn finish(&self, room_id: &str) -> GameResult<Room> {
        let (room, ()) = self
            .update_room(room_id, |room| {
                room.phase = RoomPhase::Finished;
                Ok(())
            })
            .await?;

        tracing::info!("Room {} finished by moderator", room_id);
        Ok(room)
    }

    /// Reconcile every participant of a room against the current room document
    pub async fn sync_room_participants(&self, room_id: &str) -> usize {
        let mut synced = 0;
        for participant in self.list_participants(room_id).await {
            match self.sync_participant(&participant.id).await {
                Ok(true) => synced += 1,
                Ok(false) => {}
                Err(e) => tracing::debug!("Skipped sync of {}: {}", participant.id, e),
            }
        }
        synced
    }
}
