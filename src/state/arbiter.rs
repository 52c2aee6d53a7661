use super::{settle_participants, AppState};
use crate::bingo::BingoDetector;
use crate::error::{GameError, GameResult};
use crate::types::*;
use chrono::Utc;

impl AppState {
    /// Raise a win claim for moderator review
    pub async fn claim_bingo(&self, participant_id: &str) -> GameResult<Participant> {
        let tracker = self.tracker;
        let (participant, ()) = self
            .update_participant(participant_id, |p, room| {
                tracker.reconcile(p, room);

                if room.phase != RoomPhase::Playing {
                    return Err(GameError::invalid("Room is not playing"));
                }
                if p.bingo_claimed {
                    return Err(GameError::invalid("Claim already pending"));
                }
                if p.claim_cycle == Some(room.question_seq) {
                    return Err(GameError::invalid("Already claimed this question"));
                }
                if !BingoDetector::participant_has_bingo(p, &room.resolved_terms) {
                    return Err(GameError::invalid("No completed line"));
                }

                p.bingo_claimed = true;
                p.claimed_at = Some(Utc::now());
                p.claim_cycle = Some(room.question_seq);
                Ok((true, ()))
            })
            .await?;

        tracing::info!(
            "{} claimed bingo in room {}",
            participant.display_name,
            participant.room_id
        );
        Ok(participant)
    }

    /// Pending claims, oldest first. Empty once the room is finished.
    pub async fn pending_claims(&self, room_id: &str) -> GameResult<Vec<Participant>> {
        let room = self
            .get_room(room_id)
            .await
            .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))?;
        if room.phase == RoomPhase::Finished {
            return Ok(Vec::new());
        }

        let mut claims: Vec<Participant> = self
            .list_participants(room_id)
            .await
            .into_iter()
            .filter(|p| p.bingo_claimed)
            .collect();
        claims.sort_by_key(|p| p.claimed_at);
        Ok(claims)
    }

    /// Accept one claim as the room's sole winner.
    ///
    /// Both documents are checked and written while holding the room and
    /// participant locks, so this is the single arbitration point per room.
    pub async fn ratify_winner(
        &self,
        room_id: &str,
        participant_id: &str,
    ) -> GameResult<(Room, Participant)> {
        let (room, winner, settled) = {
            let mut rooms = self.rooms.write().await;
            let mut participants = self.participants.write().await;

            let room = rooms
                .get_mut(room_id)
                .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))?;
            if room.winner_count > 0 {
                tracing::debug!(
                    "Ratify of {} in room {} lost to {:?}",
                    participant_id,
                    room_id,
                    room.winner_id
                );
                return Err(GameError::ConcurrentWinConflict);
            }
            if room.phase != RoomPhase::Playing {
                return Err(GameError::invalid("Room is not playing"));
            }

            let participant = participants
                .get_mut(participant_id)
                .filter(|p| p.room_id == room_id)
                .ok_or_else(|| GameError::ParticipantNotFound(participant_id.to_string()))?;
            if !participant.bingo_claimed {
                return Err(GameError::invalid("No pending claim"));
            }

            let now = Utc::now();
            participant.is_winner = true;
            participant.bingo_claimed = false;
            participant.version += 1;
            participant.updated_at = now;

            room.winner_count = 1;
            room.winner_id = Some(participant_id.to_string());
            room.phase = RoomPhase::Finished;
            room.version += 1;
            room.updated_at = now;

            let mut settled = settle_participants(&self.tracker, &mut participants, room);
            settled.retain(|p| p.id != participant_id);
            let winner = participants
                .get(participant_id)
                .cloned()
                .ok_or_else(|| GameError::ParticipantNotFound(participant_id.to_string()))?;

            (room.clone(), winner, settled)
        };

        for participant in settled.iter().chain(std::iter::once(&winner)) {
            self.bus.publish_participant(participant).await;
        }
        self.bus.publish_room(&room).await;

        tracing::info!(
            "Room {} won by {} ({})",
            room_id,
            winner.display_name,
            winner.id
        );
        Ok((room, winner))
    }

    /// Clear one participant's pending claim
    pub async fn reject_claim(&self, room_id: &str, participant_id: &str) -> GameResult<Participant> {
        let (participant, ()) = self
            .update_participant(participant_id, |p, _room| {
                if p.room_id != room_id {
                    return Err(GameError::ParticipantNotFound(participant_id.to_string()));
                }
                if !p.bingo_claimed {
                    return Err(GameError::invalid("No pending claim"));
                }
                p.bingo_claimed = false;
                p.claimed_at = None;
                Ok((true, ()))
            })
            .await?;

        tracing::info!("Rejected claim of {} in room {}", participant_id, room_id);
        Ok(participant)
    }
}
