//! Snapshot of a finished room for the reporting side.
//!
//! Finished rooms are immutable, so the snapshot is final. No aggregation
//! happens here; consumers get the raw documents.

use super::AppState;
use crate::error::{GameError, GameResult};
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Schema version for export format compatibility
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomExport {
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    pub room: Room,
    /// Participants in join order
    pub participants: Vec<Participant>,
}

impl RoomExport {
    pub fn new(room: Room, participants: Vec<Participant>) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            room,
            participants,
        }
    }

    /// Check the snapshot is internally consistent
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        if let Some(p) = self.participants.iter().find(|p| p.room_id != self.room.id) {
            return Err(format!(
                "Participant '{}' belongs to room '{}', not '{}'",
                p.id, p.room_id, self.room.id
            ));
        }

        let winners: Vec<&Participant> = self.participants.iter().filter(|p| p.is_winner).collect();
        if winners.len() as u32 != self.room.winner_count {
            return Err(format!(
                "Room records {} winner(s) but {} participant(s) are marked winner",
                self.room.winner_count,
                winners.len()
            ));
        }
        if let (Some(winner), Some(winner_id)) = (winners.first(), &self.room.winner_id) {
            if &winner.id != winner_id {
                return Err(format!(
                    "Room winner '{}' does not match participant '{}'",
                    winner_id, winner.id
                ));
            }
        }

        Ok(())
    }
}

impl AppState {
    /// Export a finished room with all of its participants
    pub async fn export_room(&self, room_id: &str) -> GameResult<RoomExport> {
        let room = self
            .get_room(room_id)
            .await
            .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))?;
        if room.phase != RoomPhase::Finished {
            return Err(GameError::invalid("Room is still live"));
        }

        let participants = self.list_participants(room_id).await;
        tracing::info!(
            "Exported room {} with {} participants",
            room_id,
            participants.len()
        );
        Ok(RoomExport::new(room, participants))
    }
}
