//! Participant command handlers
//!
//! A participant session only ever writes its own document.

use crate::protocol::{ParticipantCommand, ParticipantView, RoomView, ServerMessage};
use crate::state::AppState;
use crate::types::{Coord, Participant, Role};
use std::sync::Arc;

use super::handlers::error_message;
use super::session::Session;

async fn participant_view(state: &AppState, participant: &Participant) -> Option<ParticipantView> {
    let room = state.get_room(&participant.room_id).await?;
    Some(ParticipantView::new(participant, &room, &state.tracker))
}

pub async fn handle_join_room(
    state: &Arc<AppState>,
    session: &mut Session,
    code: String,
    display_name: String,
) -> Option<ServerMessage> {
    let participant = match state.join_room(&code, &display_name).await {
        Ok(p) => p,
        Err(e) => return Some(error_message(e)),
    };
    let room = state.get_room(&participant.room_id).await?;
    session.bind_participant(&room, &participant);

    Some(ServerMessage::Joined {
        participant: ParticipantView::new(&participant, &room, &state.tracker),
        room: RoomView::new(&room, Role::Participant, state.timer()),
    })
}

pub async fn handle_command(
    state: &Arc<AppState>,
    session: &mut Session,
    participant_id: &str,
    cmd: ParticipantCommand,
) -> Option<ServerMessage> {
    match cmd {
        ParticipantCommand::SelectCell { row, col } => {
            let coord = Coord::new(row, col);
            match state.select_cell(participant_id, coord).await {
                Ok((participant, outcome)) => {
                    session.observe_participant(&participant);
                    Some(ServerMessage::Selection {
                        outcome,
                        participant: participant_view(state, &participant).await?,
                    })
                }
                Err(e) => Some(error_message(e)),
            }
        }

        ParticipantCommand::ClaimBingo => match state.claim_bingo(participant_id).await {
            Ok(participant) => {
                session.observe_participant(&participant);
                Some(ServerMessage::ClaimRaised {
                    participant: participant_view(state, &participant).await?,
                })
            }
            Err(e) => Some(error_message(e)),
        },
    }
}
