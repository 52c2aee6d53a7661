//! Moderator command handlers
//!
//! All handlers in this module act on the moderator's own room.
//! Authorization is checked in the main dispatch layer before calling these.

use crate::error::GameError;
use crate::protocol::{ModeratorCommand, ParticipantView, RoomView, ServerMessage};
use crate::state::{AppState, DrawOutcome};
use crate::types::{Role, Room};
use std::sync::Arc;

use super::handlers::error_message;
use super::session::Session;

fn room_view(state: &AppState, room: &Room) -> RoomView {
    RoomView::new(room, Role::Moderator, state.timer())
}

pub async fn handle_create_room(
    state: &Arc<AppState>,
    session: &mut Session,
    host_name: String,
) -> Option<ServerMessage> {
    match state.create_room(&host_name).await {
        Ok(room) => {
            session.bind_moderator(&room);
            Some(ServerMessage::RoomCreated {
                room: room_view(state, &room),
            })
        }
        Err(e) => Some(error_message(e)),
    }
}

pub async fn handle_command(
    state: &Arc<AppState>,
    session: &mut Session,
    room_id: &str,
    cmd: ModeratorCommand,
) -> Option<ServerMessage> {
    tracing::debug!("Moderator of {} issued {:?}", room_id, cmd);
    match cmd {
        ModeratorCommand::Start => room_updated(state, session, state.start(room_id).await),
        ModeratorCommand::DrawQuestion => handle_draw_question(state, session, room_id).await,
        ModeratorCommand::RevealAnswer => {
            room_updated(state, session, state.reveal_answer(room_id).await)
        }
        ModeratorCommand::Finish => room_updated(state, session, state.finish(room_id).await),
        ModeratorCommand::Ratify { participant_id } => {
            handle_ratify(state, session, room_id, participant_id).await
        }
        ModeratorCommand::Reject { participant_id } => {
            handle_reject(state, room_id, participant_id).await
        }
        ModeratorCommand::ListParticipants => handle_list_participants(state, room_id).await,
    }
}

fn room_updated(
    state: &AppState,
    session: &mut Session,
    result: Result<Room, GameError>,
) -> Option<ServerMessage> {
    match result {
        Ok(room) => {
            session.observe_room(&room);
            Some(ServerMessage::RoomUpdated {
                room: room_view(state, &room),
            })
        }
        Err(e) => Some(error_message(e)),
    }
}

async fn handle_draw_question(
    state: &Arc<AppState>,
    session: &mut Session,
    room_id: &str,
) -> Option<ServerMessage> {
    match state.draw_question(room_id).await {
        Ok(outcome) => {
            session.observe_room(outcome.room());
            let room = room_view(state, outcome.room());
            Some(match outcome {
                DrawOutcome::Question(_) => ServerMessage::QuestionDrawn { room },
                DrawOutcome::Exhausted(_) => ServerMessage::GameExhausted { room },
            })
        }
        Err(e) => Some(error_message(e)),
    }
}

async fn handle_ratify(
    state: &Arc<AppState>,
    session: &mut Session,
    room_id: &str,
    participant_id: String,
) -> Option<ServerMessage> {
    match state.ratify_winner(room_id, &participant_id).await {
        Ok((room, winner)) => {
            session.observe_room(&room);
            Some(ServerMessage::WinnerRatified {
                winner: ParticipantView::new(&winner, &room, &state.tracker),
                room: room_view(state, &room),
            })
        }
        Err(GameError::ConcurrentWinConflict) => {
            let winner_id = state.get_room(room_id).await.and_then(|r| r.winner_id);
            tracing::info!(
                "Ratify of {} ignored, room {} already won by {:?}",
                participant_id,
                room_id,
                winner_id
            );
            Some(ServerMessage::RatifyConflict {
                participant_id,
                winner_id,
            })
        }
        Err(e) => Some(error_message(e)),
    }
}

async fn handle_reject(
    state: &Arc<AppState>,
    room_id: &str,
    participant_id: String,
) -> Option<ServerMessage> {
    let participant = match state.reject_claim(room_id, &participant_id).await {
        Ok(p) => p,
        Err(e) => return Some(error_message(e)),
    };
    let room = state.get_room(room_id).await?;
    Some(ServerMessage::ClaimRejected {
        participant: ParticipantView::new(&participant, &room, &state.tracker),
    })
}

async fn handle_list_participants(state: &Arc<AppState>, room_id: &str) -> Option<ServerMessage> {
    let room = match state.get_room(room_id).await {
        Some(room) => room,
        None => return Some(error_message(GameError::RoomNotFound(room_id.to_string()))),
    };
    let pending_claims = match state.pending_claims(room_id).await {
        Ok(claims) => claims.into_iter().map(|p| p.id).collect(),
        Err(e) => return Some(error_message(e)),
    };
    let list = state
        .list_participants(room_id)
        .await
        .iter()
        .map(|p| ParticipantView::new(p, &room, &state.tracker))
        .collect();

    Some(ServerMessage::Participants {
        list,
        pending_claims,
    })
}
