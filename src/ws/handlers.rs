//! WebSocket message dispatch
//!
//! This module provides the main entry point for handling client messages.
//! The session binding is checked here, then dispatched to role-specific handler modules.

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::session::{Binding, Session};
use super::{moderator, participant};

/// Extract the moderator's room or return early if the session is not a moderator
macro_rules! check_moderator {
    ($session:expr) => {
        match &$session.binding {
            Binding::Moderator { room_id } => room_id.clone(),
            _ => {
                return Some(ServerMessage::error(
                    "UNAUTHORIZED",
                    "Only the room's moderator can do that",
                ))
            }
        }
    };
}

/// Extract the participant's ids or return early if the session is not a participant
macro_rules! check_participant {
    ($session:expr) => {
        match &$session.binding {
            Binding::Participant {
                room_id,
                participant_id,
            } => (room_id.clone(), participant_id.clone()),
            _ => {
                return Some(ServerMessage::error(
                    "UNAUTHORIZED",
                    "Join a room before sending participant commands",
                ))
            }
        }
    };
}

/// Map a failed operation onto the wire
pub(crate) fn error_message(e: GameError) -> ServerMessage {
    match &e {
        GameError::InvalidTransition(_) => tracing::warn!("{}", e),
        _ => tracing::debug!("{}", e),
    }
    ServerMessage::error(e.code(), e.to_string())
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    session: &mut Session,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CreateRoom { host_name } => {
            if session.is_bound() {
                return Some(error_message(GameError::invalid(
                    "Session is already bound to a room",
                )));
            }
            moderator::handle_create_room(state, session, host_name).await
        }

        ClientMessage::JoinRoom { code, display_name } => {
            if session.is_bound() {
                return Some(error_message(GameError::invalid(
                    "Session is already bound to a room",
                )));
            }
            participant::handle_join_room(state, session, code, display_name).await
        }

        ClientMessage::Moderator { cmd } => {
            let room_id = check_moderator!(session);
            moderator::handle_command(state, session, &room_id, cmd).await
        }

        ClientMessage::Participant { cmd } => {
            let (_room_id, participant_id) = check_participant!(session);
            participant::handle_command(state, session, &participant_id, cmd).await
        }
    }
}
