use crate::bingo::BingoDetector;
use crate::timer::QuestionCycleTimer;
use crate::tracker::{ParticipantTracker, SelectOutcome};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this session as the moderator of a new room
    CreateRoom { host_name: String },
    /// Bind this session as a participant
    JoinRoom { code: String, display_name: String },
    Moderator { cmd: ModeratorCommand },
    Participant { cmd: ParticipantCommand },
}

/// Commands only the room's moderator session may issue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ModeratorCommand {
    Start,
    DrawQuestion,
    RevealAnswer,
    Ratify { participant_id: ParticipantId },
    Reject { participant_id: ParticipantId },
    Finish,
    ListParticipants,
}

/// Commands a participant session issues against its own document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ParticipantCommand {
    SelectCell { row: usize, col: usize },
    ClaimBingo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        server_now: String,
    },
    RoomCreated {
        room: RoomView,
    },
    Joined {
        room: RoomView,
        participant: ParticipantView,
    },
    RoomUpdated {
        room: RoomView,
    },
    ParticipantUpdated {
        participant: ParticipantView,
    },
    /// Moderator roster with the pending claim queue (oldest first)
    Participants {
        list: Vec<ParticipantView>,
        pending_claims: Vec<ParticipantId>,
    },
    QuestionDrawn {
        room: RoomView,
    },
    /// Every term has been asked; the room is finished
    GameExhausted {
        room: RoomView,
    },
    Countdown {
        remaining_secs: u32,
        can_select: bool,
        server_now: String,
    },
    /// Result of a cell tap, sent to the tapping participant
    Selection {
        outcome: SelectOutcome,
        participant: ParticipantView,
    },
    ClaimRaised {
        participant: ParticipantView,
    },
    WinnerRatified {
        room: RoomView,
        winner: ParticipantView,
    },
    ClaimRejected {
        participant: ParticipantView,
    },
    /// A ratify lost to an earlier one; not a failure
    RatifyConflict {
        participant_id: ParticipantId,
        winner_id: Option<ParticipantId>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}

/// The open (or last) question as a given role may see it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionView {
    pub prompt_text: String,
    pub category: Option<String>,
    /// Withheld from participants until revealed
    pub answer_term: Option<Term>,
}

/// Room document as sent over the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    pub id: RoomId,
    pub join_code: String,
    pub host_name: String,
    pub version: u64,
    pub phase: RoomPhase,
    pub active_question: Option<QuestionView>,
    pub answer_revealed: bool,
    pub question_seq: u32,
    pub question_started_at: Option<String>,
    /// When the open question stops accepting guesses
    pub deadline: Option<String>,
    pub resolved_terms: Vec<Term>,
    pub winner_count: u32,
    pub winner_id: Option<ParticipantId>,
}

impl RoomView {
    pub fn new(room: &Room, role: Role, timer: &QuestionCycleTimer) -> Self {
        let show_answer = role == Role::Moderator || room.answer_revealed;
        Self {
            id: room.id.clone(),
            join_code: room.join_code.clone(),
            host_name: room.host_name.clone(),
            version: room.version,
            phase: room.phase,
            active_question: room.active_question.as_ref().map(|q| QuestionView {
                prompt_text: q.prompt_text.clone(),
                category: q.category.clone(),
                answer_term: show_answer.then(|| q.answer_term.clone()),
            }),
            answer_revealed: room.answer_revealed,
            question_seq: room.question_seq,
            question_started_at: room.question_started_at.map(|t| t.to_rfc3339()),
            deadline: room
                .question_started_at
                .filter(|_| room.has_open_question())
                .map(|t| timer.deadline(t).to_rfc3339()),
            resolved_terms: room.resolved_terms.clone(),
            winner_count: room.winner_count,
            winner_id: room.winner_id.clone(),
        }
    }
}

/// Participant document as sent over the wire, with derived cell states
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub display_name: String,
    pub version: u64,
    pub grid: Grid,
    pub selected_cells: BTreeSet<Coord>,
    pub locked_cells: BTreeSet<Coord>,
    pub transient_wrong_cells: BTreeSet<Coord>,
    pub bingo_claimed: bool,
    pub is_winner: bool,
    /// Advisory only; ratification decides
    pub can_claim: bool,
}

impl ParticipantView {
    pub fn new(participant: &Participant, room: &Room, tracker: &ParticipantTracker) -> Self {
        Self {
            id: participant.id.clone(),
            display_name: participant.display_name.clone(),
            version: participant.version,
            grid: participant.grid.clone(),
            selected_cells: participant.selected_cells.clone(),
            locked_cells: BingoDetector::locked_correct(participant, &room.resolved_terms)
                .into_iter()
                .collect(),
            transient_wrong_cells: participant.transient_wrong_cells.clone(),
            bingo_claimed: participant.bingo_claimed,
            is_winner: participant.is_winner,
            can_claim: tracker.can_claim(participant, room),
        }
    }
}
