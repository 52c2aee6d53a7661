/// Result type for room and participant operations
pub type GameResult<T> = Result<T, GameError>;

/// Errors that can occur while driving a room
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    /// Operation attempted outside its valid phase/state. Nothing was written.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    #[error("Not enough distinct terms to build a grid ({available} available, {required} required)")]
    InsufficientInventory { available: usize, required: usize },

    /// A ratification arrived after the room already has its winner.
    /// Expected under concurrent claims, so callers treat it as a soft outcome.
    #[error("A winner has already been ratified for this room")]
    ConcurrentWinConflict,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to load term inventory: {0}")]
    InventoryLoad(String),
}

impl GameError {
    /// Error code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidTransition(_) => "INVALID_TRANSITION",
            GameError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            GameError::ParticipantNotFound(_) => "PARTICIPANT_NOT_FOUND",
            GameError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            GameError::ConcurrentWinConflict => "CONCURRENT_WIN_CONFLICT",
            GameError::InvalidInput(_) => "INVALID_INPUT",
            GameError::InventoryLoad(_) => "INVENTORY_LOAD_FAILED",
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        GameError::InvalidTransition(msg.into())
    }
}

impl From<std::io::Error> for GameError {
    fn from(e: std::io::Error) -> Self {
        GameError::InventoryLoad(e.to_string())
    }
}

impl From<serde_json::Error> for GameError {
    fn from(e: serde_json::Error) -> Self {
        GameError::InventoryLoad(e.to_string())
    }
}
