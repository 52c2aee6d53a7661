use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Opaque ID types for type safety
pub type RoomId = String;
pub type ParticipantId = String;
pub type Term = String;

/// Side length of a bingo grid
pub const GRID_SIZE: usize = 5;
/// Number of distinct terms needed to fill a grid
pub const GRID_CELLS: usize = GRID_SIZE * GRID_SIZE;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomPhase {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Moderator,
    Participant,
}

/// A cell position on the grid (0-based)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(&self) -> bool {
        self.row < GRID_SIZE && self.col < GRID_SIZE
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// Fixed 5x5 matrix of term labels, no repeats
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Grid {
    cells: [[Term; GRID_SIZE]; GRID_SIZE],
}

impl Grid {
    /// Lay out exactly 25 labels row-major. Callers guarantee distinctness.
    pub(crate) fn from_labels(labels: &[Term]) -> Option<Self> {
        if labels.len() != GRID_CELLS {
            return None;
        }
        Some(Self {
            cells: std::array::from_fn(|row| {
                std::array::from_fn(|col| labels[row * GRID_SIZE + col].clone())
            }),
        })
    }

    pub fn label(&self, coord: Coord) -> Option<&str> {
        self.cells
            .get(coord.row)
            .and_then(|row| row.get(coord.col))
            .map(String::as_str)
    }

    /// Find the cell carrying a term
    pub fn find(&self, term: &str) -> Option<Coord> {
        self.coords().find(|c| self.label(*c) == Some(term))
    }

    pub fn coords(&self) -> impl Iterator<Item = Coord> + '_ {
        (0..GRID_SIZE).flat_map(|row| (0..GRID_SIZE).map(move |col| Coord::new(row, col)))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().flatten().map(String::as_str)
    }
}

/// The question currently on the board
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveQuestion {
    pub prompt_text: String,
    pub answer_term: Term,
    #[serde(default)]
    pub category: Option<String>,
}

/// Authoritative per-game document, written only by the moderator role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub join_code: String,
    pub host_name: String,
    pub version: u64,
    pub phase: RoomPhase,
    pub active_question: Option<ActiveQuestion>,
    pub answer_revealed: bool,
    pub question_started_at: Option<DateTime<Utc>>,
    /// Number of questions drawn so far; question `k` resolves to `resolved_terms[k - 1]`
    pub question_seq: u32,
    /// Append-only ledger of revealed terms (also the lock list)
    pub resolved_terms: Vec<Term>,
    pub winner_count: u32,
    pub winner_id: Option<ParticipantId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// A question is open until its answer is revealed
    pub fn has_open_question(&self) -> bool {
        self.active_question.is_some() && !self.answer_revealed
    }

    pub fn is_resolved(&self, term: &str) -> bool {
        self.resolved_terms.iter().any(|t| t == term)
    }
}

/// One player's document. Selection fields are written by the player,
/// `is_winner` and claim resolution only by the moderator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub room_id: RoomId,
    pub display_name: String,
    pub version: u64,
    pub grid: Grid,
    /// Pending guess plus every locked-correct cell carried forward
    pub selected_cells: BTreeSet<Coord>,
    /// Guesses that resolved wrong this cycle; cleared when the next question opens
    pub transient_wrong_cells: BTreeSet<Coord>,
    pub bingo_claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    /// Question cycle of the most recent claim (one claim per cycle)
    pub claim_cycle: Option<u32>,
    pub is_winner: bool,
    /// Last question cycle this document was reconciled against
    pub synced_question_seq: u32,
    pub synced_reveal: bool,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    pub(crate) fn new(room: &Room, display_name: String, grid: Grid) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string(),
            room_id: room.id.clone(),
            display_name,
            version: 1,
            grid,
            selected_cells: BTreeSet::new(),
            transient_wrong_cells: BTreeSet::new(),
            bingo_claimed: false,
            claimed_at: None,
            claim_cycle: None,
            is_winner: false,
            synced_question_seq: room.question_seq,
            synced_reveal: room.answer_revealed,
            joined_at: now,
            updated_at: now,
        }
    }

    /// A selected cell whose label is in the ledger is locked-correct for good
    pub fn is_locked(&self, coord: Coord, resolved: &[Term]) -> bool {
        self.selected_cells.contains(&coord)
            && self
                .grid
                .label(coord)
                .is_some_and(|label| resolved.iter().any(|t| t == label))
    }

    /// Selected cells whose label has not been resolved yet
    pub fn pending_cells<'a>(&'a self, resolved: &'a [Term]) -> impl Iterator<Item = Coord> + 'a {
        self.selected_cells
            .iter()
            .copied()
            .filter(move |c| !self.is_locked(*c, resolved))
    }
}
