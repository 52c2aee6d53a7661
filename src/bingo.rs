//! Line-completion detection over locked-correct cells

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{Coord, Participant, Term, GRID_SIZE};

/// One of the twelve winning lines of a 5x5 grid
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Line {
    Row(usize),
    Column(usize),
    Diagonal,
    AntiDiagonal,
}

impl Line {
    pub fn all() -> impl Iterator<Item = Line> {
        (0..GRID_SIZE)
            .map(Line::Row)
            .chain((0..GRID_SIZE).map(Line::Column))
            .chain([Line::Diagonal, Line::AntiDiagonal])
    }

    pub fn coords(self) -> impl Iterator<Item = Coord> {
        (0..GRID_SIZE).map(move |i| match self {
            Line::Row(r) => Coord::new(r, i),
            Line::Column(c) => Coord::new(i, c),
            Line::Diagonal => Coord::new(i, i),
            Line::AntiDiagonal => Coord::new(i, GRID_SIZE - 1 - i),
        })
    }
}

/// Pure detector; holds no state
pub struct BingoDetector;

impl BingoDetector {
    /// Cells that are selected and whose label is in the ledger.
    /// Pending and wrong cells never count toward a line.
    pub fn locked_correct(participant: &Participant, resolved: &[Term]) -> HashSet<Coord> {
        participant
            .selected_cells
            .iter()
            .copied()
            .filter(|c| participant.is_locked(*c, resolved))
            .collect()
    }

    /// Lines fully covered by `cells`
    pub fn winning_lines(cells: &HashSet<Coord>) -> Vec<Line> {
        if cells.len() < GRID_SIZE {
            return Vec::new();
        }
        Line::all()
            .filter(|line| line.coords().all(|c| cells.contains(&c)))
            .collect()
    }

    pub fn has_bingo(cells: &HashSet<Coord>) -> bool {
        cells.len() >= GRID_SIZE && Line::all().any(|line| line.coords().all(|c| cells.contains(&c)))
    }

    /// Whether the participant currently holds a completed line
    pub fn participant_has_bingo(participant: &Participant, resolved: &[Term]) -> bool {
        Self::has_bingo(&Self::locked_correct(participant, resolved))
    }
}
