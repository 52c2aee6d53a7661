//! Per-participant selection model
//!
//! Translates raw cell taps into the one-pending-guess-per-question model and
//! reconciles a participant document against the latest room document.
//! Everything here is synchronous and works on plain values; the state layer
//! decides when to call it and persists the result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bingo::BingoDetector;
use crate::timer::QuestionCycleTimer;
use crate::types::{Coord, Participant, Room, RoomPhase, Term};

/// Why a tap was ignored
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectRejection {
    NotPlaying,
    NoOpenQuestion,
    AnswerRevealed,
    TimeExpired,
    /// Label already in the ledger; locked cells are immutable
    Locked,
    /// Guessed wrong this cycle
    MarkedWrong,
    OutOfBounds,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectOutcome {
    Selected { coord: Coord },
    /// The previous pending guess was dropped in favour of `coord`
    Replaced { previous: Coord, coord: Coord },
    Deselected { coord: Coord },
    Rejected { reason: SelectRejection },
}

impl SelectOutcome {
    /// Whether the participant document needs a write
    pub fn changed(&self) -> bool {
        !matches!(self, SelectOutcome::Rejected { .. })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParticipantTracker {
    timer: QuestionCycleTimer,
}

impl ParticipantTracker {
    pub fn new(timer: QuestionCycleTimer) -> Self {
        Self { timer }
    }

    pub fn timer(&self) -> &QuestionCycleTimer {
        &self.timer
    }

    pub fn can_select(&self, room: &Room, now: DateTime<Utc>) -> bool {
        room.phase == RoomPhase::Playing && self.timer.window_open(room, now)
    }

    /// Apply a tap. Rejections leave the participant untouched.
    pub fn select_cell(
        &self,
        participant: &mut Participant,
        room: &Room,
        coord: Coord,
        now: DateTime<Utc>,
    ) -> SelectOutcome {
        if let Err(reason) = self.check_selectable(participant, room, coord, now) {
            return SelectOutcome::Rejected { reason };
        }

        if participant.selected_cells.remove(&coord) {
            return SelectOutcome::Deselected { coord };
        }

        // At most one pending guess: drop any other unresolved selection,
        // locked-correct cells stay put.
        let pending: Vec<Coord> = participant.pending_cells(&room.resolved_terms).collect();
        for c in &pending {
            participant.selected_cells.remove(c);
        }
        participant.selected_cells.insert(coord);

        match pending.first() {
            Some(previous) => SelectOutcome::Replaced {
                previous: *previous,
                coord,
            },
            None => SelectOutcome::Selected { coord },
        }
    }

    fn check_selectable(
        &self,
        participant: &Participant,
        room: &Room,
        coord: Coord,
        now: DateTime<Utc>,
    ) -> Result<(), SelectRejection> {
        let label = participant
            .grid
            .label(coord)
            .ok_or(SelectRejection::OutOfBounds)?;

        if room.phase != RoomPhase::Playing {
            return Err(SelectRejection::NotPlaying);
        }
        if room.active_question.is_none() {
            return Err(SelectRejection::NoOpenQuestion);
        }
        if room.answer_revealed {
            return Err(SelectRejection::AnswerRevealed);
        }
        if !self.timer.window_open(room, now) {
            return Err(SelectRejection::TimeExpired);
        }
        if room.is_resolved(label) {
            return Err(SelectRejection::Locked);
        }
        if participant.transient_wrong_cells.contains(&coord) {
            return Err(SelectRejection::MarkedWrong);
        }
        Ok(())
    }

    /// Settle the pending guess against `ledger`, which must already contain
    /// the revealed term. Matching guesses stay selected (now locked), the rest
    /// move to the wrong set. Earlier locks are untouched.
    pub fn on_reveal(&self, participant: &mut Participant, ledger: &[Term]) -> bool {
        let wrong: Vec<Coord> = participant.pending_cells(ledger).collect();
        for c in &wrong {
            participant.selected_cells.remove(c);
            participant.transient_wrong_cells.insert(*c);
        }
        !wrong.is_empty()
    }

    pub fn on_next_question_opened(&self, participant: &mut Participant) -> bool {
        let changed = !participant.transient_wrong_cells.is_empty();
        participant.transient_wrong_cells.clear();
        changed
    }

    /// Re-derive the participant from the room document alone. Idempotent:
    /// applying the same room twice changes nothing the second time.
    pub fn reconcile(&self, participant: &mut Participant, room: &Room) -> bool {
        let mut changed = false;

        if room.question_seq != participant.synced_question_seq {
            if !participant.synced_reveal {
                // Missed the reveal of the question we were last on
                let settled = ledger_prefix(room, participant.synced_question_seq);
                self.on_reveal(participant, settled);
            }
            self.on_next_question_opened(participant);
            participant.synced_question_seq = room.question_seq;
            participant.synced_reveal = false;
            changed = true;
        }

        if room.answer_revealed && !participant.synced_reveal {
            self.on_reveal(participant, ledger_prefix(room, room.question_seq));
            participant.synced_reveal = true;
            changed = true;
        }

        changed
    }

    /// Advisory: whether a claim would currently be accepted for review
    pub fn can_claim(&self, participant: &Participant, room: &Room) -> bool {
        room.phase == RoomPhase::Playing
            && room.winner_count == 0
            && !participant.bingo_claimed
            && !participant.is_winner
            && participant.claim_cycle != Some(room.question_seq)
            && BingoDetector::participant_has_bingo(participant, &room.resolved_terms)
    }
}

/// Terms resolved by the first `seq` questions
fn ledger_prefix(room: &Room, seq: u32) -> &[Term] {
    let upto = (seq as usize).min(room.resolved_terms.len());
    &room.resolved_terms[..upto]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;

    fn tracker() -> ParticipantTracker {
        ParticipantTracker::new(QuestionCycleTimer::new(30))
    }

    fn select(
        tracker: &ParticipantTracker,
        p: &mut Participant,
        room: &Room,
        row: usize,
        col: usize,
    ) -> SelectOutcome {
        tracker.select_cell(p, room, Coord::new(row, col), Utc::now())
    }

    #[test]
    fn test_select_and_toggle_off() {
        let t = tracker();
        let mut room = fixtures::room();
        fixtures::open_question(&mut room, "T00", 0);
        let mut p = fixtures::participant(&room);

        assert_eq!(
            select(&t, &mut p, &room, 2, 2),
            SelectOutcome::Selected { coord: Coord::new(2, 2) }
        );
        assert_eq!(
            select(&t, &mut p, &room, 2, 2),
            SelectOutcome::Deselected { coord: Coord::new(2, 2) }
        );
        assert!(p.selected_cells.is_empty());
    }

    #[test]
    fn test_second_guess_replaces_first() {
        let t = tracker();
        let mut room = fixtures::room();
        fixtures::open_question(&mut room, "T12", 0);
        let mut p = fixtures::participant(&room);

        select(&t, &mut p, &room, 1, 1);
        let outcome = select(&t, &mut p, &room, 1, 2);

        assert_eq!(
            outcome,
            SelectOutcome::Replaced {
                previous: Coord::new(1, 1),
                coord: Coord::new(1, 2)
            }
        );
        assert_eq!(p.selected_cells.len(), 1);
        assert!(p.selected_cells.contains(&Coord::new(1, 2)));
        assert!(!p.selected_cells.contains(&Coord::new(1, 1)));
    }

    #[test]
    fn test_correct_guess_locks_and_rejects_further_taps() {
        let t = tracker();
        let mut room = fixtures::room();
        fixtures::open_question(&mut room, "T00", 0);
        let mut p = fixtures::participant(&room);

        select(&t, &mut p, &room, 0, 0);
        fixtures::reveal(&mut room);
        assert!(t.reconcile(&mut p, &room));
        assert!(p.is_locked(Coord::new(0, 0), &room.resolved_terms));

        fixtures::open_question(&mut room, "T11", 0);
        t.reconcile(&mut p, &room);
        assert_eq!(
            select(&t, &mut p, &room, 0, 0),
            SelectOutcome::Rejected { reason: SelectRejection::Locked }
        );
        assert!(p.selected_cells.contains(&Coord::new(0, 0)));
    }

    #[test]
    fn test_locked_cells_survive_replacement() {
        let t = tracker();
        let mut room = fixtures::room();
        fixtures::open_question(&mut room, "T00", 0);
        let mut p = fixtures::participant(&room);
        select(&t, &mut p, &room, 0, 0);
        fixtures::reveal(&mut room);
        t.reconcile(&mut p, &room);

        fixtures::open_question(&mut room, "T33", 0);
        t.reconcile(&mut p, &room);
        select(&t, &mut p, &room, 4, 4);
        select(&t, &mut p, &room, 3, 3);

        let expected: Vec<Coord> = vec![Coord::new(0, 0), Coord::new(3, 3)];
        assert_eq!(p.selected_cells.iter().copied().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_wrong_guess_moves_to_wrong_and_clears_next_cycle() {
        let t = tracker();
        let mut room = fixtures::room();
        fixtures::open_question(&mut room, "T00", 0);
        let mut p = fixtures::participant(&room);

        select(&t, &mut p, &room, 4, 4);
        fixtures::reveal(&mut room);
        t.reconcile(&mut p, &room);

        assert!(p.selected_cells.is_empty());
        assert!(p.transient_wrong_cells.contains(&Coord::new(4, 4)));

        fixtures::open_question(&mut room, "T44", 0);
        t.reconcile(&mut p, &room);
        assert!(p.transient_wrong_cells.is_empty());
        assert_eq!(
            select(&t, &mut p, &room, 4, 4),
            SelectOutcome::Selected { coord: Coord::new(4, 4) }
        );
    }

    #[test]
    fn test_rejections() {
        let t = tracker();
        let mut room = fixtures::room();
        let mut p = fixtures::participant(&room);

        assert_eq!(
            select(&t, &mut p, &room, 0, 0),
            SelectOutcome::Rejected { reason: SelectRejection::NoOpenQuestion }
        );
        assert_eq!(
            select(&t, &mut p, &room, 0, 5),
            SelectOutcome::Rejected { reason: SelectRejection::OutOfBounds }
        );

        fixtures::open_question(&mut room, "T00", 31);
        assert_eq!(
            select(&t, &mut p, &room, 0, 0),
            SelectOutcome::Rejected { reason: SelectRejection::TimeExpired }
        );

        fixtures::open_question(&mut room, "T01", 0);
        fixtures::reveal(&mut room);
        assert_eq!(
            select(&t, &mut p, &room, 0, 0),
            SelectOutcome::Rejected { reason: SelectRejection::AnswerRevealed }
        );

        room.phase = RoomPhase::Finished;
        assert_eq!(
            select(&t, &mut p, &room, 0, 0),
            SelectOutcome::Rejected { reason: SelectRejection::NotPlaying }
        );
        assert!(p.selected_cells.is_empty());
    }

    #[test]
    fn test_wrong_cell_rejected_while_marked() {
        let t = tracker();
        let mut room = fixtures::room();
        fixtures::open_question(&mut room, "T00", 0);
        let mut p = fixtures::participant(&room);
        p.transient_wrong_cells.insert(Coord::new(3, 3));

        assert_eq!(
            select(&t, &mut p, &room, 3, 3),
            SelectOutcome::Rejected { reason: SelectRejection::MarkedWrong }
        );
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let t = tracker();
        let mut room = fixtures::room();
        fixtures::open_question(&mut room, "T00", 0);
        let mut p = fixtures::participant(&room);
        select(&t, &mut p, &room, 2, 2);
        fixtures::reveal(&mut room);

        assert!(t.reconcile(&mut p, &room));
        let snapshot = (p.selected_cells.clone(), p.transient_wrong_cells.clone());
        assert!(!t.reconcile(&mut p, &room));
        assert_eq!(snapshot, (p.selected_cells.clone(), p.transient_wrong_cells.clone()));
    }

    #[test]
    fn test_reconcile_after_missed_notifications() {
        let t = tracker();
        let mut room = fixtures::room();
        fixtures::open_question(&mut room, "T00", 0);
        let mut p = fixtures::participant(&room);
        select(&t, &mut p, &room, 0, 0);

        // Reveal of T00, then the next question T11 opened and was revealed,
        // all before this participant saw any of it.
        fixtures::reveal(&mut room);
        fixtures::open_question(&mut room, "T11", 0);
        fixtures::reveal(&mut room);

        t.reconcile(&mut p, &room);
        assert!(p.is_locked(Coord::new(0, 0), &room.resolved_terms));
        assert!(p.transient_wrong_cells.is_empty());
        assert_eq!(p.synced_question_seq, 2);
        assert!(p.synced_reveal);
    }

    #[test]
    fn test_stale_guess_settles_against_its_own_question() {
        let t = tracker();
        let mut room = fixtures::room();
        fixtures::open_question(&mut room, "T00", 0);
        let mut p = fixtures::participant(&room);
        // Guessed T11 for question T00
        select(&t, &mut p, &room, 1, 1);

        fixtures::reveal(&mut room);
        fixtures::open_question(&mut room, "T11", 0);
        fixtures::reveal(&mut room);

        // T11 is now in the ledger but the guess was made for T00, so it is wrong
        t.reconcile(&mut p, &room);
        assert!(!p.selected_cells.contains(&Coord::new(1, 1)));
    }

    #[test]
    fn test_locks_never_revert_across_cycles() {
        let t = tracker();
        let mut room = fixtures::room();
        let mut p = fixtures::participant(&room);
        let mut locked: Vec<Coord> = Vec::new();

        for (i, c) in (0..5).enumerate() {
            let term = format!("T{}{}", c, c);
            fixtures::open_question(&mut room, &term, 0);
            t.reconcile(&mut p, &room);
            // Guess right on even cycles, wrong on odd ones
            let guess = if i % 2 == 0 { Coord::new(c, c) } else { Coord::new(c, (c + 1) % 5) };
            select(&t, &mut p, &room, guess.row, guess.col);
            fixtures::reveal(&mut room);
            t.reconcile(&mut p, &room);
            if i % 2 == 0 {
                locked.push(guess);
            }
            for l in &locked {
                assert!(p.is_locked(*l, &room.resolved_terms));
                assert!(!p.transient_wrong_cells.contains(l));
            }
        }
    }

    #[test]
    fn test_can_claim_follows_detector_and_cycle() {
        let t = tracker();
        let mut room = fixtures::room();
        let mut p = fixtures::participant(&room);

        for c in 0..5 {
            fixtures::open_question(&mut room, &format!("T0{}", c), 0);
            t.reconcile(&mut p, &room);
            assert!(!t.can_claim(&p, &room));
            select(&t, &mut p, &room, 0, c);
            fixtures::reveal(&mut room);
            t.reconcile(&mut p, &room);
        }
        assert!(t.can_claim(&p, &room));

        p.claim_cycle = Some(room.question_seq);
        assert!(!t.can_claim(&p, &room));
    }
}
