use super::{normalize_code, AppState};
use crate::error::{GameError, GameResult};
use crate::tracker::SelectOutcome;
use crate::types::*;
use chrono::{DateTime, Utc};

impl AppState {
    /// Join a room by its (case-insensitive) code and deal a fresh grid
    pub async fn join_room(&self, code: &str, display_name: &str) -> GameResult<Participant> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(GameError::InvalidInput("Display name is required".to_string()));
        }

        let room_id = self
            .join_codes
            .read()
            .await
            .get(&normalize_code(code))
            .cloned()
            .ok_or_else(|| GameError::RoomNotFound(code.trim().to_string()))?;

        let participant = {
            let rooms = self.rooms.read().await;
            let room = rooms
                .get(&room_id)
                .ok_or_else(|| GameError::RoomNotFound(code.trim().to_string()))?;
            if room.phase == RoomPhase::Finished {
                return Err(GameError::invalid("Room is finished"));
            }

            let grid = self.inventory.build_grid()?;
            let participant = Participant::new(room, display_name.to_string(), grid);
            self.participants
                .write()
                .await
                .insert(participant.id.clone(), participant.clone());
            participant
        };

        self.bus.publish_participant(&participant).await;
        tracing::info!(
            "{} joined room {} as {}",
            participant.display_name,
            room_id,
            participant.id
        );
        Ok(participant)
    }

    /// Apply a cell tap, after reconciling against the current room
    pub async fn select_cell(
        &self,
        participant_id: &str,
        coord: Coord,
    ) -> GameResult<(Participant, SelectOutcome)> {
        self.select_cell_at(participant_id, coord, Utc::now()).await
    }

    pub(crate) async fn select_cell_at(
        &self,
        participant_id: &str,
        coord: Coord,
        now: DateTime<Utc>,
    ) -> GameResult<(Participant, SelectOutcome)> {
        let tracker = self.tracker;
        let (participant, outcome) = self
            .update_participant(participant_id, |p, room| {
                let reconciled = tracker.reconcile(p, room);
                let outcome = tracker.select_cell(p, room, coord, now);
                Ok((reconciled || outcome.changed(), outcome))
            })
            .await?;

        if let SelectOutcome::Rejected { reason } = outcome {
            tracing::debug!("Selection {} by {} ignored: {:?}", coord, participant_id, reason);
        }
        Ok((participant, outcome))
    }

    /// Reconcile one participant against its room. Returns whether anything changed.
    pub async fn sync_participant(&self, participant_id: &str) -> GameResult<bool> {
        let tracker = self.tracker;
        let (_, changed) = self
            .update_participant(participant_id, |p, room| {
                let changed = tracker.reconcile(p, room);
                Ok((changed, changed))
            })
            .await?;
        Ok(changed)
    }

    /// Advisory claim eligibility for the participant's current state
    pub async fn can_claim(&self, participant_id: &str) -> GameResult<bool> {
        let participant = self
            .get_participant(participant_id)
            .await
            .ok_or_else(|| GameError::ParticipantNotFound(participant_id.to_string()))?;
        let room = self
            .get_room(&participant.room_id)
            .await
            .ok_or_else(|| GameError::RoomNotFound(participant.room_id.clone()))?;
        Ok(self.tracker.can_claim(&participant, &room))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::bus::DocumentKey;
    use crate::tracker::SelectRejection;

    /// A cell whose label differs from `term`
    fn other_coord(p: &Participant, term: &str) -> Coord {
        p.grid
            .coords()
            .find(|c| p.grid.label(*c) != Some(term))
            .unwrap()
    }

    #[tokio::test]
    async fn test_join_room() {
        let state = state_with_terms(30);
        let room = state.create_room("Host").await.unwrap();

        let p = state
            .join_room(&room.join_code.to_lowercase(), " Alice ")
            .await
            .unwrap();
        assert_eq!(p.display_name, "Alice");
        assert_eq!(p.room_id, room.id);
        assert!(p.selected_cells.is_empty());

        let labels: std::collections::HashSet<&str> = p.grid.labels().collect();
        assert_eq!(labels.len(), GRID_CELLS);
    }

    #[tokio::test]
    async fn test_join_room_errors() {
        let state = state_with_terms(30);
        let room = state.create_room("Host").await.unwrap();

        assert!(matches!(
            state.join_room("ZZZZZZ", "Alice").await,
            Err(GameError::RoomNotFound(_))
        ));
        assert!(matches!(
            state.join_room(&room.join_code, "  ").await,
            Err(GameError::InvalidInput(_))
        ));

        state.finish(&room.id).await.unwrap();
        assert!(matches!(
            state.join_room(&room.join_code, "Bob").await,
            Err(GameError::InvalidTransition(_))
        ));
        assert_eq!(state.participant_count(&room.id).await, 0);
    }

    #[tokio::test]
    async fn test_late_joiner_is_synced_to_current_cycle() {
        let state = state_with_terms(30);
        let (room, _) = playing_room(&state).await;
        draw(&state, &room.id).await;
        state.reveal_answer(&room.id).await.unwrap();
        draw(&state, &room.id).await;

        let late = state.join_room(&room.join_code, "Bob").await.unwrap();
        assert_eq!(late.synced_question_seq, 2);
        assert!(!late.synced_reveal);
        assert!(!state.sync_participant(&late.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_join_notifies_roster() {
        let state = state_with_terms(30);
        let room = state.create_room("Host").await.unwrap();
        let mut roster = state.bus.subscribe(&DocumentKey::Roster(room.id.clone())).await;

        let p = state.join_room(&room.join_code, "Alice").await.unwrap();
        assert_eq!(roster.recv().await.unwrap().key(), DocumentKey::Participant(p.id));
    }

    #[tokio::test]
    async fn test_correct_guess_locks() {
        // 25 terms: every drawn term is on every grid
        let state = state_with_terms(25);
        let (room, p) = playing_room(&state).await;

        let term = draw(&state, &room.id).await;
        let target = p.grid.find(&term).unwrap();

        let (_, outcome) = state.select_cell(&p.id, target).await.unwrap();
        assert_eq!(outcome, SelectOutcome::Selected { coord: target });

        let room = state.reveal_answer(&room.id).await.unwrap();
        assert!(state.sync_participant(&p.id).await.unwrap());

        let stored = state.get_participant(&p.id).await.unwrap();
        assert!(stored.is_locked(target, &room.resolved_terms));

        draw(&state, &room.id).await;
        let (after, outcome) = state.select_cell(&p.id, target).await.unwrap();
        assert_eq!(
            outcome,
            SelectOutcome::Rejected {
                reason: SelectRejection::Locked
            }
        );
        assert!(after.selected_cells.contains(&target));
    }

    #[tokio::test]
    async fn test_only_latest_guess_is_pending() {
        let state = state_with_terms(30);
        let (room, p) = playing_room(&state).await;
        draw(&state, &room.id).await;

        state.select_cell(&p.id, Coord::new(1, 1)).await.unwrap();
        let (after, outcome) = state.select_cell(&p.id, Coord::new(1, 2)).await.unwrap();

        assert_eq!(
            outcome,
            SelectOutcome::Replaced {
                previous: Coord::new(1, 1),
                coord: Coord::new(1, 2)
            }
        );
        assert_eq!(after.selected_cells.len(), 1);
        assert!(after.selected_cells.contains(&Coord::new(1, 2)));
    }

    #[tokio::test]
    async fn test_selection_after_reveal_is_revalidated() {
        let state = state_with_terms(25);
        let (room, p) = playing_room(&state).await;
        let term = draw(&state, &room.id).await;
        let wrong = other_coord(&p, &term);
        state.select_cell(&p.id, wrong).await.unwrap();

        // The participant never saw the reveal notification
        state.reveal_answer(&room.id).await.unwrap();

        let tap = p.grid.find(&term).unwrap();
        let (after, outcome) = state.select_cell(&p.id, tap).await.unwrap();
        assert_eq!(
            outcome,
            SelectOutcome::Rejected {
                reason: SelectRejection::AnswerRevealed
            }
        );
        // The stale guess settled as wrong while being re-validated
        assert!(after.transient_wrong_cells.contains(&wrong));
        assert!(!after.selected_cells.contains(&wrong));
        assert!(after.synced_reveal);
    }

    #[tokio::test]
    async fn test_selection_after_window_expires_is_rejected() {
        let state = state_with_terms(30);
        let (room, p) = playing_room(&state).await;
        draw(&state, &room.id).await;
        expire_question(&state, &room.id).await;

        let before = state.get_participant(&p.id).await.unwrap().version;
        let (after, outcome) = state.select_cell(&p.id, Coord::new(0, 0)).await.unwrap();
        assert_eq!(
            outcome,
            SelectOutcome::Rejected {
                reason: SelectRejection::TimeExpired
            }
        );
        assert!(after.selected_cells.is_empty());
        // The first tap still records the reconciled cycle
        assert_eq!(after.version, before + 1);

        let (again, _) = state.select_cell(&p.id, Coord::new(0, 0)).await.unwrap();
        assert_eq!(again.version, after.version);
    }

    #[tokio::test]
    async fn test_select_at_uses_given_clock() {
        let state = state_with_terms(30);
        let (room, p) = playing_room(&state).await;
        let drawn = state.draw_question(&room.id).await.unwrap();
        let started = drawn.room().question_started_at.unwrap();

        let late = started + chrono::Duration::seconds(31);
        let (_, outcome) = state
            .select_cell_at(&p.id, Coord::new(2, 2), late)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SelectOutcome::Rejected {
                reason: SelectRejection::TimeExpired
            }
        );

        let early = started + chrono::Duration::seconds(29);
        let (_, outcome) = state
            .select_cell_at(&p.id, Coord::new(2, 2), early)
            .await
            .unwrap();
        assert_eq!(outcome, SelectOutcome::Selected { coord: Coord::new(2, 2) });
    }

    #[tokio::test]
    async fn test_sync_room_participants_settles_everyone() {
        let state = state_with_terms(30);
        let (room, alice) = playing_room(&state).await;
        let bob = state.join_room(&room.join_code, "Bob").await.unwrap();
        let term = draw(&state, &room.id).await;

        state
            .select_cell(&alice.id, other_coord(&alice, &term))
            .await
            .unwrap();
        state
            .select_cell(&bob.id, other_coord(&bob, &term))
            .await
            .unwrap();
        state.reveal_answer(&room.id).await.unwrap();

        assert_eq!(state.sync_room_participants(&room.id).await, 2);
        assert_eq!(state.sync_room_participants(&room.id).await, 0);

        for id in [&alice.id, &bob.id] {
            let p = state.get_participant(id).await.unwrap();
            assert_eq!(p.transient_wrong_cells.len(), 1);
            assert!(p.selected_cells.is_empty());
        }
    }

    #[tokio::test]
    async fn test_unknown_participant() {
        let state = state_with_terms(30);
        assert!(matches!(
            state.select_cell("nobody", Coord::new(0, 0)).await,
            Err(GameError::ParticipantNotFound(_))
        ));
        assert!(matches!(
            state.can_claim("nobody").await,
            Err(GameError::ParticipantNotFound(_))
        ));
    }
}
