//! Per-connection state
//!
//! Each socket owns one `Session`: which room and document it is bound to,
//! and the last version it has seen of every document it watches. Nothing
//! here is shared between connections.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::bus::{Change, DocumentKey};
use crate::protocol::{ParticipantView, RoomView, ServerMessage};
use crate::state::AppState;
use crate::tracker::ParticipantTracker;
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Moderator {
        room_id: RoomId,
    },
    Participant {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
}

#[derive(Debug)]
pub struct Session {
    pub binding: Binding,
    seen: HashMap<DocumentKey, u64>,
    /// Highest question cycle announced to this client
    announced_seq: u32,
    /// Last countdown value sent, per question cycle
    last_countdown: Option<(u32, u32)>,
    /// Claims already announced to a moderator, by claim time
    announced_claims: HashMap<ParticipantId, DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            binding: Binding::Unbound,
            seen: HashMap::new(),
            announced_seq: 0,
            last_countdown: None,
            announced_claims: HashMap::new(),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self.binding {
            Binding::Unbound => None,
            Binding::Moderator { .. } => Some(Role::Moderator),
            Binding::Participant { .. } => Some(Role::Participant),
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        match &self.binding {
            Binding::Unbound => None,
            Binding::Moderator { room_id } | Binding::Participant { room_id, .. } => Some(room_id),
        }
    }

    pub fn participant_id(&self) -> Option<&str> {
        match &self.binding {
            Binding::Participant { participant_id, .. } => Some(participant_id),
            _ => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding != Binding::Unbound
    }

    pub fn bind_moderator(&mut self, room: &Room) {
        self.binding = Binding::Moderator {
            room_id: room.id.clone(),
        };
        self.observe_room(room);
    }

    pub fn bind_participant(&mut self, room: &Room, participant: &Participant) {
        self.binding = Binding::Participant {
            room_id: room.id.clone(),
            participant_id: participant.id.clone(),
        };
        self.observe_room(room);
        self.observe_participant(participant);
    }

    /// Channels this session listens on: its room, plus the roster for a
    /// moderator or its own document for a participant
    pub fn subscriptions(&self) -> Vec<DocumentKey> {
        match &self.binding {
            Binding::Unbound => Vec::new(),
            Binding::Moderator { room_id } => vec![
                DocumentKey::Room(room_id.clone()),
                DocumentKey::Roster(room_id.clone()),
            ],
            Binding::Participant {
                room_id,
                participant_id,
            } => vec![
                DocumentKey::Room(room_id.clone()),
                DocumentKey::Participant(participant_id.clone()),
            ],
        }
    }

    /// Record a version and report whether it is newer than anything seen
    fn mark_seen(&mut self, key: DocumentKey, version: u64) -> bool {
        let last = self.seen.entry(key).or_insert(0);
        if version <= *last {
            return false;
        }
        *last = version;
        true
    }

    pub fn observe_room(&mut self, room: &Room) -> bool {
        self.announced_seq = self.announced_seq.max(room.question_seq);
        self.mark_seen(DocumentKey::Room(room.id.clone()), room.version)
    }

    pub fn observe_participant(&mut self, participant: &Participant) -> bool {
        self.mark_seen(
            DocumentKey::Participant(participant.id.clone()),
            participant.version,
        )
    }

    /// Turn a bus delivery into a client message. Stale and duplicate
    /// versions yield `None`.
    pub async fn render_change(&mut self, change: Change, state: &AppState) -> Option<ServerMessage> {
        let role = self.role()?;
        if !self.mark_seen(change.key(), change.version()) {
            tracing::debug!("Dropped stale {:?} v{}", change.key(), change.version());
            return None;
        }

        match change {
            Change::Room(room) => {
                let new_question = room.question_seq > self.announced_seq && room.has_open_question();
                self.announced_seq = self.announced_seq.max(room.question_seq);
                let exhausted = room.phase == RoomPhase::Finished
                    && room.winner_count == 0
                    && state.inventory.unresolved(&room.resolved_terms).next().is_none();
                let view = RoomView::new(&room, role, state.timer());
                Some(if new_question {
                    ServerMessage::QuestionDrawn { room: view }
                } else if exhausted {
                    ServerMessage::GameExhausted { room: view }
                } else {
                    ServerMessage::RoomUpdated { room: view }
                })
            }
            Change::Participant(participant) => {
                let room = state.get_room(&participant.room_id).await?;
                let view = ParticipantView::new(&participant, &room, &state.tracker);
                Some(if role == Role::Moderator && self.is_new_claim(&participant) {
                    ServerMessage::ClaimRaised { participant: view }
                } else {
                    ServerMessage::ParticipantUpdated { participant: view }
                })
            }
        }
    }

    /// Whether this version raises a claim the moderator has not been shown yet
    fn is_new_claim(&mut self, participant: &Participant) -> bool {
        match participant.claimed_at.filter(|_| participant.bingo_claimed) {
            Some(claimed_at) => {
                self.announced_claims.insert(participant.id.clone(), claimed_at) != Some(claimed_at)
            }
            None => {
                self.announced_claims.remove(&participant.id);
                false
            }
        }
    }

    /// Countdown for the open question, sent only when the displayed value changes
    pub fn countdown(
        &mut self,
        room: &Room,
        tracker: &ParticipantTracker,
        now: DateTime<Utc>,
    ) -> Option<ServerMessage> {
        if room.phase != RoomPhase::Playing || !room.has_open_question() {
            return None;
        }
        let started = room.question_started_at?;
        let remaining_secs = tracker.timer().remaining_secs(started, now);

        let key = (room.question_seq, remaining_secs);
        if self.last_countdown == Some(key) {
            return None;
        }
        self.last_countdown = Some(key);

        Some(ServerMessage::Countdown {
            remaining_secs,
            can_select: tracker.can_select(room, now),
            server_now: now.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;

    fn moderator_session(room: &Room) -> Session {
        let mut session = Session::new();
        session.bind_moderator(room);
        session
    }

    #[tokio::test]
    async fn test_duplicate_and_stale_versions_dropped() {
        let state = AppState::default();
        let mut room = fixtures::room();
        let mut session = moderator_session(&room);

        room.version = 2;
        assert!(session
            .render_change(Change::Room(room.clone()), &state)
            .await
            .is_some());
        assert!(session
            .render_change(Change::Room(room.clone()), &state)
            .await
            .is_none());

        room.version = 1;
        assert!(session.render_change(Change::Room(room), &state).await.is_none());
    }

    #[tokio::test]
    async fn test_new_question_announced_once() {
        let state = AppState::default();
        let mut room = fixtures::room();
        let mut session = moderator_session(&room);

        fixtures::open_question(&mut room, "T00", 0);
        room.version = 2;
        let msg = session.render_change(Change::Room(room.clone()), &state).await;
        assert!(matches!(msg, Some(ServerMessage::QuestionDrawn { .. })));

        fixtures::reveal(&mut room);
        room.version = 3;
        let msg = session.render_change(Change::Room(room), &state).await;
        assert!(matches!(msg, Some(ServerMessage::RoomUpdated { .. })));
    }

    #[tokio::test]
    async fn test_claim_announced_once_per_claim() {
        let state = AppState::default();
        let room = fixtures::room();
        state.rooms.write().await.insert(room.id.clone(), room.clone());
        let mut session = moderator_session(&room);

        let mut participant = fixtures::participant(&room);
        participant.bingo_claimed = true;
        participant.claimed_at = Some(Utc::now());
        participant.version = 2;
        let msg = session
            .render_change(Change::Participant(participant.clone()), &state)
            .await;
        assert!(matches!(msg, Some(ServerMessage::ClaimRaised { .. })));

        // Reconcile bump while the same claim is still pending
        participant.synced_question_seq += 1;
        participant.version = 3;
        let msg = session
            .render_change(Change::Participant(participant.clone()), &state)
            .await;
        assert!(matches!(msg, Some(ServerMessage::ParticipantUpdated { .. })));

        // Rejected, then claimed again later
        participant.bingo_claimed = false;
        participant.claimed_at = None;
        participant.version = 4;
        session
            .render_change(Change::Participant(participant.clone()), &state)
            .await;
        participant.bingo_claimed = true;
        participant.claimed_at = Some(Utc::now() + chrono::Duration::seconds(1));
        participant.version = 5;
        let msg = session
            .render_change(Change::Participant(participant), &state)
            .await;
        assert!(matches!(msg, Some(ServerMessage::ClaimRaised { .. })));
    }

    #[tokio::test]
    async fn test_exhausted_room_announced_to_participants() {
        let state = AppState::default();
        let mut room = fixtures::room();
        let participant = fixtures::participant(&room);
        let mut session = Session::new();
        session.bind_participant(&room, &participant);

        room.resolved_terms = state
            .inventory
            .records()
            .iter()
            .map(|r| r.term.clone())
            .collect();
        room.phase = RoomPhase::Finished;
        room.version += 1;
        let msg = session.render_change(Change::Room(room.clone()), &state).await;
        assert!(matches!(msg, Some(ServerMessage::GameExhausted { .. })));

        // A moderator-forced finish is a plain update
        let mut forced = fixtures::room();
        forced.phase = RoomPhase::Finished;
        forced.version += 1;
        let mut session = moderator_session(&fixtures::room());
        let msg = session.render_change(Change::Room(forced), &state).await;
        assert!(matches!(msg, Some(ServerMessage::RoomUpdated { .. })));
    }

    #[tokio::test]
    async fn test_unbound_session_renders_nothing() {
        let state = AppState::default();
        let mut session = Session::new();
        let msg = session
            .render_change(Change::Room(fixtures::room()), &state)
            .await;
        assert!(msg.is_none());
        assert!(session.subscriptions().is_empty());
    }

    #[test]
    fn test_subscriptions_follow_binding() {
        let room = fixtures::room();
        let participant = fixtures::participant(&room);

        let session = moderator_session(&room);
        assert_eq!(
            session.subscriptions(),
            vec![
                DocumentKey::Room(room.id.clone()),
                DocumentKey::Roster(room.id.clone())
            ]
        );

        let mut session = Session::new();
        session.bind_participant(&room, &participant);
        assert_eq!(session.role(), Some(Role::Participant));
        assert_eq!(session.participant_id(), Some(participant.id.as_str()));
        assert!(session
            .subscriptions()
            .contains(&DocumentKey::Participant(participant.id.clone())));
    }

    #[test]
    fn test_countdown_only_on_change() {
        let tracker = ParticipantTracker::default();
        let mut room = fixtures::room();
        let mut session = moderator_session(&room);
        let now = Utc::now();
        assert!(session.countdown(&room, &tracker, now).is_none());

        fixtures::open_question(&mut room, "T00", 0);
        let started = room.question_started_at.unwrap();

        match session.countdown(&room, &tracker, started) {
            Some(ServerMessage::Countdown {
                remaining_secs,
                can_select,
                ..
            }) => {
                assert_eq!(remaining_secs, 30);
                assert!(can_select);
            }
            other => panic!("Expected countdown, got {:?}", other),
        }
        assert!(session.countdown(&room, &tracker, started).is_none());

        // Ticks in between were missed; the value is re-derived, not decremented
        let later = started + chrono::Duration::seconds(40);
        match session.countdown(&room, &tracker, later) {
            Some(ServerMessage::Countdown {
                remaining_secs,
                can_select,
                ..
            }) => {
                assert_eq!(remaining_secs, 0);
                assert!(!can_select);
            }
            other => panic!("Expected countdown, got {:?}", other),
        }
        assert!(session.countdown(&room, &tracker, later).is_none());
    }
}
