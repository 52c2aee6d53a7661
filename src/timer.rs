//! Countdown for the open question
//!
//! Remaining time is always re-derived from the absolute start timestamp,
//! never kept as a decrementing counter, so missed ticks cost nothing.

use chrono::{DateTime, Duration, Utc};

use crate::types::Room;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionCycleTimer {
    duration: Duration,
}

impl QuestionCycleTimer {
    pub fn new(seconds: u32) -> Self {
        Self {
            duration: Duration::seconds(i64::from(seconds)),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// `duration - (now - started_at)`, clamped at zero
    pub fn remaining(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let left = self.duration - (now - started_at);
        left.max(Duration::zero())
    }

    /// Whole seconds left, rounded up so a partial last second still shows as 1
    pub fn remaining_secs(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
        let ms = self.remaining(started_at, now).num_milliseconds();
        u32::try_from((ms + 999) / 1000).unwrap_or(u32::MAX)
    }

    pub fn is_expired(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.remaining(started_at, now) <= Duration::zero()
    }

    pub fn deadline(&self, started_at: DateTime<Utc>) -> DateTime<Utc> {
        started_at + self.duration
    }

    /// Whether the room's open question still accepts guesses at `now`
    pub fn window_open(&self, room: &Room, now: DateTime<Utc>) -> bool {
        room.has_open_question()
            && room
                .question_started_at
                .is_some_and(|started| !self.is_expired(started, now))
    }
}

impl Default for QuestionCycleTimer {
    fn default() -> Self {
        Self::new(30)
    }
}
