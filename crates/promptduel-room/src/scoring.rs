//! Live ranking of a room's participants.
//!
//! [`Standings`] lives inside the room aggregate and is written in the same
//! compare-and-set as the answer that changed it, so a ranking read from a
//! snapshot always agrees with that snapshot's room status.
//!
//! Ranking order:
//! 1. total score, descending
//! 2. finish time, ascending (finished before unfinished)
//! 3. join time, ascending
//! 4. user id, for a total order

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use promptduel_protocol::{ParticipantStatus, StandingEntry, UserId};
use serde::{Deserialize, Serialize};

use crate::Evaluation;

/// Running totals for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingRow {
    pub user_id: UserId,
    pub score: u32,
    pub correct: u32,
    pub answered: u32,
    pub status: ParticipantStatus,
    pub finished_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

impl StandingRow {
    fn new(user_id: UserId, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            score: 0,
            correct: 0,
            answered: 0,
            status: ParticipantStatus::Waiting,
            finished_at: None,
            joined_at,
        }
    }
}

/// `Less` means `a` ranks above `b`.
fn rank_order(a: &StandingRow, b: &StandingRow) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| match (a.finished_at, b.finished_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.joined_at.cmp(&b.joined_at))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Participant rows kept in rank order at all times.
///
/// Every update moves at most one row, so each submission costs
/// O(participants) instead of a full re-sort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standings {
    rows: Vec<StandingRow>,
}

impl Standings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, user_id: &UserId) -> Option<&StandingRow> {
        self.rows.iter().find(|r| &r.user_id == user_id)
    }

    /// Rows in rank order.
    pub fn rows(&self) -> &[StandingRow] {
        &self.rows
    }

    /// Adds a zero-score row for a newly joined participant.
    pub fn insert(&mut self, user_id: UserId, joined_at: DateTime<Utc>) {
        if self.get(&user_id).is_some() {
            return;
        }
        self.place(StandingRow::new(user_id, joined_at));
    }

    /// Drops a participant's row. Returns `false` if there was none.
    pub fn remove(&mut self, user_id: &UserId) -> bool {
        match self.position(user_id) {
            Some(idx) => {
                self.rows.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Adds one evaluated answer to a participant's totals.
    ///
    /// `finished_at` is `Some` when this was the participant's last
    /// unanswered question; the row then becomes `Finished`.
    pub fn record(
        &mut self,
        user_id: &UserId,
        evaluation: Evaluation,
        finished_at: Option<DateTime<Utc>>,
    ) {
        let Some(idx) = self.position(user_id) else {
            return;
        };
        let mut row = self.rows.remove(idx);
        row.answered = row.answered.saturating_add(1);
        row.score = row.score.saturating_add(evaluation.score);
        if evaluation.correct {
            row.correct = row.correct.saturating_add(1);
        }
        if let Some(at) = finished_at {
            row.status = ParticipantStatus::Finished;
            row.finished_at = Some(at);
        }
        self.place(row);
    }

    /// Sets every row that is not finished to `status`.
    ///
    /// Status is not a ranking key, so order is preserved.
    pub fn set_unfinished_status(&mut self, status: ParticipantStatus) {
        for row in &mut self.rows {
            if row.status != ParticipantStatus::Finished {
                row.status = status;
            }
        }
    }

    /// The ranking as handed to clients, with 1-based ranks.
    pub fn entries(&self) -> Vec<StandingEntry> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| StandingEntry {
                rank: i + 1,
                user_id: row.user_id.clone(),
                score: row.score,
                correct: row.correct,
                answered: row.answered,
                status: row.status,
                finished_at: row.finished_at,
            })
            .collect()
    }

    fn position(&self, user_id: &UserId) -> Option<usize> {
        self.rows.iter().position(|r| &r.user_id == user_id)
    }

    fn place(&mut self, row: StandingRow) {
        let at = self
            .rows
            .partition_point(|r| rank_order(r, &row) == Ordering::Less);
        self.rows.insert(at, row);
    }
}
