//! Core vocabulary shared by the engine, the gateway, and clients.
//!
//! Everything in this module is plain data: identifiers, lifecycle
//! statuses, and the read-only views of a duel room that get serialized
//! and pushed to connected clients. None of it carries behavior beyond
//! small predicates on the status enums.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// External identity of a user, as issued by the platform's auth provider.
///
/// The engine never interprets this value; it only compares it. It is a
/// newtype so a `UserId` can't be passed where a topic or a token string
/// is expected.
///
/// `#[serde(transparent)]` keeps the wire form a bare string:
/// `UserId("u_42")` becomes `"u_42"` in JSON.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Creates a user id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Opaque identifier of a duel room, assigned once at creation.
///
/// Backed by a random UUID so ids stay unique across engine instances
/// that share one room store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Generates a fresh random room id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Question selection
// ---------------------------------------------------------------------------

/// Difficulty tier requested when a duel is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beginner => write!(f, "beginner"),
            Self::Intermediate => write!(f, "intermediate"),
            Self::Advanced => write!(f, "advanced"),
        }
    }
}

/// One entry of a room's fixed question sequence.
///
/// `index` is the only identity the engine needs; `item` is the payload
/// supplied by the question bank and is opaque to everything except the
/// payload's own evaluation logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question<Q> {
    /// Position within the room's sequence (0-based).
    pub index: usize,
    /// The question payload as delivered by the bank.
    pub item: Q,
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

/// The lifecycle status of a duel room.
///
/// ```text
/// Lobby ──→ Active ──→ Completed
///   │          │
///   └──────────┴──────→ Abandoned
/// ```
///
/// - **Lobby**: accepting joins, nothing answered yet.
/// - **Active**: membership frozen, participants answering.
/// - **Completed**: everyone finished or the duel timed out. Read-only.
/// - **Abandoned**: every participant left before completion. Read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Lobby,
    Active,
    Completed,
    Abandoned,
}

impl RoomStatus {
    /// Returns `true` if the room is accepting new participants.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// Returns `true` if no further mutation is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    /// Returns `true` if moving from `self` to `target` is a legal step.
    ///
    /// Staying in the same status is not a transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Lobby, Self::Active)
                | (Self::Active, Self::Completed)
                | (Self::Lobby, Self::Abandoned)
                | (Self::Active, Self::Abandoned)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Progress of a single participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Joined, duel not started yet.
    Waiting,
    /// Duel running, at least one question unanswered.
    Answering,
    /// Every question answered.
    Finished,
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Answering => write!(f, "answering"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Why an active room moved to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The last participant answered their last question.
    AllFinished,
    /// The duel duration elapsed with participants still answering.
    TimedOut,
}

// ---------------------------------------------------------------------------
// Read-only views
// ---------------------------------------------------------------------------

/// One row of a room's ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingEntry {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub user_id: UserId,
    /// Sum of the scores of every accepted answer.
    pub score: u32,
    /// Number of answers evaluated as correct.
    pub correct: u32,
    /// Number of answers submitted so far.
    pub answered: u32,
    pub status: ParticipantStatus,
    /// When the participant answered their last question, if they did.
    pub finished_at: Option<DateTime<Utc>>,
}

/// A submitted answer together with its evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord<A> {
    pub answer: A,
    pub correct: bool,
    pub score: u32,
    pub submitted_at: DateTime<Utc>,
}

/// Read-only view of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantView<A> {
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub status: ParticipantStatus,
    pub finished_at: Option<DateTime<Utc>>,
    /// Answers keyed by question index.
    pub answers: BTreeMap<usize, AnswerRecord<A>>,
}

/// A committed, read-only snapshot of a duel room.
///
/// `version` is the store version the snapshot was read at. Two snapshots
/// with the same `room_id` and `version` are identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot<Q, A> {
    pub room_id: RoomId,
    pub version: u64,
    pub creator: UserId,
    pub topic: String,
    pub difficulty: Difficulty,
    pub status: RoomStatus,
    pub min_players: usize,
    pub max_players: usize,
    pub questions: Vec<Question<Q>>,
    pub participants: Vec<ParticipantView<A>>,
    pub standings: Vec<StandingEntry>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion: Option<CompletionReason>,
}

impl<Q, A> RoomSnapshot<Q, A> {
    /// Number of participants currently in the room.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Returns `true` if `user_id` is a participant.
    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participants.iter().any(|p| &p.user_id == user_id)
    }

    /// The invite-link pre-check: lobby status and not yet a member.
    ///
    /// Clients may use this to skip a pointless join request. It is an
    /// optimization only; the engine re-checks everything on join.
    pub fn can_join(&self, user_id: &UserId) -> bool {
        self.status.is_joinable()
            && !self.has_participant(user_id)
            && self.participants.len() < self.max_players
    }
}

// =========================================================================
// Tests
// =========================================================================
