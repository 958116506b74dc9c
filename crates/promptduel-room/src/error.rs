//! Error types for the duel room layer.

use promptduel_protocol::{RoomId, RoomStatus, UserId};

use crate::bank::BankError;
use crate::store::StoreError;

/// Every way a duel room operation can be rejected.
///
/// All variants except [`DuelError::StoreUnavailable`] and
/// [`DuelError::QuestionBankUnavailable`] are expected outcomes of valid
/// requests racing against room state. Callers map them to user-facing
/// messages through [`DuelError::code`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DuelError {
    /// The room does not exist.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// The room is past its lobby and no longer accepts participants.
    #[error("room {room_id} is not joinable (status: {status})")]
    RoomNotJoinable { room_id: RoomId, status: RoomStatus },

    /// Every participant slot is taken.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The user is already a participant of this room.
    #[error("user {0} already joined room {1}")]
    AlreadyJoined(UserId, RoomId),

    /// The user is not a participant of this room.
    #[error("user {0} is not a participant of room {1}")]
    NotAParticipant(UserId, RoomId),

    /// The question was already answered by this participant.
    #[error("user {user_id} already answered question {index}")]
    DuplicateAnswer { user_id: UserId, index: usize },

    /// The question index is outside the room's question sequence.
    #[error("question index {index} out of range (room has {len} questions)")]
    InvalidQuestionIndex { index: usize, len: usize },

    /// The room is completed or abandoned; it accepts no more mutations.
    #[error("room {0} is closed")]
    RoomClosed(RoomId),

    /// The question bank returned fewer questions than requested.
    #[error("not enough questions: requested {requested}, pool has {available}")]
    InsufficientQuestions { requested: usize, available: usize },

    /// Optimistic retries were exhausted. Re-fetch and decide again.
    #[error("room {room_id} is busy, gave up after {attempts} attempts")]
    TransientConflict { room_id: RoomId, attempts: u32 },

    /// The room store failed. This is a system fault, not a user error.
    #[error("room store unavailable: {0}")]
    StoreUnavailable(String),

    /// Only the creator may start a duel manually.
    #[error("user {0} is not the creator of room {1}")]
    NotRoomCreator(UserId, RoomId),

    /// Starting requires at least `min_players` participants.
    #[error("room {room_id} needs {needed} players to start, has {present}")]
    NotEnoughPlayers {
        room_id: RoomId,
        present: usize,
        needed: usize,
    },

    /// The operation needs an active duel but the room is still in its lobby.
    #[error("room {0} has not started")]
    RoomNotStarted(RoomId),

    /// Membership is frozen once the duel is running.
    #[error("membership of room {0} is frozen")]
    MembershipFrozen(RoomId),

    /// The requested room settings are out of range.
    #[error("invalid duel configuration: {0}")]
    InvalidConfig(String),

    /// The question bank could not be reached.
    #[error("question bank unavailable: {0}")]
    QuestionBankUnavailable(String),
}

impl DuelError {
    /// Stable machine-readable code for gateways and clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "room_not_found",
            Self::RoomNotJoinable { .. } => "room_not_joinable",
            Self::RoomFull(_) => "room_full",
            Self::AlreadyJoined(..) => "already_joined",
            Self::NotAParticipant(..) => "not_a_participant",
            Self::DuplicateAnswer { .. } => "duplicate_answer",
            Self::InvalidQuestionIndex { .. } => "invalid_question_index",
            Self::RoomClosed(_) => "room_closed",
            Self::InsufficientQuestions { .. } => "insufficient_questions",
            Self::TransientConflict { .. } => "transient_conflict",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::NotRoomCreator(..) => "not_room_creator",
            Self::NotEnoughPlayers { .. } => "not_enough_players",
            Self::RoomNotStarted(_) => "room_not_started",
            Self::MembershipFrozen(_) => "membership_frozen",
            Self::InvalidConfig(_) => "invalid_config",
            Self::QuestionBankUnavailable(_) => "question_bank_unavailable",
        }
    }

    /// Returns `true` for infrastructure faults that should be logged and
    /// surfaced as a generic failure instead of a user-facing reason.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::QuestionBankUnavailable(_)
        )
    }
}

impl From<StoreError> for DuelError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(room_id) => Self::RoomNotFound(room_id),
            StoreError::Conflict { room_id, .. } => Self::TransientConflict {
                room_id,
                attempts: 1,
            },
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<BankError> for DuelError {
    fn from(err: BankError) -> Self {
        Self::QuestionBankUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_infrastructure_errors_are_fatal() {
        let room_id = RoomId::new();
        assert!(DuelError::StoreUnavailable("down".into()).is_fatal());
        assert!(DuelError::QuestionBankUnavailable("down".into()).is_fatal());
        assert!(!DuelError::RoomFull(room_id).is_fatal());
        assert!(
            !DuelError::TransientConflict {
                room_id,
                attempts: 3
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_store_not_found_maps_to_room_not_found() {
        let room_id = RoomId::new();
        let err: DuelError = StoreError::NotFound(room_id).into();
        assert_eq!(err, DuelError::RoomNotFound(room_id));
    }

    #[test]
    fn test_store_unavailable_maps_to_fatal_error() {
        let err: DuelError = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(err.code(), "store_unavailable");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_display_includes_context() {
        let room_id = RoomId::new();
        let err = DuelError::RoomNotJoinable {
            room_id,
            status: RoomStatus::Active,
        };
        assert!(err.to_string().contains("active"));
        assert_eq!(err.code(), "room_not_joinable");
    }
}
