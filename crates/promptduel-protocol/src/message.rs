//! Messages exchanged between connected clients and the session gateway.
//!
//! Both enums are generic over the question payload `Q` and the answer type
//! `A`, so the wire format follows whatever the question bank delivers.
//! `#[serde(tag = "type")]` produces internally tagged JSON:
//! `{ "type": "JoinRoom", "room_id": "..." }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CompletionReason, Difficulty, RoomId, RoomSnapshot, RoomStatus, StandingEntry, UserId,
};

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Requests a client can send once its session is authenticated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage<A> {
    /// Open a new duel room. The sender becomes its creator but is not
    /// seated until they join.
    CreateRoom {
        topic: String,
        difficulty: Difficulty,
        item_count: usize,
        min_players: usize,
        max_players: usize,
    },

    /// Join a room in its lobby (manual join or invite-link auto-join).
    JoinRoom { room_id: RoomId },

    /// Creator-only: start the duel.
    StartRoom { room_id: RoomId },

    /// Answer one question of an active duel.
    SubmitAnswer {
        room_id: RoomId,
        question_index: usize,
        answer: A,
    },

    /// Leave a room that has not started yet.
    LeaveRoom { room_id: RoomId },

    /// Fetch the latest committed snapshot.
    GetRoomDetails { room_id: RoomId },

    /// Fetch the ranking only.
    GetStandings { room_id: RoomId },

    /// Keep-alive. `client_time` is echoed back for RTT measurement.
    Heartbeat { client_time: u64 },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Replies and pushes sent by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage<Q, A> {
    /// Full room snapshot (reply to join, start, details).
    RoomDetails { room: RoomSnapshot<Q, A> },

    /// Current ranking of a room.
    Standings {
        room_id: RoomId,
        standings: Vec<StandingEntry>,
    },

    /// The submitted answer was recorded.
    AnswerAccepted {
        room_id: RoomId,
        question_index: usize,
        correct: bool,
        score: u32,
        /// `true` if this was the participant's last unanswered question.
        finished: bool,
    },

    /// Reply to a heartbeat.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// A committed change to a room this client is watching.
    Event { event: RoomEvent },

    /// The request was rejected. `code` is stable and machine-readable,
    /// `message` is meant for display.
    Error { code: String, message: String },
}

// ---------------------------------------------------------------------------
// RoomEvent
// ---------------------------------------------------------------------------

/// What changed in a committed room write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoomEventKind {
    Created,
    ParticipantJoined { user_id: UserId },
    ParticipantLeft { user_id: UserId },
    Started,
    AnswerRecorded { user_id: UserId, question_index: usize },
    ParticipantFinished { user_id: UserId },
    Completed { reason: CompletionReason },
    Abandoned,
}

/// Notification emitted after every committed room transition.
///
/// Carries the standings read from the same snapshot as the status, so a
/// client never sees a ranking that disagrees with the room state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub room_id: RoomId,
    /// Store version produced by the write.
    pub version: u64,
    pub status: RoomStatus,
    pub kind: RoomEventKind,
    pub standings: Vec<StandingEntry>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_submit_answer_json_format() {
        let room_id = RoomId::new();
        let msg = ClientMessage::SubmitAnswer {
            room_id,
            question_index: 3,
            answer: 1usize,
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "SubmitAnswer");
        assert_eq!(json["question_index"], 3);
        assert_eq!(json["answer"], 1);
        assert_eq!(json["room_id"], room_id.0.to_string());
    }

    #[test]
    fn test_client_message_parses_join_from_json() {
        let room_id = RoomId::new();
        let raw = format!(r#"{{"type":"JoinRoom","room_id":"{}"}}"#, room_id.0);

        let msg: ClientMessage<usize> = serde_json::from_str(&raw).unwrap();

        assert_eq!(msg, ClientMessage::JoinRoom { room_id });
    }

    #[test]
    fn test_client_message_parses_create_room_from_json() {
        let raw = r#"{"type":"CreateRoom","topic":"few-shot","difficulty":"advanced",
                      "item_count":5,"min_players":2,"max_players":3}"#;

        let msg: ClientMessage<usize> = serde_json::from_str(raw).unwrap();

        assert_eq!(
            msg,
            ClientMessage::CreateRoom {
                topic: "few-shot".into(),
                difficulty: Difficulty::Advanced,
                item_count: 5,
                min_players: 2,
                max_players: 3,
            }
        );
    }

    #[test]
    fn test_server_message_error_json_format() {
        let msg: ServerMessage<(), ()> = ServerMessage::Error {
            code: "room_full".into(),
            message: "This duel is full".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Error");
        assert_eq!(json["code"], "room_full");
    }

    #[test]
    fn test_room_event_kind_is_tagged() {
        let kind = RoomEventKind::Completed {
            reason: CompletionReason::TimedOut,
        };
        let json = serde_json::to_value(&kind).unwrap();

        assert_eq!(json["kind"], "completed");
        assert_eq!(json["reason"], "timed_out");
    }
}
