//! Shared vocabulary for PromptDuel.
//!
//! - **Types** ([`UserId`], [`RoomId`], [`RoomStatus`], [`RoomSnapshot`],
//!   [`StandingEntry`], ...): identifiers and the read-only views of a
//!   duel room.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`], [`RoomEvent`]):
//!   what connected clients and the session gateway exchange.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how messages become bytes.
//!
//! This crate knows nothing about rooms as state machines; it only
//! describes the data that crosses crate and network boundaries.

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{ClientMessage, RoomEvent, RoomEventKind, ServerMessage};
pub use types::{
    AnswerRecord, CompletionReason, Difficulty, ParticipantStatus, ParticipantView, Question,
    RoomId, RoomSnapshot, RoomStatus, StandingEntry, UserId,
};
