//! Duel room lifecycle for PromptDuel.
//!
//! A duel room groups 2 to 10 users around one fixed question sequence.
//! This crate owns the room state machine, the live standings, and the
//! optimistic read-compute-write cycle that keeps concurrent joins, starts,
//! and answer submissions linearizable per room.
//!
//! # Key types
//!
//! - [`DuelEngine`]: the operations (create, join, start, submit, ...)
//! - [`Room`]: the aggregate and its pure transitions
//! - [`RoomStore`]: versioned get and compare-and-set of rooms
//! - [`QuestionBank`]: where question pools come from
//! - [`Evaluate`]: how a question payload scores an answer
//! - [`Standings`]: the incrementally maintained ranking
//! - [`RoomObserver`]: notified after every committed transition

mod bank;
mod clock;
mod config;
mod engine;
mod error;
mod observer;
mod question;
mod room;
mod scoring;
mod store;

pub use bank::{draw_questions, BankError, InMemoryQuestionBank, QuestionBank};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DuelConfig, EngineConfig, MAX_PLAYERS_CEILING, MIN_PLAYERS_FLOOR};
pub use engine::{AnswerReceipt, DuelEngine, SweepReport};
pub use error::DuelError;
pub use observer::{NoopObserver, RoomObserver};
pub use question::{Evaluate, Evaluation, MultipleChoice};
pub use room::{AnswerOutcome, Applied, Expiry, ExpiryAction, Participant, Room, RoomView};
pub use scoring::{StandingRow, Standings};
pub use store::{InMemoryRoomStore, RoomStore, StoreError, Versioned};
