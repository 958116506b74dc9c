//! # PromptDuel
//!
//! Real-time multiplayer prompting duels for a learning platform.
//!
//! A creator opens a duel room on a topic and difficulty, 2 to 10 users
//! join, everyone answers the same fixed question sequence, and the room
//! keeps a live ranking. This crate assembles the pieces:
//!
//! - [`promptduel_room`]: the room state machine and the optimistic engine
//! - [`promptduel_session`]: authentication, sessions, and reconnection
//! - [`promptduel_sweep`]: the periodic expiry sweep
//! - [`Gateway`]: client messages in, replies and room events out
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use promptduel::prelude::*;
//!
//! # async fn run() -> Result<(), PromptDuelError> {
//! let config = ServerConfig::from_env()?;
//! init_tracing(config.log_format)?;
//!
//! let bank = InMemoryQuestionBank::new().with_pool(
//!     "prompt-basics",
//!     Difficulty::Beginner,
//!     [MultipleChoice::new("q1", "Which prompt is clearer?", vec!["A".into(), "B".into()], 0)],
//! );
//! let auth = StaticTokenAuthenticator::new().with_token("tok-alice", "alice");
//!
//! let mut server = DuelServer::builder()
//!     .config(config)
//!     .build(InMemoryRoomStore::new(), bank, auth);
//! server.spawn_sweeper();
//!
//! let session = server.gateway().connect("tok-alice").await?;
//! # let _ = session;
//! # Ok(())
//! # }
//! ```

mod broadcast;
mod config;
mod error;
mod gateway;
mod server;
mod telemetry;

pub use broadcast::BroadcastHub;
pub use config::{LogFormat, ServerConfig};
pub use error::PromptDuelError;
pub use gateway::{user_message, Gateway, SessionExpiry};
pub use server::{DuelServer, DuelServerBuilder};
pub use telemetry::init_tracing;

pub use promptduel_protocol;
pub use promptduel_room;
pub use promptduel_session;
pub use promptduel_sweep;

/// The types most applications need.
pub mod prelude {
    pub use crate::{
        init_tracing, BroadcastHub, DuelServer, DuelServerBuilder, Gateway, LogFormat,
        PromptDuelError, ServerConfig, SessionExpiry,
    };
    pub use promptduel_protocol::{
        ClientMessage, Codec, Difficulty, JsonCodec, RoomEvent, RoomEventKind, RoomId,
        RoomSnapshot, RoomStatus, ServerMessage, StandingEntry, UserId,
    };
    pub use promptduel_room::{
        Clock, DuelConfig, DuelEngine, DuelError, EngineConfig, Evaluate, Evaluation,
        InMemoryQuestionBank, InMemoryRoomStore, ManualClock, MultipleChoice, QuestionBank,
        RoomStore, SystemClock,
    };
    pub use promptduel_session::{
        Authenticator, Session, SessionConfig, SessionError, StaticTokenAuthenticator,
    };
    pub use promptduel_sweep::{SweepConfig, SweepMetrics};
}
