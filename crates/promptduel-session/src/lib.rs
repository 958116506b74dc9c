//! User session management for PromptDuel.
//!
//! This crate handles the lifecycle of user connections to the duel
//! gateway:
//!
//! 1. **Authentication**: turning a platform token into a [`UserId`]
//!    ([`Authenticator`] trait)
//! 2. **Session tracking**: who is connected and which rooms they hold
//!    a seat in ([`SessionManager`])
//! 3. **Reconnection**: resuming after a brief disconnect with a token,
//!    within a configurable grace period
//!
//! # How it fits in the stack
//!
//! ```text
//! Gateway (above)  ← asks sessions whether a room's participants are still around
//!     ↕
//! Session Layer (this crate)  ← user identity and connection state
//!     ↕
//! Protocol Layer (below)  ← provides UserId, RoomId
//! ```
//!
//! [`UserId`]: promptduel_protocol::UserId

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{Authenticator, StaticTokenAuthenticator};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
