//! Session types: what the server remembers about a connected user.
//!
//! A session tracks:
//! - WHO the user is (`UserId`)
//! - WHAT state the connection is in (connected, disconnected, expired)
//! - HOW they can reconnect (a secret token)
//! - WHICH duel rooms they hold a seat in

use std::collections::BTreeSet;
use std::time::Instant;

use promptduel_protocol::{RoomId, UserId};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long (in seconds) a disconnected user has to reconnect before
    /// their session is expired and their room is told they are gone.
    ///
    /// Default: 30 seconds. Set to 0 to disable reconnection entirely.
    pub reconnect_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The current state of a user's session.
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected ──(timeout)──→ Expired
///       ↑                            │
///       └────────(reconnect)─────────┘
/// ```
///
/// `Instant` is monotonic, so the grace period is immune to wall-clock
/// adjustments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// User is actively connected.
    Connected,

    /// User disconnected at `since` and may still come back.
    Disconnected { since: Instant },

    /// Grace period elapsed. The session will be cleaned up.
    Expired,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single user's session on the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,

    pub state: SessionState,

    /// Secret the client presents to resume after a disconnect instead of
    /// re-authenticating. 32 hex characters (128 bits).
    pub reconnect_token: String,

    /// Rooms this user joined and has not left. A user may sit in several
    /// at once; each seat is released when the session expires.
    pub rooms: BTreeSet<RoomId>,
}
