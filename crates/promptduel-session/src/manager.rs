//! The session manager: tracks every user connected to the gateway.
//!
//! Responsibilities:
//! - Creating sessions when users authenticate
//! - Tracking which users are connected or disconnected
//! - Remembering which duel rooms each user holds a seat in
//! - Validating reconnection tokens
//! - Expiring sessions after the grace period
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain struct over `HashMap`s. The gateway owns it
//! behind a single mutex; nothing in here awaits.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use promptduel_protocol::{RoomId, UserId};
use rand::Rng;

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Registry of every connected (or recently disconnected) user.
///
/// ```text
/// authenticate() ──→ create() ──→ disconnect() ──→ reconnect()
///                       │               │                │
///                       ▼               ▼                ▼
///                  [Connected]   [Disconnected]    [Connected]
///                                      │
///                                      ▼ expire_stale()
///                                  [Expired] ──→ cleanup_expired()
/// ```
pub struct SessionManager {
    sessions: HashMap<UserId, Session>,

    /// Reconnection token → owner. Kept in sync with `sessions`.
    tokens: HashMap<String, UserId>,

    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            config,
        }
    }

    /// Creates a session for an authenticated user.
    ///
    /// A disconnected or expired session for the same user is replaced.
    /// A disconnected one hands over its seats, so a user who
    /// re-authenticates instead of reconnecting keeps their rooms.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if the user has a connected
    /// session.
    pub fn create(&mut self, user_id: UserId) -> Result<Session, SessionError> {
        let mut rooms = BTreeSet::new();
        if let Some(existing) = self.sessions.get_mut(&user_id) {
            if existing.state.is_connected() {
                return Err(SessionError::AlreadyConnected(user_id));
            }
            self.tokens.remove(&existing.reconnect_token);
            if existing.state != SessionState::Expired {
                rooms = std::mem::take(&mut existing.rooms);
            }
        }

        let token = generate_token();
        let session = Session {
            user_id: user_id.clone(),
            state: SessionState::Connected,
            reconnect_token: token.clone(),
            rooms,
        };

        self.tokens.insert(token, user_id.clone());
        self.sessions.insert(user_id.clone(), session.clone());

        tracing::info!(%user_id, "session created");
        Ok(session)
    }

    /// Marks a user as disconnected and starts the grace period.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if no session exists.
    pub fn disconnect(&mut self, user_id: &UserId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(user_id)
            .ok_or_else(|| SessionError::NotFound(user_id.clone()))?;

        session.state = SessionState::Disconnected {
            since: Instant::now(),
        };

        tracing::info!(
            %user_id,
            rooms = session.rooms.len(),
            "user disconnected, grace period started"
        );
        Ok(())
    }

    /// Resumes a disconnected session with its reconnection token.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`]: token not recognized
    /// - [`SessionError::SessionExpired`]: grace period elapsed
    /// - [`SessionError::AlreadyConnected`]: the session never dropped
    pub fn reconnect(&mut self, token: &str) -> Result<Session, SessionError> {
        let user_id = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(SessionError::InvalidToken)?;
        let grace = self.grace();
        let session = self
            .sessions
            .get_mut(&user_id)
            .ok_or(SessionError::InvalidToken)?;

        match &session.state {
            SessionState::Disconnected { since } => {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    return Err(SessionError::SessionExpired(user_id));
                }
                session.state = SessionState::Connected;
                tracing::info!(%user_id, "user reconnected");
                Ok(session.clone())
            }
            SessionState::Connected => Err(SessionError::AlreadyConnected(user_id)),
            SessionState::Expired => Err(SessionError::SessionExpired(user_id)),
        }
    }

    /// Expires every disconnected session past the grace period.
    ///
    /// Returns the expired sessions so the caller can react (tell their
    /// rooms the user is gone) before [`cleanup_expired`](Self::cleanup_expired)
    /// drops them.
    pub fn expire_stale(&mut self) -> Vec<Session> {
        let grace = self.grace();
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = &session.state {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    tracing::info!(
                        user_id = %session.user_id,
                        rooms = session.rooms.len(),
                        "session expired (grace period elapsed)"
                    );
                    expired.push(session.clone());
                }
            }
        }

        expired
    }

    /// Removes all expired sessions and invalidates their tokens.
    pub fn cleanup_expired(&mut self) {
        self.sessions.retain(|_, session| {
            if session.state == SessionState::Expired {
                self.tokens.remove(&session.reconnect_token);
                false
            } else {
                true
            }
        });
    }

    /// Records that `user_id` holds a seat in `room_id`. Seats in other
    /// rooms are kept.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if no session exists.
    pub fn attach_room(&mut self, user_id: &UserId, room_id: RoomId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(user_id)
            .ok_or_else(|| SessionError::NotFound(user_id.clone()))?;
        session.rooms.insert(room_id);
        Ok(())
    }

    /// Forgets the user's seat in `room_id`.
    pub fn detach_room(&mut self, user_id: &UserId, room_id: RoomId) {
        if let Some(session) = self.sessions.get_mut(user_id) {
            session.rooms.remove(&room_id);
        }
    }

    /// Whether `user_id` is connected or still within their grace period.
    ///
    /// This is about the user, not a room: someone playing two duels is
    /// present in both.
    pub fn is_present(&self, user_id: &UserId) -> bool {
        self.sessions
            .get(user_id)
            .is_some_and(|s| s.state != SessionState::Expired)
    }

    pub fn get(&self, user_id: &UserId) -> Option<&Session> {
        self.sessions.get(user_id)
    }

    /// Number of sessions in any state.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn grace(&self) -> Duration {
        Duration::from_secs(self.config.reconnect_grace_secs)
    }
}

/// 16 random bytes as 32 lowercase hex characters.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
