//! Error types for the session layer.

use promptduel_protocol::UserId;

/// Errors that can occur during session management.
///
/// These cover the full lifecycle of a user session: authentication,
/// creation, reconnection, and expiration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The token was invalid, expired, or rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists for the given user.
    #[error("session not found for user {0}")]
    NotFound(UserId),

    /// The reconnection token doesn't match anything the server issued.
    #[error("invalid reconnection token")]
    InvalidToken,

    /// The reconnection grace period has elapsed.
    #[error("session expired for user {0}")]
    SessionExpired(UserId),

    /// The user already has a connected session. One per user.
    #[error("user {0} already has an active session")]
    AlreadyConnected(UserId),
}
