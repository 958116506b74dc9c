//! Unified error type for the PromptDuel crates.

use promptduel_protocol::ProtocolError;
use promptduel_room::DuelError;
use promptduel_session::SessionError;

/// Top-level error wrapping every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum PromptDuelError {
    /// Encoding or decoding a wire message failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication, reconnection, or session lookup failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A duel room operation was rejected or the store failed.
    #[error(transparent)]
    Duel(#[from] DuelError),

    /// A configuration value could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use promptduel_protocol::{RoomId, UserId};

    use super::*;

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let top: PromptDuelError = err.into();
        assert!(matches!(top, PromptDuelError::Protocol(_)));
        assert!(top.to_string().contains("bad"));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthFailed("nope".into());
        let top: PromptDuelError = err.into();
        assert!(matches!(top, PromptDuelError::Session(_)));
    }

    #[test]
    fn test_from_duel_error_is_transparent() {
        let room_id = RoomId::new();
        let err = DuelError::RoomFull(room_id);
        let top: PromptDuelError = err.clone().into();
        assert!(matches!(top, PromptDuelError::Duel(DuelError::RoomFull(_))));
        assert_eq!(top.to_string(), err.to_string());
    }

    #[test]
    fn test_session_not_found_message_names_user() {
        let top: PromptDuelError = SessionError::NotFound(UserId::new("alice")).into();
        assert!(top.to_string().contains("alice"));
    }
}
