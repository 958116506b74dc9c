//! Authentication hook for validating user identity.
//!
//! PromptDuel doesn't implement authentication itself. The learning
//! platform already has an auth provider; the gateway only needs to turn
//! the token a client presents into a [`UserId`]. The [`Authenticator`]
//! trait is that seam: production wires in the platform's verifier, tests
//! and demos use [`StaticTokenAuthenticator`].

use std::collections::HashMap;
use std::future::Future;

use promptduel_protocol::UserId;

use crate::SessionError;

/// Validates a client's auth token and returns their identity.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use promptduel_protocol::UserId;
/// use promptduel_session::{Authenticator, SessionError};
///
/// /// Accepts `user:<id>` tokens. Development only.
/// struct PrefixAuthenticator;
///
/// impl Authenticator for PrefixAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<UserId, SessionError> {
///         token
///             .strip_prefix("user:")
///             .filter(|id| !id.is_empty())
///             .map(UserId::new)
///             .ok_or_else(|| SessionError::AuthFailed("expected user:<id>".into()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` and returns the user it belongs to.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] if the token is invalid or expired.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<UserId, SessionError>> + Send;
}

/// Authenticator backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` as belonging to `user_id`.
    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), UserId::new(user_id));
        self
    }
}

impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserId, SessionError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| SessionError::AuthFailed("unknown token".into()))
    }
}
