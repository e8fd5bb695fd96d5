//! Identity hook for the first message on a connection.
//!
//! Salvo doesn't run accounts or passwords. A client announces who it is
//! in its first frame, and an [`Authenticator`] decides whether to
//! believe it. The default, [`UuidAuthenticator`], accepts any well-formed
//! player UUID; deployments with real accounts swap in token validation
//! without touching the connection handler.

use salvo_protocol::PlayerId;

use crate::SessionError;

/// Resolves the identity string from a client's first message.
///
/// # Example
///
/// ```rust
/// use salvo_protocol::PlayerId;
/// use salvo_session::{Authenticator, SessionError};
///
/// /// Only lets one fixed player in.
/// struct SinglePlayer(PlayerId);
///
/// impl Authenticator for SinglePlayer {
///     async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
///         let id: PlayerId = token
///             .parse()
///             .map_err(|_| SessionError::AuthFailed("not a player id".into()))?;
///         if id == self.0 {
///             Ok(id)
///         } else {
///             Err(SessionError::AuthFailed("unknown player".into()))
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` and returns the player it identifies.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<PlayerId, SessionError>> + Send;
}

/// Accepts any token that parses as a player UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidAuthenticator;

impl Authenticator for UuidAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
        if token.is_empty() {
            return Err(SessionError::MissingIdentity);
        }
        token
            .parse()
            .map_err(|_| SessionError::AuthFailed(format!("{token:?} is not a valid player id")))
    }
}
