//! Error types for the session layer.

/// Errors raised while establishing who is on the other end of a
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The identity was present but rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The first message carried no identity at all.
    #[error("missing player_id")]
    MissingIdentity,
}
