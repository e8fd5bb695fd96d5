//! Error types for the protocol layer.
//!
//! Everything that can go wrong between "raw JSON arrived" and "we hold a
//! typed value" lands here. None of these variants ever reach game state:
//! they are produced before any store or registry call.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, truncated frames, or a stored record
    /// written by an incompatible version.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// A cell label outside the board or in the wrong format.
    #[error("invalid coordinate {0:?}: expected a row A-O followed by a column 1-15")]
    InvalidCoordinate(String),

    /// An identity string that is not a UUID.
    #[error("invalid identifier {0:?}")]
    InvalidId(String),

    /// The action name is not one the dispatcher knows.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The payload did not match the shape the action requires.
    #[error("invalid payload for {action}: {reason}")]
    InvalidPayload {
        /// The action whose payload was rejected.
        action: String,
        /// Human-readable reason.
        reason: String,
    },
}
