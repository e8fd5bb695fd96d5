//! Unified error type for the Salvo server.

use salvo_game::GameError;
use salvo_protocol::ProtocolError;
use salvo_session::SessionError;
use salvo_store::StoreError;
use salvo_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` conversions let `?` lift a sub-crate error straight
/// into a `SalvoError`.
#[derive(Debug, thiserror::Error)]
pub enum SalvoError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Game(#[from] GameError),
}
