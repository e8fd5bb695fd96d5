//! Error types for the game layer.
//!
//! Every business-rule rejection is a variant here and travels back to
//! the caller as a value. The dispatcher turns each one into a
//! `status: error` envelope; none of them close the connection.

use salvo_protocol::{GameId, PlayerId};
use salvo_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("game {0} not found")]
    GameNotFound(GameId),

    #[error("game {0} is not active")]
    GameNotActive(GameId),

    #[error("not your turn")]
    NotYourTurn,

    #[error("player {player} is not part of game {game}")]
    NotAPlayer { game: GameId, player: PlayerId },

    #[error("no opponent found in game {0}")]
    OpponentNotFound(GameId),

    /// The battle is running but the defender has no board on record.
    #[error("opponent board missing for game {0}")]
    OpponentBoardMissing(GameId),

    #[error("invalid placement: {0}")]
    InvalidPlacement(String),

    #[error("game {0} has already started")]
    GameAlreadyStarted(GameId),

    /// The queue handed a player back to themselves.
    #[error("matchmaking queue returned the requesting player {0}")]
    QueueCorrupted(PlayerId),

    /// The session could not be persisted; both players were re-queued.
    #[error("pairing failed: {0}")]
    PairingFailed(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
