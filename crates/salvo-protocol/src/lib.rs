//! Wire protocol and game records for Salvo.
//!
//! - **Types** ([`PlayerId`], [`GameId`], [`Coordinate`], [`Response`]): 
//!   identities and the envelope every server frame uses.
//! - **Model** ([`Board`], [`HitRecord`], [`GameSession`]): the durable
//!   records a session store owns.
//! - **Actions** ([`Action`]): the one place raw client JSON becomes a
//!   typed request.
//! - **Payloads**: the `data` shapes for replies and pushes.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes in, values out.
//!
//! ```text
//! Transport (bytes) → Protocol (Action / Response) → Game (state)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod action;
mod codec;
mod error;
mod model;
pub mod payloads;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use action::{
    names, Action, FindGameRequest, GameInfoRequest, PlaceShipsRequest, ShootRequest,
    StartGameRequest,
};
pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use model::{Board, Disconnection, GameSession, GameStatus, HitRecord};
pub use types::{Coordinate, GameId, PlayerId, Response, ShipId, Status, BOARD_SIZE};
