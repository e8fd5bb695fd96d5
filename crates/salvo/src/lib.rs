//! # Salvo
//!
//! Realtime two-player battleship server.
//!
//! Players connect over WebSocket, announce who they are in their first
//! frame, and are paired through a shared matchmaking queue. Once both
//! boards are placed the server runs a strict turn-taking battle, pushes
//! every shot to the defender, and declares a winner when a fleet is
//! sunk. Sessions live in a [`SessionStore`](salvo_store::SessionStore),
//! so a player who drops can reconnect into the same game.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use salvo::prelude::*;
//!
//! # async fn run() -> Result<(), SalvoError> {
//! let server = SalvoServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod dispatcher;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::SalvoError;
pub use server::{SalvoServer, SalvoServerBuilder};

/// Commonly used types, re-exported for convenience.
pub mod prelude {
    pub use crate::{SalvoError, SalvoServer, SalvoServerBuilder, ServerConfig};
    pub use salvo_game::GameConfig;
    pub use salvo_protocol::{
        Action, Coordinate, GameId, GameSession, GameStatus, PlayerId, Response, Status,
    };
    pub use salvo_session::{Authenticator, SessionError, UuidAuthenticator};
    pub use salvo_store::{MemoryStore, SessionStore, StoreConfig};
}
