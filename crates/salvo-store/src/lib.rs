//! Session store contract for Salvo.
//!
//! The store is the single source of truth for everything that must
//! outlive a connection: the matchmaking queue, each player's board and
//! hit record, the game-session document, and the per-player active-game
//! pointer. The game layer talks to it only through [`SessionStore`].
//!
//! [`MemoryStore`] is the in-process backend. It keeps the same key
//! layout and expiry behaviour a networked key-value store would, so the
//! rest of the system can't tell the difference.

mod config;
mod error;
mod memory;

pub use config::StoreConfig;
pub use error::StoreError;
pub use memory::MemoryStore;

use std::future::Future;

use salvo_protocol::{Board, Coordinate, GameId, GameSession, HitRecord, PlayerId};

/// Repository contract consumed by the matchmaker and game engine.
///
/// Every method is one round-trip to the store. Absent records come back
/// as `Ok(None)` (or an empty value); `Err` always means the store failed.
///
/// The methods return `Send` futures so callers can hold a store behind
/// an `Arc` and use it from spawned tasks. Implementations may simply
/// write `async fn`.
pub trait SessionStore: Send + Sync + 'static {
    // -- boards and hits ----------------------------------------------------

    fn save_board(
        &self,
        game: GameId,
        player: PlayerId,
        board: &Board,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_board(
        &self,
        game: GameId,
        player: PlayerId,
    ) -> impl Future<Output = Result<Option<Board>, StoreError>> + Send;

    /// Hits recorded against `player`'s board. Empty if none.
    fn get_hits(
        &self,
        game: GameId,
        player: PlayerId,
    ) -> impl Future<Output = Result<HitRecord, StoreError>> + Send;

    /// Appends a hit on `player`'s `ship` and returns the updated record.
    ///
    /// Idempotent: recording the same cell twice leaves the record as if
    /// it had been recorded once.
    fn record_hit(
        &self,
        game: GameId,
        player: PlayerId,
        ship: &str,
        cell: Coordinate,
    ) -> impl Future<Output = Result<HitRecord, StoreError>> + Send;

    // -- queue --------------------------------------------------------------

    /// Appends `player` to the back of `queue`.
    fn enqueue(
        &self,
        queue: &str,
        player: PlayerId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically pops the oldest entry that is not `exclude`.
    ///
    /// Any further entries for the popped player are dropped too, so a
    /// duplicated entry can never be paired twice.
    fn dequeue_other(
        &self,
        queue: &str,
        exclude: PlayerId,
    ) -> impl Future<Output = Result<Option<PlayerId>, StoreError>> + Send;

    /// Removes every entry for `player`. Returns `true` if any existed.
    fn remove_from_queue(
        &self,
        queue: &str,
        player: PlayerId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn is_queued(
        &self,
        queue: &str,
        player: PlayerId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    // -- sessions -----------------------------------------------------------

    fn save_session(
        &self,
        session: &GameSession,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load_session(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Option<GameSession>, StoreError>> + Send;

    // -- active-game index --------------------------------------------------

    fn set_active_game(
        &self,
        player: PlayerId,
        game: GameId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_active_game(
        &self,
        player: PlayerId,
    ) -> impl Future<Output = Result<Option<GameId>, StoreError>> + Send;

    fn clear_active_game(
        &self,
        player: PlayerId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
