//! Matchmaking and the turn engine for Salvo.
//!
//! - [`Matchmaker`]: pairs waiting players, creates sessions, resumes
//!   players who reconnect into a running game.
//! - [`GameEngine`]: placement, shots, win detection, forfeits and
//!   disconnect bookkeeping.
//! - [`GameLocks`]: the per-game mutex table both of them share.
//!
//! Both are generic over [`SessionStore`](salvo_store::SessionStore) and
//! return plain outcome values; turning those into wire messages is the
//! dispatcher's job.

mod clock;
mod config;
mod engine;
mod error;
mod locks;
mod matchmaker;

pub use clock::unix_now;
pub use config::GameConfig;
pub use engine::{DisconnectNotice, GameEngine, PlacementOutcome, ShotOutcome};
pub use error::GameError;
pub use locks::GameLocks;
pub use matchmaker::{FindOutcome, Matchmaker};
