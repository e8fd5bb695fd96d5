//! Per-game serialization.
//!
//! Every read-modify-write of a session document (placement, shot,
//! forfeit, disconnect bookkeeping, resume) runs while holding that
//! game's lock. Two shots arriving together for the same game are
//! therefore resolved one after the other, and the second one sees the
//! turn the first one wrote.
//!
//! Entries exist only while someone holds or waits on them: the last
//! [`GameGuard`] to drop removes its game from the table, so ids that
//! never name a real game leave nothing behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};

use salvo_protocol::GameId;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Table = HashMap<GameId, Arc<Mutex<()>>>;

/// Lazily created async mutex per game id.
#[derive(Debug, Default)]
pub struct GameLocks {
    // Short, non-async critical sections only, so `GameGuard::drop` can
    // clean up without a runtime.
    table: Arc<SyncMutex<Table>>,
}

/// Exclusive access to one game. Dropping it releases the lock and, if
/// nobody else is waiting, the table entry.
#[derive(Debug)]
pub struct GameGuard {
    game: GameId,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<SyncMutex<Table>>,
}

impl GameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `game`.
    pub async fn lock(&self, game: GameId) -> GameGuard {
        let slot = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(game).or_default())
        };
        GameGuard {
            game,
            guard: Some(slot.lock_owned().await),
            table: Arc::clone(&self.table),
        }
    }

    /// Number of games with a live lock entry.
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for GameGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the table's own reference left: no holder, no waiter.
        if table.get(&self.game).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            table.remove(&self.game);
        }
    }
}
