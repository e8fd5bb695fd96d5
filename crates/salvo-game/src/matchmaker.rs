//! Pairs players into games, or parks them in the queue.
//!
//! ```text
//! find_game_session(P)
//!   ├─ P has a live game and the opponent is still here → Resumed
//!   ├─ P already queued                                 → Waiting
//!   ├─ someone else is queued  → create session         → Paired
//!   └─ queue empty             → enqueue P              → Waiting
//! ```
//!
//! The store's `dequeue_other` is the atomic step: an entry handed to one
//! caller is gone for everybody else. Within this process, pairing is
//! also serialized by a mutex so two players arriving together end up
//! matched with each other rather than both waiting.

use std::sync::Arc;

use salvo_protocol::{GameId, GameSession, PlayerId};
use salvo_session::ConnectionRegistry;
use salvo_store::{SessionStore, StoreError};
use tokio::sync::Mutex;

use crate::clock::unix_now;
use crate::{GameConfig, GameError, GameLocks};

/// Result of [`Matchmaker::find_game_session`].
#[derive(Debug, Clone, PartialEq)]
pub enum FindOutcome {
    /// The player was put back into a game already in progress.
    Resumed {
        session: GameSession,
        opponent: PlayerId,
    },
    /// Paired with a waiting opponent; the session is in `PlacingShips`.
    Paired {
        session: GameSession,
        opponent: PlayerId,
    },
    /// Queued (or already queued) for the next opponent.
    Waiting,
}

pub struct Matchmaker<S> {
    store: Arc<S>,
    registry: Arc<ConnectionRegistry>,
    locks: Arc<GameLocks>,
    config: GameConfig,
    pairing: Mutex<()>,
}

impl<S: SessionStore> Matchmaker<S> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<ConnectionRegistry>,
        locks: Arc<GameLocks>,
        config: GameConfig,
    ) -> Self {
        Self {
            store,
            registry,
            locks,
            config,
            pairing: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Resolves a "find me a game" request.
    pub async fn find_game_session(&self, player: PlayerId) -> Result<FindOutcome, GameError> {
        if let Some((session, opponent)) = self.try_resume(player).await? {
            return Ok(FindOutcome::Resumed { session, opponent });
        }

        let queue = self.config.queue_name.as_str();
        let _pairing = self.pairing.lock().await;

        if self.store.is_queued(queue, player).await? {
            tracing::debug!(%player, "already queued");
            return Ok(FindOutcome::Waiting);
        }

        match self.store.dequeue_other(queue, player).await? {
            Some(opponent) if opponent == player => {
                tracing::error!(%player, "queue returned the requester as its own opponent");
                self.store.enqueue(queue, player).await?;
                Err(GameError::QueueCorrupted(player))
            }
            Some(opponent) => self.pair(player, opponent).await,
            None => {
                self.store.enqueue(queue, player).await?;
                tracing::info!(%player, queue, "player queued");
                Ok(FindOutcome::Waiting)
            }
        }
    }

    /// Checks whether `player` can drop straight back into a running game.
    ///
    /// A resume needs all of: an active-game pointer, a session that is
    /// not finished and lists the player, a connected opponent, and an
    /// opponent pointer naming the same game. If any of these fail the
    /// player's pointer is cleared and `None` is returned.
    pub async fn try_resume(
        &self,
        player: PlayerId,
    ) -> Result<Option<(GameSession, PlayerId)>, GameError> {
        let Some(game) = self.store.get_active_game(player).await? else {
            return Ok(None);
        };

        let _guard = self.locks.lock(game).await;
        let Some(mut session) = self.store.load_session(game).await? else {
            return self.abandon(player, game, "session gone").await;
        };
        if session.status.is_finished() {
            return self.abandon(player, game, "session finished").await;
        }
        let Some(opponent) = session.opponent_of(player) else {
            return self.abandon(player, game, "not a player in session").await;
        };
        if !self.registry.is_connected(opponent).await {
            return self.abandon(player, game, "opponent not connected").await;
        }
        if self.store.get_active_game(opponent).await? != Some(game) {
            return self.abandon(player, game, "opponent left the game").await;
        }

        if session.clear_disconnection(player) {
            self.store.save_session(&session).await?;
        }
        self.registry.associate_with_game(player, game).await;
        tracing::info!(%player, game_id = %game, %opponent, "game resumed");
        Ok(Some((session, opponent)))
    }

    /// Removes every queue entry for `player`. Returns `true` if any existed.
    pub async fn cancel(&self, player: PlayerId) -> Result<bool, GameError> {
        let removed = self
            .store
            .remove_from_queue(&self.config.queue_name, player)
            .await?;
        if removed {
            tracing::debug!(%player, "removed from queue");
        }
        Ok(removed)
    }

    /// Queue removal for a player whose connection just went away.
    ///
    /// Runs under the pairing lock and skips players who already have a
    /// live connection again, so an entry queued by the reconnect stays.
    /// Returns `None` for such a player, otherwise whether any entry was
    /// removed.
    pub async fn withdraw(&self, player: PlayerId) -> Result<Option<bool>, GameError> {
        let _pairing = self.pairing.lock().await;
        if self.registry.is_connected(player).await {
            tracing::debug!(%player, "player reconnected, keeping queue entry");
            return Ok(None);
        }
        self.cancel(player).await.map(Some)
    }

    /// The game the store says `player` is in.
    pub async fn active_game(&self, player: PlayerId) -> Result<Option<GameId>, GameError> {
        Ok(self.store.get_active_game(player).await?)
    }

    async fn abandon(
        &self,
        player: PlayerId,
        game: GameId,
        reason: &str,
    ) -> Result<Option<(GameSession, PlayerId)>, GameError> {
        tracing::warn!(%player, game_id = %game, reason, "clearing dead game pointer");
        self.store.clear_active_game(player).await?;
        Ok(None)
    }

    async fn pair(&self, requester: PlayerId, opponent: PlayerId) -> Result<FindOutcome, GameError> {
        let session = GameSession::new(GameId::new_random(), [opponent, requester], unix_now());
        let game = session.game_id;

        if let Err(e) = self.persist_pairing(&session).await {
            tracing::error!(game_id = %game, %requester, %opponent, error = %e, "pairing failed, re-queueing both");
            self.roll_back(&session).await;
            return Err(GameError::PairingFailed(e));
        }

        self.registry.associate_with_game(opponent, game).await;
        self.registry.associate_with_game(requester, game).await;
        tracing::info!(game_id = %game, %requester, %opponent, "players paired");
        Ok(FindOutcome::Paired { session, opponent })
    }

    async fn persist_pairing(&self, session: &GameSession) -> Result<(), StoreError> {
        self.store.save_session(session).await?;
        for player in session.players {
            self.store.set_active_game(player, session.game_id).await?;
        }
        Ok(())
    }

    async fn roll_back(&self, session: &GameSession) {
        let queue = self.config.queue_name.as_str();
        for player in session.players {
            if let Err(e) = self.store.clear_active_game(player).await {
                tracing::error!(%player, error = %e, "rollback: failed to clear game pointer");
            }
            if let Err(e) = self.store.enqueue(queue, player).await {
                tracing::error!(%player, error = %e, "rollback: failed to re-queue");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use salvo_protocol::GameStatus;
    use salvo_store::MemoryStore;
    use salvo_transport::ConnectionId;
    use tokio::sync::mpsc;

    use super::*;

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: Arc<ConnectionRegistry>,
        matchmaker: Matchmaker<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let registry = Arc::new(ConnectionRegistry::new());
        let matchmaker = Matchmaker::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::new(GameLocks::new()),
            GameConfig::default(),
        );
        Fixture {
            store,
            registry,
            matchmaker,
        }
    }

    /// Registers `player`; the returned receiver keeps the channel open.
    async fn connect(
        registry: &ConnectionRegistry,
        player: PlayerId,
        id: u64,
    ) -> mpsc::UnboundedReceiver<salvo_protocol::Response> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(player, ConnectionId::new(id), tx).await;
        rx
    }

    const QUEUE: &str = "matchmaking:queue";

    #[tokio::test]
    async fn test_find_game_first_player_waits() {
        let f = fixture();
        let a = PlayerId::new_random();
        assert_eq!(f.matchmaker.find_game_session(a).await.unwrap(), FindOutcome::Waiting);
        assert_eq!(f.store.queue_snapshot(QUEUE).await, vec![a]);
    }

    #[tokio::test]
    async fn test_find_game_twice_does_not_double_enqueue() {
        let f = fixture();
        let a = PlayerId::new_random();
        f.matchmaker.find_game_session(a).await.unwrap();
        assert_eq!(f.matchmaker.find_game_session(a).await.unwrap(), FindOutcome::Waiting);
        assert_eq!(f.store.queue_snapshot(QUEUE).await.len(), 1);
    }

    #[tokio::test]
    async fn test_withdraw_offline_player_leaves_queue() {
        let f = fixture();
        let a = PlayerId::new_random();
        f.matchmaker.find_game_session(a).await.unwrap();
        assert_eq!(f.matchmaker.withdraw(a).await.unwrap(), Some(true));
        assert!(f.store.queue_snapshot(QUEUE).await.is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_reconnected_player_keeps_entry() {
        let f = fixture();
        let a = PlayerId::new_random();
        let _rx = connect(&f.registry, a, 7).await;
        f.matchmaker.find_game_session(a).await.unwrap();

        assert_eq!(f.matchmaker.withdraw(a).await.unwrap(), None);
        assert_eq!(f.store.queue_snapshot(QUEUE).await, vec![a]);
    }

    #[tokio::test]
    async fn test_find_game_second_player_pairs() {
        let f = fixture();
        let (a, b) = (PlayerId::new_random(), PlayerId::new_random());
        let _rx_a = connect(&f.registry, a, 1).await;
        let _rx_b = connect(&f.registry, b, 2).await;

        f.matchmaker.find_game_session(a).await.unwrap();
        let FindOutcome::Paired { session, opponent } =
            f.matchmaker.find_game_session(b).await.unwrap()
        else {
            panic!("expected pairing");
        };

        assert_eq!(opponent, a);
        assert_eq!(session.status, GameStatus::PlacingShips);
        assert_eq!(session.current_turn, None);
        assert_eq!(session.players, [a, b]);
        assert!(f.store.queue_snapshot(QUEUE).await.is_empty());
        assert_eq!(f.store.get_active_game(a).await.unwrap(), Some(session.game_id));
        assert_eq!(f.store.get_active_game(b).await.unwrap(), Some(session.game_id));
        assert_eq!(f.registry.game_of(a).await, Some(session.game_id));
        assert!(f.store.load_session(session.game_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_find_game_pairing_is_fifo() {
        let f = fixture();
        let (a, b, c) = (
            PlayerId::new_random(),
            PlayerId::new_random(),
            PlayerId::new_random(),
        );
        f.store.enqueue(QUEUE, a).await.unwrap();
        f.store.enqueue(QUEUE, b).await.unwrap();

        let outcome = f.matchmaker.find_game_session(c).await.unwrap();
        assert!(matches!(outcome, FindOutcome::Paired { opponent, .. } if opponent == a));
        assert_eq!(f.store.queue_snapshot(QUEUE).await, vec![b]);
    }

    #[tokio::test]
    async fn test_find_game_store_failure_rolls_back_both() {
        let f = fixture();
        let (a, b) = (PlayerId::new_random(), PlayerId::new_random());
        f.matchmaker.find_game_session(a).await.unwrap();
        f.store.set_fail_session_writes(true);

        let err = f.matchmaker.find_game_session(b).await.unwrap_err();
        assert!(matches!(err, GameError::PairingFailed(_)));

        let queued = f.store.queue_snapshot(QUEUE).await;
        assert!(queued.contains(&a));
        assert!(queued.contains(&b));
        assert_eq!(f.store.get_active_game(a).await.unwrap(), None);
        assert_eq!(f.store.get_active_game(b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_game_resumes_when_opponent_connected() {
        let f = fixture();
        let (a, b) = (PlayerId::new_random(), PlayerId::new_random());
        let _rx_a = connect(&f.registry, a, 1).await;
        let _rx_b = connect(&f.registry, b, 2).await;
        f.matchmaker.find_game_session(a).await.unwrap();
        let FindOutcome::Paired { session, .. } = f.matchmaker.find_game_session(b).await.unwrap()
        else {
            panic!("expected pairing");
        };

        match f.matchmaker.find_game_session(a).await.unwrap() {
            FindOutcome::Resumed { session: resumed, opponent } => {
                assert_eq!(resumed.game_id, session.game_id);
                assert_eq!(opponent, b);
            }
            other => panic!("expected resume, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_game_clears_pointer_when_opponent_gone() {
        let f = fixture();
        let (a, b) = (PlayerId::new_random(), PlayerId::new_random());
        let _rx_a = connect(&f.registry, a, 1).await;
        f.matchmaker.find_game_session(a).await.unwrap();
        f.matchmaker.find_game_session(b).await.unwrap();
        // b never registered a connection.

        let outcome = f.matchmaker.find_game_session(a).await.unwrap();
        assert_eq!(outcome, FindOutcome::Waiting);
        assert_eq!(f.store.get_active_game(a).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_try_resume_rejects_when_opponent_pointer_moved() {
        let f = fixture();
        let (a, b) = (PlayerId::new_random(), PlayerId::new_random());
        let _rx_a = connect(&f.registry, a, 1).await;
        let _rx_b = connect(&f.registry, b, 2).await;
        f.matchmaker.find_game_session(a).await.unwrap();
        f.matchmaker.find_game_session(b).await.unwrap();
        f.store.set_active_game(b, GameId::new_random()).await.unwrap();

        assert!(f.matchmaker.try_resume(a).await.unwrap().is_none());
        assert_eq!(f.store.get_active_game(a).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_try_resume_clears_disconnection_entry() {
        let f = fixture();
        let (a, b) = (PlayerId::new_random(), PlayerId::new_random());
        let _rx_a = connect(&f.registry, a, 1).await;
        let _rx_b = connect(&f.registry, b, 2).await;
        f.matchmaker.find_game_session(a).await.unwrap();
        let FindOutcome::Paired { mut session, .. } =
            f.matchmaker.find_game_session(b).await.unwrap()
        else {
            panic!("expected pairing");
        };
        session.record_disconnection(salvo_protocol::Disconnection {
            player_id: a,
            at: 1,
            reconnect_window_secs: 300,
        });
        f.store.save_session(&session).await.unwrap();

        let (resumed, _) = f.matchmaker.try_resume(a).await.unwrap().unwrap();
        assert!(resumed.disconnections.is_empty());
        let stored = f.store.load_session(session.game_id).await.unwrap().unwrap();
        assert!(stored.disconnections.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_find_pairs_exactly_once() {
        let f = Arc::new(fixture());
        let (a, b) = (PlayerId::new_random(), PlayerId::new_random());

        let fa = Arc::clone(&f);
        let fb = Arc::clone(&f);
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { fa.matchmaker.find_game_session(a).await.unwrap() }),
            tokio::spawn(async move { fb.matchmaker.find_game_session(b).await.unwrap() }),
        );
        let outcomes = [ra.unwrap(), rb.unwrap()];

        let paired = outcomes
            .iter()
            .filter(|o| matches!(o, FindOutcome::Paired { .. }))
            .count();
        assert_eq!(paired, 1);
        assert!(f.store.queue_snapshot(QUEUE).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_removes_queue_entry() {
        let f = fixture();
        let a = PlayerId::new_random();
        f.matchmaker.find_game_session(a).await.unwrap();
        assert!(f.matchmaker.cancel(a).await.unwrap());
        assert!(!f.matchmaker.cancel(a).await.unwrap());
    }
}
