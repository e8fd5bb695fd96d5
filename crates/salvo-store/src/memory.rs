//! In-memory [`SessionStore`] with lazy per-key expiry.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use salvo_protocol::{
    Board, Codec, Coordinate, GameId, GameSession, HitRecord, JsonCodec, PlayerId,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::{SessionStore, StoreConfig, StoreError};

/// An in-process session store.
///
/// Records are kept encoded, exactly as a networked store would hold
/// them, under `board:{game}:{player}`, `hits:{game}:{player}`,
/// `session:{game}` and `active_game:{player}`. Each write refreshes the
/// record's expiry; expired records are dropped the next time they are
/// touched. Queues never expire.
///
/// A single lock guards all state, so every trait method (including the
/// read-modify-write in `record_hit` and the pop in `dequeue_other`) is
/// atomic with respect to the others.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    config: StoreConfig,
    codec: JsonCodec,
    unavailable: AtomicBool,
    fail_session_writes: AtomicBool,
}

struct Inner {
    values: HashMap<String, Entry>,
    queues: HashMap<String, VecDeque<PlayerId>>,
}

struct Entry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

impl Inner {
    fn get(&mut self, key: &str, now: Instant) -> Option<&[u8]> {
        if self.values.get(key).is_some_and(|e| e.expires_at <= now) {
            self.values.remove(key);
        }
        self.values.get(key).map(|e| e.bytes.as_slice())
    }
}

fn board_key(game: GameId, player: PlayerId) -> String {
    format!("board:{game}:{player}")
}

fn hits_key(game: GameId, player: PlayerId) -> String {
    format!("hits:{game}:{player}")
}

fn session_key(game: GameId) -> String {
    format!("session:{game}")
}

fn active_key(player: PlayerId) -> String {
    format!("active_game:{player}")
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                values: HashMap::new(),
                queues: HashMap::new(),
            }),
            config,
            codec: JsonCodec,
            unavailable: AtomicBool::new(false),
            fail_session_writes: AtomicBool::new(false),
        }
    }

    /// Makes every operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes `save_session` fail while everything else keeps working.
    pub fn set_fail_session_writes(&self, fail: bool) {
        self.fail_session_writes.store(fail, Ordering::SeqCst);
    }

    /// Current contents of `queue`, front first.
    pub async fn queue_snapshot(&self, queue: &str) -> Vec<PlayerId> {
        let inner = self.inner.lock().await;
        inner
            .queues
            .get(queue)
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        Ok(())
    }

    fn encode<T: Serialize>(&self, key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
        self.codec.encode(value).map_err(|source| StoreError::Corrupt {
            key: key.to_owned(),
            source,
        })
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T, StoreError> {
        self.codec.decode(bytes).map_err(|source| {
            tracing::error!(key, error = %source, "undecodable record in store");
            StoreError::Corrupt {
                key: key.to_owned(),
                source,
            }
        })
    }

    async fn read<T: DeserializeOwned>(&self, key: String) -> Result<Option<T>, StoreError> {
        self.check_available()?;
        let bytes = {
            let mut inner = self.inner.lock().await;
            inner.get(&key, Instant::now()).map(<[u8]>::to_vec)
        };
        bytes.map(|b| self.decode(&key, &b)).transpose()
    }

    async fn write<T: Serialize + Sync>(&self, key: String, value: &T) -> Result<(), StoreError> {
        self.check_available()?;
        let bytes = self.encode(&key, value)?;
        let expires_at = Instant::now() + self.config.record_ttl;
        self.inner
            .lock()
            .await
            .values
            .insert(key, Entry { bytes, expires_at });
        Ok(())
    }

    async fn delete(&self, key: String) -> Result<(), StoreError> {
        self.check_available()?;
        self.inner.lock().await.values.remove(&key);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl SessionStore for MemoryStore {
    async fn save_board(
        &self,
        game: GameId,
        player: PlayerId,
        board: &Board,
    ) -> Result<(), StoreError> {
        self.write(board_key(game, player), board).await
    }

    async fn get_board(&self, game: GameId, player: PlayerId) -> Result<Option<Board>, StoreError> {
        self.read(board_key(game, player)).await
    }

    async fn get_hits(&self, game: GameId, player: PlayerId) -> Result<HitRecord, StoreError> {
        Ok(self
            .read(hits_key(game, player))
            .await?
            .unwrap_or_default())
    }

    async fn record_hit(
        &self,
        game: GameId,
        player: PlayerId,
        ship: &str,
        cell: Coordinate,
    ) -> Result<HitRecord, StoreError> {
        self.check_available()?;
        let key = hits_key(game, player);
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let mut hits: HitRecord = match inner.get(&key, now) {
            Some(bytes) => self.decode(&key, bytes)?,
            None => HitRecord::default(),
        };
        if hits.record(ship, cell) {
            tracing::debug!(%game, %player, ship, %cell, "hit recorded");
        }
        let bytes = self.encode(&key, &hits)?;
        inner.values.insert(
            key,
            Entry {
                bytes,
                expires_at: now + self.config.record_ttl,
            },
        );
        Ok(hits)
    }

    async fn enqueue(&self, queue: &str, player: PlayerId) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        inner
            .queues
            .entry(queue.to_owned())
            .or_default()
            .push_back(player);
        Ok(())
    }

    async fn dequeue_other(
        &self,
        queue: &str,
        exclude: PlayerId,
    ) -> Result<Option<PlayerId>, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let Some(entries) = inner.queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some(pos) = entries.iter().position(|p| *p != exclude) else {
            return Ok(None);
        };
        let popped = entries.remove(pos);
        if let Some(popped) = popped {
            entries.retain(|p| *p != popped);
        }
        Ok(popped)
    }

    async fn remove_from_queue(&self, queue: &str, player: PlayerId) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let Some(entries) = inner.queues.get_mut(queue) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|p| *p != player);
        Ok(entries.len() != before)
    }

    async fn is_queued(&self, queue: &str, player: PlayerId) -> Result<bool, StoreError> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .queues
            .get(queue)
            .is_some_and(|entries| entries.contains(&player)))
    }

    async fn save_session(&self, session: &GameSession) -> Result<(), StoreError> {
        if self.fail_session_writes.load(Ordering::SeqCst) {
            tracing::warn!(game_id = %session.game_id, "session write rejected (fault injected)");
            return Err(StoreError::Unavailable("session write rejected".into()));
        }
        self.write(session_key(session.game_id), session).await
    }

    async fn load_session(&self, game: GameId) -> Result<Option<GameSession>, StoreError> {
        self.read(session_key(game)).await
    }

    async fn set_active_game(&self, player: PlayerId, game: GameId) -> Result<(), StoreError> {
        self.write(active_key(player), &game).await
    }

    async fn get_active_game(&self, player: PlayerId) -> Result<Option<GameId>, StoreError> {
        self.read(active_key(player)).await
    }

    async fn clear_active_game(&self, player: PlayerId) -> Result<(), StoreError> {
        self.delete(active_key(player)).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn cell(s: &str) -> Coordinate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_get_board_absent_is_none_not_error() {
        let store = MemoryStore::default();
        let got = store
            .get_board(GameId::new_random(), PlayerId::new_random())
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_record_hit_twice_same_as_once() {
        let store = MemoryStore::default();
        let game = GameId::new_random();
        let player = PlayerId::new_random();

        let once = store.record_hit(game, player, "Sub", cell("A1")).await.unwrap();
        let twice = store.record_hit(game, player, "Sub", cell("A1")).await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(store.get_hits(game, player).await.unwrap(), once);
    }

    #[tokio::test]
    async fn test_dequeue_other_skips_excluded_and_keeps_fifo() {
        let store = MemoryStore::default();
        let (a, b, c) = (
            PlayerId::new_random(),
            PlayerId::new_random(),
            PlayerId::new_random(),
        );
        store.enqueue("q", a).await.unwrap();
        store.enqueue("q", b).await.unwrap();

        assert_eq!(store.dequeue_other("q", a).await.unwrap(), Some(b));
        assert_eq!(store.dequeue_other("q", a).await.unwrap(), None);
        assert_eq!(store.dequeue_other("q", c).await.unwrap(), Some(a));
        assert!(store.queue_snapshot("q").await.is_empty());
    }

    #[tokio::test]
    async fn test_dequeue_other_drops_duplicate_entries_of_popped() {
        let store = MemoryStore::default();
        let a = PlayerId::new_random();
        let b = PlayerId::new_random();
        store.enqueue("q", a).await.unwrap();
        store.enqueue("q", a).await.unwrap();

        assert_eq!(store.dequeue_other("q", b).await.unwrap(), Some(a));
        assert_eq!(store.dequeue_other("q", b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_from_queue_is_idempotent() {
        let store = MemoryStore::default();
        let a = PlayerId::new_random();
        store.enqueue("q", a).await.unwrap();
        assert!(store.is_queued("q", a).await.unwrap());
        assert!(store.remove_from_queue("q", a).await.unwrap());
        assert!(!store.remove_from_queue("q", a).await.unwrap());
        assert!(!store.is_queued("q", a).await.unwrap());
    }

    #[tokio::test]
    async fn test_records_expire_after_ttl() {
        let store = MemoryStore::new(StoreConfig {
            record_ttl: Duration::from_millis(30),
        });
        let player = PlayerId::new_random();
        let game = GameId::new_random();
        store.set_active_game(player, game).await.unwrap();
        assert_eq!(store.get_active_game(player).await.unwrap(), Some(game));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get_active_game(player).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fail_session_writes_only_affects_sessions() {
        let store = MemoryStore::default();
        store.set_fail_session_writes(true);
        let session = GameSession::new(
            GameId::new_random(),
            [PlayerId::new_random(), PlayerId::new_random()],
            0,
        );
        assert!(matches!(
            store.save_session(&session).await,
            Err(StoreError::Unavailable(_))
        ));
        store
            .set_active_game(session.players[0], session.game_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_is_distinct_from_not_found() {
        let store = MemoryStore::default();
        store.set_unavailable(true);
        let result = store.load_session(GameId::new_random()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        store.set_unavailable(false);
        assert!(store.load_session(GameId::new_random()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_surfaces_as_corrupt() {
        let store = MemoryStore::default();
        let game = GameId::new_random();
        store.inner.lock().await.values.insert(
            session_key(game),
            Entry {
                bytes: b"{oops".to_vec(),
                expires_at: Instant::now() + Duration::from_secs(60),
            },
        );
        assert!(matches!(
            store.load_session(game).await,
            Err(StoreError::Corrupt { .. })
        ));
    }
}
