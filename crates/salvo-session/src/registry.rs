//! The connection registry: who is connected right now, and how to reach
//! them.
//!
//! Every connected player has one [`ConnectionRecord`] holding the
//! sending half of that connection's outbound channel. Messages put on
//! the channel are written to the socket, in order, by the connection's
//! writer task. When the writer is gone the channel is closed, a send
//! fails, and the registry drops the record. That is the only way a
//! half-open connection gets noticed.
//!
//! The registry is process-local and never authoritative about games.
//! Its game pointer is a routing hint; the session store decides whether
//! a game is actually active.

use std::collections::HashMap;

use salvo_protocol::{GameId, PlayerId, Response};
use salvo_transport::ConnectionId;
use tokio::sync::{mpsc, Mutex};

/// Sending half of a connection's outbound channel.
pub type OutboundSender = mpsc::UnboundedSender<Response>;

/// A live connection for one player.
#[derive(Debug)]
struct ConnectionRecord {
    connection: ConnectionId,
    sender: OutboundSender,
    game_id: Option<GameId>,
}

/// Outcome of [`ConnectionRegistry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The record belonged to this connection and was removed.
    Released { game_id: Option<GameId> },
    /// A newer connection for the same player owns the record now.
    Superseded,
    /// Nothing was registered for the player.
    Absent,
}

/// Maps player identities to their live outbound channels.
///
/// All state sits behind one `tokio::sync::Mutex`, so every operation
/// sees a consistent snapshot. Sends on an unbounded channel never wait,
/// which keeps the lock hold time short even during a broadcast.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    records: Mutex<HashMap<PlayerId, ConnectionRecord>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `player` on `connection`, replacing any previous record.
    ///
    /// Returns the connection that was replaced, if any. Its game pointer
    /// carries over so pushes keep flowing after a reconnect.
    pub async fn register(
        &self,
        player: PlayerId,
        connection: ConnectionId,
        sender: OutboundSender,
    ) -> Option<ConnectionId> {
        let mut records = self.records.lock().await;
        let previous = records.remove(&player);
        let game_id = previous.as_ref().and_then(|r| r.game_id);
        records.insert(
            player,
            ConnectionRecord {
                connection,
                sender,
                game_id,
            },
        );
        let replaced = previous.map(|r| r.connection);
        match replaced {
            Some(old) => tracing::info!(%player, %connection, %old, "connection replaced"),
            None => tracing::debug!(%player, %connection, "connection registered"),
        }
        replaced
    }

    /// Removes the player's record. No-op if absent.
    pub async fn unregister(&self, player: PlayerId) {
        if self.records.lock().await.remove(&player).is_some() {
            tracing::debug!(%player, "connection unregistered");
        }
    }

    /// Removes the player's record only if `connection` still owns it.
    ///
    /// A socket that was replaced by a reconnect must not tear down the
    /// new connection's record when it finally closes.
    pub async fn release(&self, player: PlayerId, connection: ConnectionId) -> Release {
        let mut records = self.records.lock().await;
        match records.get(&player) {
            None => Release::Absent,
            Some(record) if record.connection != connection => Release::Superseded,
            Some(_) => {
                let game_id = records.remove(&player).and_then(|r| r.game_id);
                Release::Released { game_id }
            }
        }
    }

    pub async fn is_connected(&self, player: PlayerId) -> bool {
        self.records.lock().await.contains_key(&player)
    }

    /// Points the player's record at `game`. No-op if not connected.
    pub async fn associate_with_game(&self, player: PlayerId, game: GameId) {
        if let Some(record) = self.records.lock().await.get_mut(&player) {
            if record.game_id != Some(game) {
                tracing::debug!(%player, game_id = %game, "associated with game");
            }
            record.game_id = Some(game);
        }
    }

    /// The game the player's record currently points at.
    pub async fn game_of(&self, player: PlayerId) -> Option<GameId> {
        self.records
            .lock()
            .await
            .get(&player)
            .and_then(|r| r.game_id)
    }

    /// Number of connected players.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Best-effort send to one player.
    ///
    /// Returns `false` if the player isn't connected or the send failed.
    /// A failed send evicts the record.
    pub async fn send_to(&self, player: PlayerId, message: Response) -> bool {
        let mut records = self.records.lock().await;
        let Some(record) = records.get(&player) else {
            tracing::debug!(%player, action = %message.action, "send to unregistered player dropped");
            return false;
        };
        if record.sender.send(message).is_ok() {
            return true;
        }
        let connection = record.connection;
        records.remove(&player);
        tracing::warn!(%player, %connection, "send failed, connection evicted");
        false
    }

    /// Sends to every registered player except `exclude`.
    ///
    /// Failed entries are evicted; the rest still receive the message.
    /// Returns how many sends succeeded.
    pub async fn broadcast(&self, message: &Response, exclude: Option<PlayerId>) -> usize {
        let mut records = self.records.lock().await;
        let mut dead = Vec::new();
        let mut delivered = 0;

        for (player, record) in records.iter() {
            if Some(*player) == exclude {
                continue;
            }
            if record.sender.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*player);
            }
        }

        for player in dead {
            records.remove(&player);
            tracing::warn!(%player, "broadcast failed, connection evicted");
        }
        delivered
    }
}
