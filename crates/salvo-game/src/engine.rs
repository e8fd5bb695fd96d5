//! The turn engine: ship placement, shot resolution, win detection.
//!
//! All mutations of a session document happen here, each one under that
//! game's lock from [`GameLocks`]. A shot's turn check, hit bookkeeping
//! and turn flip therefore form one step: the flipped turn is written in
//! the same `save_session` call that carries the outcome, and a second
//! shot waiting on the lock reads the new turn.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use salvo_protocol::payloads::{GameInfo, SessionView, ShotReport};
use salvo_protocol::{
    Board, Coordinate, Disconnection, GameId, GameSession, GameStatus, PlayerId,
};
use salvo_store::SessionStore;

use crate::clock::unix_now;
use crate::{GameConfig, GameError, GameLocks};

/// Result of a placement (single-player or bulk).
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    /// Board saved; `waiting_for` hasn't placed yet.
    Waiting { waiting_for: PlayerId },
    /// Both boards are in and the battle has begun.
    BattleStarted { session: GameSession },
}

/// Result of a resolved shot.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotOutcome {
    /// The session as written after the shot.
    pub session: GameSession,
    pub defender: PlayerId,
    pub report: ShotReport,
}

/// Bookkeeping result of a mid-game disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectNotice {
    pub opponent: PlayerId,
    pub reconnect_window_secs: u64,
}

pub struct GameEngine<S> {
    store: Arc<S>,
    locks: Arc<GameLocks>,
    config: GameConfig,
}

impl<S: SessionStore> GameEngine<S> {
    pub fn new(store: Arc<S>, locks: Arc<GameLocks>, config: GameConfig) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Saves `player`'s board. Starts the battle once both boards exist.
    ///
    /// Re-placing before the battle overwrites the previous board.
    pub async fn place_ships(
        &self,
        game: GameId,
        player: PlayerId,
        board: Board,
    ) -> Result<PlacementOutcome, GameError> {
        validate_board(&board)?;

        let _guard = self.locks.lock(game).await;
        let mut session = self.load_placeable(game).await?;
        if !session.contains(player) {
            return Err(GameError::NotAPlayer { game, player });
        }

        self.store.save_board(game, player, &board).await?;
        tracing::info!(%player, game_id = %game, ships = board.len(), "ships placed");

        self.begin_if_ready(&mut session).await
    }

    /// Places both boards at once (administrative path).
    ///
    /// Every board is validated and every key checked against the
    /// session before anything is written.
    pub async fn start_game(
        &self,
        game: GameId,
        boards: BTreeMap<PlayerId, Board>,
    ) -> Result<PlacementOutcome, GameError> {
        for board in boards.values() {
            validate_board(board)?;
        }

        let _guard = self.locks.lock(game).await;
        let mut session = self.load_placeable(game).await?;
        if let Some(stranger) = boards.keys().find(|p| !session.contains(**p)) {
            return Err(GameError::NotAPlayer {
                game,
                player: *stranger,
            });
        }

        for (player, board) in &boards {
            self.store.save_board(game, *player, board).await?;
        }
        tracing::info!(game_id = %game, boards = boards.len(), "bulk placement");

        self.begin_if_ready(&mut session).await
    }

    async fn load_placeable(&self, game: GameId) -> Result<GameSession, GameError> {
        let session = self
            .store
            .load_session(game)
            .await?
            .ok_or(GameError::GameNotFound(game))?;
        match session.status {
            GameStatus::PlacingShips => Ok(session),
            GameStatus::InProgress => Err(GameError::GameAlreadyStarted(game)),
            GameStatus::WaitingForOpponent | GameStatus::Finished => {
                Err(GameError::GameNotActive(game))
            }
        }
    }

    /// Starts the battle once both boards exist. Caller holds the lock.
    async fn begin_if_ready(
        &self,
        session: &mut GameSession,
    ) -> Result<PlacementOutcome, GameError> {
        let game = session.game_id;
        for player in session.players {
            if self.store.get_board(game, player).await?.is_none() {
                return Ok(PlacementOutcome::Waiting {
                    waiting_for: player,
                });
            }
        }

        let first = session.players[rand::rng().random_range(0..2)];
        session.status = GameStatus::InProgress;
        session.current_turn = Some(first);
        self.store.save_session(session).await?;

        tracing::info!(game_id = %game, first_turn = %first, "battle started");
        Ok(PlacementOutcome::BattleStarted {
            session: session.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Shots
    // -----------------------------------------------------------------------

    /// Resolves `shooter`'s shot at `target`.
    ///
    /// Rejections (`GameNotFound`, `GameNotActive`, `NotAPlayer`,
    /// `NotYourTurn`, `OpponentNotFound`, `OpponentBoardMissing`) leave
    /// every record untouched. A resolved shot always hands the turn to
    /// the defender, hit or miss, unless it ends the game.
    pub async fn shoot(
        &self,
        game: GameId,
        shooter: PlayerId,
        target: Coordinate,
    ) -> Result<ShotOutcome, GameError> {
        let _guard = self.locks.lock(game).await;

        let mut session = self
            .store
            .load_session(game)
            .await?
            .ok_or(GameError::GameNotFound(game))?;
        if !session.status.is_active() {
            return Err(GameError::GameNotActive(game));
        }
        if !session.contains(shooter) {
            return Err(GameError::NotAPlayer {
                game,
                player: shooter,
            });
        }
        if session.current_turn != Some(shooter) {
            return Err(GameError::NotYourTurn);
        }
        let defender = session
            .opponent_of(shooter)
            .ok_or(GameError::OpponentNotFound(game))?;
        let board = self.store.get_board(game, defender).await?.ok_or_else(|| {
            tracing::error!(game_id = %game, %defender, "battle running without defender board");
            GameError::OpponentBoardMissing(game)
        })?;

        let ship_id = board.ship_at(&target).cloned();
        let (sunk, fleet_destroyed) = match &ship_id {
            Some(ship) => {
                // Outcome from the stored hits plus this cell; nothing is
                // written until the session has taken the turn change.
                let mut hits = self.store.get_hits(game, defender).await?;
                hits.record(ship, target);
                (hits.is_sunk(&board, ship), hits.all_sunk(&board))
            }
            None => (false, false),
        };

        if fleet_destroyed {
            session.finish(Some(shooter), unix_now());
        } else {
            session.current_turn = Some(defender);
        }
        self.store.save_session(&session).await?;

        if let Some(ship) = &ship_id {
            // The turn has already moved on. A lost hit is re-recorded
            // the next time the cell is fired at.
            if let Err(e) = self.store.record_hit(game, defender, ship, target).await {
                tracing::error!(game_id = %game, %defender, %target, error = %e, "hit not recorded after turn change");
            }
        }

        tracing::debug!(
            game_id = %game,
            %shooter,
            %target,
            hit = ship_id.is_some(),
            sunk,
            "shot resolved"
        );
        if fleet_destroyed {
            tracing::info!(game_id = %game, winner = %shooter, "game over");
            self.release_game(&session).await;
        }

        let report = ShotReport {
            game_id: game,
            shooter,
            target,
            hit: ship_id.is_some(),
            ship_id,
            sunk,
            next_turn: session.current_turn,
            game_over: fleet_destroyed,
        };
        Ok(ShotOutcome {
            session,
            defender,
            report,
        })
    }

    // -----------------------------------------------------------------------
    // Ending and disconnects
    // -----------------------------------------------------------------------

    /// Finishes a game explicitly (forfeit or cleanup).
    ///
    /// Idempotent: ending an already finished game returns it unchanged.
    pub async fn end_game(
        &self,
        game: GameId,
        winner: Option<PlayerId>,
    ) -> Result<GameSession, GameError> {
        let _guard = self.locks.lock(game).await;
        let mut session = self
            .store
            .load_session(game)
            .await?
            .ok_or(GameError::GameNotFound(game))?;
        if let Some(player) = winner.filter(|w| !session.contains(*w)) {
            return Err(GameError::NotAPlayer { game, player });
        }
        if !session.finish(winner, unix_now()) {
            return Ok(session);
        }
        self.store.save_session(&session).await?;
        tracing::info!(game_id = %game, winner = ?winner, "game ended");
        self.release_game(&session).await;
        Ok(session)
    }

    /// Notes that `player` dropped out of `game`.
    ///
    /// Returns who to tell, or `None` if the game is gone, finished, or
    /// doesn't include the player.
    pub async fn record_disconnect(
        &self,
        game: GameId,
        player: PlayerId,
    ) -> Result<Option<DisconnectNotice>, GameError> {
        let _guard = self.locks.lock(game).await;
        let Some(mut session) = self.store.load_session(game).await? else {
            return Ok(None);
        };
        if session.status.is_finished() {
            return Ok(None);
        }
        let Some(opponent) = session.opponent_of(player) else {
            return Ok(None);
        };

        let reconnect_window_secs = self.config.reconnect_window.as_secs();
        session.record_disconnection(Disconnection {
            player_id: player,
            at: unix_now(),
            reconnect_window_secs,
        });
        self.store.save_session(&session).await?;
        tracing::info!(%player, game_id = %game, reconnect_window_secs, "player left running game");

        Ok(Some(DisconnectNotice {
            opponent,
            reconnect_window_secs,
        }))
    }

    /// Clears both active-game pointers of a finished game.
    async fn release_game(&self, session: &GameSession) {
        for player in session.players {
            if let Err(e) = self.store.clear_active_game(player).await {
                tracing::error!(%player, game_id = %session.game_id, error = %e, "failed to clear game pointer");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// `player`'s view of `game`: public session fields, own board, hits
    /// taken, and hits landed on the opponent.
    pub async fn get_game_info(&self, game: GameId, player: PlayerId) -> Result<GameInfo, GameError> {
        let session = self
            .store
            .load_session(game)
            .await?
            .ok_or(GameError::GameNotFound(game))?;
        let opponent = session
            .opponent_of(player)
            .ok_or(GameError::NotAPlayer { game, player })?;

        Ok(GameInfo {
            session: SessionView::from(&session),
            own_board: self.store.get_board(game, player).await?,
            hits_taken: self.store.get_hits(game, player).await?,
            hits_landed: self.store.get_hits(game, opponent).await?,
        })
    }

    pub async fn load_session(&self, game: GameId) -> Result<Option<GameSession>, GameError> {
        Ok(self.store.load_session(game).await?)
    }
}

fn validate_board(board: &Board) -> Result<(), GameError> {
    if board.is_empty() {
        return Err(GameError::InvalidPlacement("no ships given".into()));
    }
    if let Some((id, _)) = board.ships().find(|(_, cells)| cells.is_empty()) {
        return Err(GameError::InvalidPlacement(format!("ship `{id}` has no coordinates")));
    }
    let mut occupied = BTreeMap::new();
    for (id, cells) in board.ships() {
        for cell in cells {
            if let Some(other) = occupied.insert(*cell, id) {
                return Err(GameError::InvalidPlacement(format!(
                    "ships `{other}` and `{id}` overlap at {cell}"
                )));
            }
        }
    }
    Ok(())
}
