//! The action dispatcher: the one entry point from a decoded client frame
//! to the matchmaker and engine.
//!
//! Every call produces a [`Dispatched`]: exactly one reply for the caller
//! plus an ordered list of notices for other players (or for the caller
//! again, e.g. the game-over notice). The handler sends the reply first
//! and the notices after it.

use std::sync::Arc;

use salvo_game::{
    FindOutcome, GameEngine, GameError, Matchmaker, PlacementOutcome, ShotOutcome,
};
use salvo_protocol::payloads::{
    push, BattleStart, EndReason, GameOver, MatchInfo, OpponentDisconnected,
    OpponentReconnected, SessionView, ShipsPlaced,
};
use salvo_protocol::{
    Action, GameId, GameSession, PlayerId, Response, Status,
};
use salvo_store::SessionStore;
use serde_json::{json, Value};

/// Reply plus notices produced by one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub reply: Response,
    pub notices: Vec<(PlayerId, Response)>,
    /// Game the caller should be (re)associated with in the registry.
    pub associate: Option<GameId>,
}

impl Dispatched {
    fn reply(reply: Response) -> Self {
        Self {
            reply,
            notices: Vec::new(),
            associate: None,
        }
    }

    fn with_notice(mut self, to: PlayerId, notice: Response) -> Self {
        self.notices.push((to, notice));
        self
    }
}

pub struct Dispatcher<S> {
    matchmaker: Arc<Matchmaker<S>>,
    engine: Arc<GameEngine<S>>,
}

impl<S: SessionStore> Dispatcher<S> {
    pub fn new(matchmaker: Arc<Matchmaker<S>>, engine: Arc<GameEngine<S>>) -> Self {
        Self { matchmaker, engine }
    }

    /// Decodes `payload` as action `name` and runs it for `caller`.
    ///
    /// Malformed input is rejected here, tagged with the offending action,
    /// before anything touches the store.
    pub async fn handle_action(&self, name: &str, payload: &Value, caller: PlayerId) -> Dispatched {
        let action = match Action::decode(name, payload) {
            Ok(action) => action,
            Err(e) => {
                tracing::debug!(player = %caller, action = name, error = %e, "rejected payload");
                return Dispatched::reply(Response::error(name, e.to_string()));
            }
        };
        if let Some(claimed) = action.claimed_player() {
            if claimed != caller {
                tracing::warn!(player = %caller, %claimed, action = name, "payload player_id mismatch");
                return Dispatched::reply(Response::error(
                    name,
                    "player_id does not match this connection",
                ));
            }
        }
        self.dispatch(action, caller).await
    }

    /// Runs an already-decoded action.
    pub async fn dispatch(&self, action: Action, caller: PlayerId) -> Dispatched {
        let name = action.name();
        let associate = match &action {
            Action::PlaceShips(_) | Action::Shoot(_) => action.game_id(),
            _ => None,
        };

        let result = match action {
            Action::FindGameSession(_) => self.find_game_session(caller).await,
            Action::PlaceShips(req) => self.place_ships(req.game_id, caller, req.ships).await,
            Action::Shoot(req) => self.shoot(req.game_id, caller, req.target).await,
            Action::GetGameInfo(req) => self.get_game_info(req.game_id, caller).await,
            Action::StartGame(req) => self.start_game(req.game_id, caller, req.boards).await,
        };

        match result {
            Ok(mut dispatched) => {
                dispatched.associate = dispatched.associate.or(associate);
                dispatched
            }
            Err(e) => {
                log_game_error(caller, name, &e);
                Dispatched {
                    associate,
                    ..Dispatched::reply(Response::error(name, e.to_string()))
                }
            }
        }
    }

    /// Resume check run right after a connection registers.
    ///
    /// Returns `None` when there is nothing to resume (or the store could
    /// not be asked, which is logged).
    pub async fn resume(&self, caller: PlayerId) -> Option<Dispatched> {
        match self.matchmaker.try_resume(caller).await {
            Ok(Some((session, opponent))) => Some(resumed(push::GAME_RESUMED, &session, caller, opponent)),
            Ok(None) => None,
            Err(e) => {
                tracing::error!(player = %caller, error = %e, "resume check failed");
                None
            }
        }
    }

    /// Cleanup for a player whose connection is gone.
    ///
    /// Drops their queue entries and, if they were in a running game,
    /// records the disconnect and returns the notice for the opponent.
    /// Does nothing if the player has already reconnected.
    /// `game_hint` is the registry's last known game, used when the
    /// store has no pointer.
    pub async fn disconnected(
        &self,
        player: PlayerId,
        game_hint: Option<GameId>,
    ) -> Vec<(PlayerId, Response)> {
        match self.matchmaker.withdraw(player).await {
            Ok(Some(_)) => {}
            // A newer connection owns this player now.
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(%player, error = %e, "failed to remove from queue on disconnect");
            }
        }

        let game = match self.matchmaker.active_game(player).await {
            Ok(Some(game)) => Some(game),
            Ok(None) => game_hint,
            Err(e) => {
                tracing::warn!(%player, error = %e, "active game lookup failed on disconnect");
                game_hint
            }
        };
        let Some(game) = game else {
            return Vec::new();
        };

        match self.engine.record_disconnect(game, player).await {
            Ok(Some(notice)) => vec![(
                notice.opponent,
                Response::new(
                    Status::OpponentDisconnected,
                    push::OPPONENT_DISCONNECTED,
                    "Your opponent disconnected",
                    OpponentDisconnected {
                        game_id: game,
                        opponent_id: player,
                        can_reconnect: true,
                        reconnect_timeout: notice.reconnect_window_secs,
                    },
                ),
            )],
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(%player, game_id = %game, error = %e, "failed to record disconnect");
                Vec::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Per-action handlers
    // -----------------------------------------------------------------------

    async fn find_game_session(&self, caller: PlayerId) -> Result<Dispatched, GameError> {
        let action = salvo_protocol::names::FIND_GAME_SESSION;
        Ok(match self.matchmaker.find_game_session(caller).await? {
            FindOutcome::Resumed { session, opponent } => resumed(action, &session, caller, opponent),
            FindOutcome::Paired { session, opponent } => {
                let view = SessionView::from(&session);
                Dispatched {
                    associate: Some(session.game_id),
                    ..Dispatched::reply(Response::new(
                        Status::Ready,
                        action,
                        "Opponent found",
                        MatchInfo {
                            session: view.clone(),
                            opponent_id: opponent,
                        },
                    ))
                }
                .with_notice(
                    opponent,
                    Response::new(
                        Status::Ready,
                        push::MATCH_FOUND,
                        "Opponent found",
                        MatchInfo {
                            session: view,
                            opponent_id: caller,
                        },
                    ),
                )
            }
            FindOutcome::Waiting => Dispatched::reply(Response::new(
                Status::Waiting,
                action,
                "Waiting for an opponent",
                json!({ "player_id": caller }),
            )),
        })
    }

    async fn place_ships(
        &self,
        game: GameId,
        caller: PlayerId,
        ships: salvo_protocol::Board,
    ) -> Result<Dispatched, GameError> {
        let action = salvo_protocol::names::PLACE_SHIPS;
        let count = ships.len();
        Ok(match self.engine.place_ships(game, caller, ships).await? {
            PlacementOutcome::Waiting { waiting_for } => Dispatched::reply(Response::new(
                Status::ShipsPlaced,
                action,
                "Ships placed, waiting for opponent",
                ShipsPlaced {
                    game_id: game,
                    ships: count,
                    waiting_for,
                },
            )),
            PlacementOutcome::BattleStarted { session } => battle_started(action, &session, caller),
        })
    }

    async fn start_game(
        &self,
        game: GameId,
        caller: PlayerId,
        boards: std::collections::BTreeMap<PlayerId, salvo_protocol::Board>,
    ) -> Result<Dispatched, GameError> {
        let action = salvo_protocol::names::START_GAME;
        let count = boards.values().map(salvo_protocol::Board::len).sum();
        Ok(match self.engine.start_game(game, boards).await? {
            PlacementOutcome::Waiting { waiting_for } => Dispatched::reply(Response::new(
                Status::ShipsPlaced,
                action,
                "Boards stored, waiting for the remaining player",
                ShipsPlaced {
                    game_id: game,
                    ships: count,
                    waiting_for,
                },
            )),
            PlacementOutcome::BattleStarted { session } => battle_started(action, &session, caller),
        })
    }

    async fn shoot(
        &self,
        game: GameId,
        caller: PlayerId,
        target: salvo_protocol::Coordinate,
    ) -> Result<Dispatched, GameError> {
        let action = salvo_protocol::names::SHOOT;
        let ShotOutcome {
            session,
            defender,
            report,
        } = self.engine.shoot(game, caller, target).await?;

        let (status, message) = match (report.hit, report.sunk) {
            (true, true) => (Status::Hit, format!("Hit! {} sunk", report.ship_id.as_deref().unwrap_or("ship"))),
            (true, false) => (Status::Hit, "Hit!".to_string()),
            (false, _) => (Status::Miss, "Miss".to_string()),
        };
        let enemy_message = if report.hit {
            format!("Enemy hit your ship at {target}")
        } else {
            format!("Enemy missed at {target}")
        };

        let mut dispatched = Dispatched::reply(Response::new(status, action, message, &report))
            .with_notice(
                defender,
                Response::new(status, push::ENEMY_SHOT, enemy_message, &report),
            );

        if report.game_over {
            let over = GameOver {
                game_id: game,
                winner: session.winner,
                reason: EndReason::AllShipsSunk,
            };
            for player in session.players {
                let message = if Some(player) == session.winner {
                    "You won!"
                } else {
                    "You lost"
                };
                dispatched = dispatched.with_notice(
                    player,
                    Response::new(Status::GameOver, push::GAME_OVER, message, &over),
                );
            }
        }
        Ok(dispatched)
    }

    async fn get_game_info(&self, game: GameId, caller: PlayerId) -> Result<Dispatched, GameError> {
        let info = self.engine.get_game_info(game, caller).await?;
        Ok(Dispatched::reply(Response::new(
            Status::Ok,
            salvo_protocol::names::GET_GAME_INFO,
            "Game info",
            info,
        )))
    }
}

// ---------------------------------------------------------------------------
// Envelope builders
// ---------------------------------------------------------------------------

fn resumed(action: &str, session: &GameSession, caller: PlayerId, opponent: PlayerId) -> Dispatched {
    let view = SessionView::from(session);
    Dispatched {
        associate: Some(session.game_id),
        ..Dispatched::reply(Response::new(
            Status::ResumeGame,
            action,
            "Reconnected to existing game",
            MatchInfo {
                session: view.clone(),
                opponent_id: opponent,
            },
        ))
    }
    .with_notice(
        opponent,
        Response::new(
            Status::OpponentReconnected,
            push::OPPONENT_RECONNECTED,
            "Your opponent has reconnected",
            OpponentReconnected {
                game_id: session.game_id,
                opponent_id: caller,
            },
        ),
    )
}

/// Reply to the placer, `battle_start` push to every other player.
fn battle_started(action: &str, session: &GameSession, caller: PlayerId) -> Dispatched {
    let start = BattleStart {
        game_id: session.game_id,
        // Always set once the battle has started.
        first_turn: session.current_turn.unwrap_or(session.players[0]),
    };
    let mut dispatched = Dispatched::reply(Response::new(
        Status::BattleStart,
        action,
        "Battle started",
        &start,
    ));
    for player in session.players.into_iter().filter(|p| *p != caller) {
        dispatched = dispatched.with_notice(
            player,
            Response::new(Status::BattleStart, push::BATTLE_START, "Battle started", &start),
        );
    }
    dispatched
}

fn log_game_error(caller: PlayerId, action: &str, err: &GameError) {
    match err {
        GameError::Store(_)
        | GameError::PairingFailed(_)
        | GameError::QueueCorrupted(_)
        | GameError::OpponentBoardMissing(_) => {
            tracing::error!(player = %caller, action, error = %err, "action failed");
        }
        _ => tracing::debug!(player = %caller, action, error = %err, "action rejected"),
    }
}
