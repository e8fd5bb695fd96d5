//! Shapes of the `data` field for each kind of response.

use serde::{Deserialize, Serialize};

use crate::{Board, Coordinate, GameId, GameSession, GameStatus, HitRecord, PlayerId, ShipId};

/// Push tags for frames that are not replies to a request.
pub mod push {
    pub const GAME_RESUMED: &str = "game_resumed";
    pub const MATCH_FOUND: &str = "match_found";
    pub const BATTLE_START: &str = "battle_start";
    pub const ENEMY_SHOT: &str = "enemy_shot";
    pub const GAME_OVER: &str = "game_over";
    pub const OPPONENT_DISCONNECTED: &str = "opponent_disconnected";
    pub const OPPONENT_RECONNECTED: &str = "opponent_reconnected";
}

/// What any participant may see of a session. Never includes boards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub game_id: GameId,
    pub status: GameStatus,
    pub current_turn: Option<PlayerId>,
    pub players: [PlayerId; 2],
    pub winner: Option<PlayerId>,
}

impl From<&GameSession> for SessionView {
    fn from(s: &GameSession) -> Self {
        Self {
            game_id: s.game_id,
            status: s.status,
            current_turn: s.current_turn,
            players: s.players,
            winner: s.winner,
        }
    }
}

/// Sent to both players when a pairing succeeds, and on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
    #[serde(flatten)]
    pub session: SessionView,
    pub opponent_id: PlayerId,
}

/// Reply to a placement while the opponent is still placing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipsPlaced {
    pub game_id: GameId,
    pub ships: usize,
    pub waiting_for: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleStart {
    pub game_id: GameId,
    #[serde(rename = "firstTurn")]
    pub first_turn: PlayerId,
}

/// Outcome of one shot. Sent to the shooter as the reply and to the
/// defender as an `enemy_shot` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotReport {
    pub game_id: GameId,
    pub shooter: PlayerId,
    pub target: Coordinate,
    pub hit: bool,
    pub ship_id: Option<ShipId>,
    pub sunk: bool,
    pub next_turn: Option<PlayerId>,
    pub game_over: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    AllShipsSunk,
    Forfeit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOver {
    pub game_id: GameId,
    pub winner: Option<PlayerId>,
    pub reason: EndReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentDisconnected {
    pub game_id: GameId,
    pub opponent_id: PlayerId,
    pub can_reconnect: bool,
    /// Seconds.
    pub reconnect_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentReconnected {
    pub game_id: GameId,
    pub opponent_id: PlayerId,
}

/// The caller's own view of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub session: SessionView,
    pub own_board: Option<Board>,
    /// Hits the opponent has landed on the caller's board.
    pub hits_taken: HitRecord,
    /// Hits the caller has landed on the opponent's board.
    pub hits_landed: HitRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battle_start_uses_first_turn_key() {
        let p = PlayerId::new_random();
        let json = serde_json::to_value(BattleStart {
            game_id: GameId::new_random(),
            first_turn: p,
        })
        .unwrap();
        assert_eq!(json["firstTurn"], p.to_string());
    }

    #[test]
    fn test_match_info_flattens_session_view() {
        let a = PlayerId::new_random();
        let b = PlayerId::new_random();
        let session = GameSession::new(GameId::new_random(), [a, b], 0);
        let json = serde_json::to_value(MatchInfo {
            session: SessionView::from(&session),
            opponent_id: a,
        })
        .unwrap();
        assert_eq!(json["game_id"], session.game_id.to_string());
        assert_eq!(json["status"], "placing_ships");
        assert!(json["current_turn"].is_null());
        assert_eq!(json["opponent_id"], a.to_string());
    }
}
