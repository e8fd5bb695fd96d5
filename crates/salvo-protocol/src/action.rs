//! The typed action gate.
//!
//! Clients send `{ "action": "<name>", ...fields }`. [`Action::decode`]
//! turns the name plus the raw JSON into exactly one strongly-typed
//! request, or a [`ProtocolError`] naming the action and what was wrong.
//! Nothing downstream ever looks at raw JSON.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::Value;

use crate::{Board, Coordinate, GameId, PlayerId, ProtocolError, ShipId};

/// Wire names of the recognised actions.
pub mod names {
    pub const PLACE_SHIPS: &str = "place_ships";
    pub const SHOOT: &str = "shoot";
    pub const FIND_GAME_SESSION: &str = "find_game_session";
    pub const GET_GAME_INFO: &str = "get_game_info";
    pub const START_GAME: &str = "start_game";
}

/// A validated client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PlaceShips(PlaceShipsRequest),
    Shoot(ShootRequest),
    FindGameSession(FindGameRequest),
    GetGameInfo(GameInfoRequest),
    /// Administrative bulk placement of both boards at once.
    StartGame(StartGameRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceShipsRequest {
    pub game_id: GameId,
    /// Must match the caller when present.
    pub player_id: Option<PlayerId>,
    pub ships: Board,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShootRequest {
    pub game_id: GameId,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    pub target: Coordinate,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FindGameRequest {
    #[serde(default)]
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GameInfoRequest {
    pub game_id: GameId,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartGameRequest {
    pub game_id: GameId,
    pub boards: BTreeMap<PlayerId, Board>,
}

impl Action {
    /// Decodes `payload` as the request for `name`.
    ///
    /// This is the single validation pass: field presence, identifier
    /// format, coordinate range and ship shape are all checked here.
    pub fn decode(name: &str, payload: &Value) -> Result<Self, ProtocolError> {
        match name {
            names::PLACE_SHIPS => decode_place_ships(payload).map(Self::PlaceShips),
            names::SHOOT => typed(name, payload).map(Self::Shoot),
            names::FIND_GAME_SESSION => {
                // The first message may carry only a player id, so a
                // missing or non-object payload is fine here.
                if payload.is_object() {
                    typed(name, payload).map(Self::FindGameSession)
                } else {
                    Ok(Self::FindGameSession(FindGameRequest::default()))
                }
            }
            names::GET_GAME_INFO => typed(name, payload).map(Self::GetGameInfo),
            names::START_GAME => decode_start_game(payload).map(Self::StartGame),
            other => Err(ProtocolError::UnknownAction(other.to_owned())),
        }
    }

    /// The wire name of this action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlaceShips(_) => names::PLACE_SHIPS,
            Self::Shoot(_) => names::SHOOT,
            Self::FindGameSession(_) => names::FIND_GAME_SESSION,
            Self::GetGameInfo(_) => names::GET_GAME_INFO,
            Self::StartGame(_) => names::START_GAME,
        }
    }

    /// The game this action targets, if it names one.
    pub fn game_id(&self) -> Option<GameId> {
        match self {
            Self::PlaceShips(r) => Some(r.game_id),
            Self::Shoot(r) => Some(r.game_id),
            Self::GetGameInfo(r) => Some(r.game_id),
            Self::StartGame(r) => Some(r.game_id),
            Self::FindGameSession(_) => None,
        }
    }

    /// The `player_id` the payload claims to act for, if any.
    pub fn claimed_player(&self) -> Option<PlayerId> {
        match self {
            Self::PlaceShips(r) => r.player_id,
            Self::Shoot(r) => r.player_id,
            Self::FindGameSession(r) => r.player_id,
            Self::GetGameInfo(r) => r.player_id,
            Self::StartGame(_) => None,
        }
    }
}

fn invalid(action: &str, reason: impl ToString) -> ProtocolError {
    ProtocolError::InvalidPayload {
        action: action.to_owned(),
        reason: reason.to_string(),
    }
}

fn typed<T: serde::de::DeserializeOwned>(action: &str, payload: &Value) -> Result<T, ProtocolError> {
    T::deserialize(payload).map_err(|e| invalid(action, e))
}

fn field<'a>(action: &str, payload: &'a Value, key: &str) -> Result<&'a Value, ProtocolError> {
    payload
        .get(key)
        .ok_or_else(|| invalid(action, format!("missing field `{key}`")))
}

fn decode_place_ships(payload: &Value) -> Result<PlaceShipsRequest, ProtocolError> {
    #[derive(Deserialize)]
    struct Head {
        game_id: GameId,
        #[serde(default)]
        player_id: Option<PlayerId>,
    }

    let action = names::PLACE_SHIPS;
    let head: Head = typed(action, payload)?;
    let ships = decode_ships(action, field(action, payload, "ships")?)?;
    Ok(PlaceShipsRequest {
        game_id: head.game_id,
        player_id: head.player_id,
        ships,
    })
}

fn decode_start_game(payload: &Value) -> Result<StartGameRequest, ProtocolError> {
    let action = names::START_GAME;
    let game_id: GameId = typed(action, field(action, payload, "game_id")?)?;
    let players = field(action, payload, "players")?
        .as_object()
        .ok_or_else(|| invalid(action, "`players` must be an object"))?;

    let mut boards = BTreeMap::new();
    for (player, ships) in players {
        let player: PlayerId = player.parse().map_err(|e| invalid(action, e))?;
        boards.insert(player, decode_ships(action, ships)?);
    }
    Ok(StartGameRequest { game_id, boards })
}

/// Accepts `{ "Destroyer": ["A1", "A2"] }` or
/// `[{ "type": "Destroyer", "positions": ["A1", "A2"] }]`.
fn decode_ships(action: &str, value: &Value) -> Result<Board, ProtocolError> {
    #[derive(Deserialize)]
    struct Entry {
        #[serde(rename = "type", alias = "ship_id", alias = "name")]
        ship_id: ShipId,
        positions: Vec<Coordinate>,
    }

    let ships: BTreeMap<ShipId, BTreeSet<Coordinate>> = match value {
        Value::Object(_) => {
            let map: BTreeMap<ShipId, Vec<Coordinate>> = typed(action, value)?;
            map.into_iter()
                .map(|(id, cells)| (id, cells.into_iter().collect()))
                .collect()
        }
        Value::Array(_) => {
            let entries: Vec<Entry> = typed(action, value)?;
            let mut ships = BTreeMap::new();
            for entry in entries {
                let cells: BTreeSet<Coordinate> = entry.positions.into_iter().collect();
                if ships.insert(entry.ship_id.clone(), cells).is_some() {
                    return Err(invalid(action, format!("duplicate ship `{}`", entry.ship_id)));
                }
            }
            ships
        }
        _ => return Err(invalid(action, "`ships` must be an object or a list")),
    };
    Ok(Board::new(ships))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_unknown_action_names_it() {
        let err = Action::decode("fly", &json!({})).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownAction(ref n) if n == "fly"));
    }

    #[test]
    fn test_decode_shoot_normalizes_target() {
        let game = GameId::new_random();
        let action = Action::decode(
            "shoot",
            &json!({ "action": "shoot", "game_id": game.to_string(), "target": "b1" }),
        )
        .unwrap();
        let Action::Shoot(req) = action else {
            panic!("expected shoot");
        };
        assert_eq!(req.game_id, game);
        assert_eq!(req.target.to_string(), "B1");
        assert_eq!(req.player_id, None);
    }

    #[test]
    fn test_decode_shoot_missing_target_is_invalid_payload() {
        let err = Action::decode("shoot", &json!({ "game_id": GameId::new_random() }))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { ref action, .. } if action == "shoot"));
    }

    #[test]
    fn test_decode_shoot_rejects_off_board_target() {
        let err = Action::decode(
            "shoot",
            &json!({ "game_id": GameId::new_random(), "target": "Z99" }),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn test_decode_shoot_rejects_bad_game_id() {
        let err = Action::decode("shoot", &json!({ "game_id": "nope", "target": "A1" }))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn test_decode_place_ships_map_form() {
        let game = GameId::new_random();
        let action = Action::decode(
            "place_ships",
            &json!({ "game_id": game, "ships": { "Destroyer": ["A1", "A2"] } }),
        )
        .unwrap();
        let Action::PlaceShips(req) = action else {
            panic!("expected place_ships");
        };
        assert_eq!(req.ships.len(), 1);
        assert_eq!(req.ships.cells_of("Destroyer").unwrap().len(), 2);
    }

    #[test]
    fn test_decode_place_ships_list_form() {
        let action = Action::decode(
            "place_ships",
            &json!({
                "game_id": GameId::new_random(),
                "ships": [
                    { "type": "Destroyer", "positions": ["A1", "A2"] },
                    { "type": "Sub", "positions": ["C3"] }
                ]
            }),
        )
        .unwrap();
        let Action::PlaceShips(req) = action else {
            panic!("expected place_ships");
        };
        assert_eq!(req.ships.len(), 2);
    }

    #[test]
    fn test_decode_place_ships_list_form_rejects_duplicate_ids() {
        let err = Action::decode(
            "place_ships",
            &json!({
                "game_id": GameId::new_random(),
                "ships": [
                    { "type": "Sub", "positions": ["A1"] },
                    { "type": "Sub", "positions": ["B1"] }
                ]
            }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate ship"));
    }

    #[test]
    fn test_decode_place_ships_rejects_scalar_ships() {
        let err = Action::decode(
            "place_ships",
            &json!({ "game_id": GameId::new_random(), "ships": 5 }),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn test_decode_find_game_accepts_bare_payload() {
        let action = Action::decode("find_game_session", &Value::Null).unwrap();
        assert_eq!(action, Action::FindGameSession(FindGameRequest::default()));
        assert_eq!(action.name(), "find_game_session");
    }

    #[test]
    fn test_decode_start_game_reads_both_boards() {
        let a = PlayerId::new_random();
        let b = PlayerId::new_random();
        let action = Action::decode(
            "start_game",
            &json!({
                "game_id": GameId::new_random(),
                "players": {
                    a.to_string(): { "Destroyer": ["A1", "A2"] },
                    b.to_string(): { "Destroyer": ["B1", "B2"] }
                }
            }),
        )
        .unwrap();
        let Action::StartGame(req) = action else {
            panic!("expected start_game");
        };
        assert_eq!(req.boards.len(), 2);
        assert!(req.boards.contains_key(&a));
    }

    #[test]
    fn test_decode_start_game_rejects_bad_player_key() {
        let err = Action::decode(
            "start_game",
            &json!({ "game_id": GameId::new_random(), "players": { "bob": {} } }),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn test_action_claimed_player_and_game_id() {
        let game = GameId::new_random();
        let player = PlayerId::new_random();
        let action = Action::decode(
            "get_game_info",
            &json!({ "game_id": game, "player_id": player }),
        )
        .unwrap();
        assert_eq!(action.game_id(), Some(game));
        assert_eq!(action.claimed_player(), Some(player));
    }
}
