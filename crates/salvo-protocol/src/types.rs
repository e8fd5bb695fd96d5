//! Identity types, board coordinates, and the response envelope.
//!
//! These are the values that cross the wire in both directions. Every
//! response the server sends, whether it answers a request or is pushed
//! unprompted, is a [`Response`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// A newtype over a random UUID. `#[serde(transparent)]` makes it travel
/// as a plain string (`"3f1c..."`), not `{ "0": "3f1c..." }`.
///
/// The identity outlives any single connection: it is the key for queue
/// entries, boards, hit records and the active-game pointer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Mints a fresh random identity.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for PlayerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidId(s.to_owned()))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for a game session. Generated once, never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GameId(pub Uuid);

impl GameId {
    /// Generates a fresh game id.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for GameId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidId(s.to_owned()))
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a ship within one player's board (e.g. `"Destroyer"`).
pub type ShipId = String;

// ---------------------------------------------------------------------------
// Coordinate
// ---------------------------------------------------------------------------

/// Number of rows and columns on a board.
pub const BOARD_SIZE: u8 = 15;

/// A validated board cell such as `A1` or `O15`.
///
/// Rows are the letters `A` through `O`, columns are `1` through `15`.
/// Parsing is case-insensitive; the canonical form is upper-case, so
/// `"b7"` and `"B7"` are the same cell.
///
/// Serde goes through `String` in both directions (`try_from` / `into`),
/// which means a malformed label is rejected during deserialization and
/// never becomes a `Coordinate` at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
    row: u8,
    col: u8,
}

impl Coordinate {
    /// Builds a coordinate from a zero-based row and a one-based column.
    pub fn new(row: u8, col: u8) -> Result<Self, ProtocolError> {
        if row >= BOARD_SIZE || col == 0 || col > BOARD_SIZE {
            return Err(ProtocolError::InvalidCoordinate(format!("{row}:{col}")));
        }
        Ok(Self { row, col })
    }

    /// Zero-based row index (`A` is 0).
    pub fn row(&self) -> u8 {
        self.row
    }

    /// One-based column number.
    pub fn col(&self) -> u8 {
        self.col
    }
}

impl FromStr for Coordinate {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidCoordinate(s.to_owned());

        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
        if !('A'..='O').contains(&letter) {
            return Err(invalid());
        }

        let digits = chars.as_str();
        if digits.is_empty()
            || digits.starts_with('0')
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let col: u8 = digits.parse().map_err(|_| invalid())?;

        Self::new(letter as u8 - b'A', col).map_err(|_| invalid())
    }
}

impl TryFrom<String> for Coordinate {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Coordinate> for String {
    fn from(value: Coordinate) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'A' + self.row) as char, self.col)
    }
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// The `status` field of a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    Error,
    Waiting,
    Ready,
    ResumeGame,
    ShipsPlaced,
    BattleStart,
    Hit,
    Miss,
    GameOver,
    OpponentDisconnected,
    OpponentReconnected,
}

/// The uniform envelope for every frame the server sends.
///
/// ```json
/// { "status": "hit", "message": "Hit!", "action": "shoot", "data": { ... } }
/// ```
///
/// Replies carry the name of the action they answer in `action`; pushes
/// carry their own tag (`battle_start`, `enemy_shot`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub message: String,
    pub action: String,
    pub data: serde_json::Value,
}

impl Response {
    /// Builds a response, serializing `data` into the envelope.
    ///
    /// Our payload types are plain structs with string keys, so
    /// serialization cannot fail in practice; if it somehow does the data
    /// field degrades to `null` rather than dropping the reply.
    pub fn new(
        status: Status,
        action: impl Into<String>,
        message: impl Into<String>,
        data: impl Serialize,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            action: action.into(),
            data: serde_json::to_value(data).unwrap_or_default(),
        }
    }

    /// Builds a `status: error` response with no data.
    pub fn error(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Status::Error, action, message, serde_json::Value::Null)
    }

    /// Returns `true` if this is an error response.
    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_parse_accepts_corners() {
        let a1: Coordinate = "A1".parse().unwrap();
        assert_eq!((a1.row(), a1.col()), (0, 1));
        let o15: Coordinate = "O15".parse().unwrap();
        assert_eq!((o15.row(), o15.col()), (14, 15));
    }

    #[test]
    fn test_coordinate_parse_is_case_insensitive() {
        let lower: Coordinate = "b7".parse().unwrap();
        assert_eq!(lower.to_string(), "B7");
        assert_eq!(lower, "B7".parse().unwrap());
    }

    #[test]
    fn test_coordinate_parse_rejects_out_of_range() {
        for bad in ["P1", "A0", "A16", "A", "", "1A", "A01", "A+1", "AA1", "Z9"] {
            assert!(
                bad.parse::<Coordinate>().is_err(),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_coordinate_serde_uses_label() {
        let c: Coordinate = serde_json::from_str(r#""c12""#).unwrap();
        assert_eq!(serde_json::to_string(&c).unwrap(), r#""C12""#);
        assert!(serde_json::from_str::<Coordinate>(r#""Q3""#).is_err());
    }

    #[test]
    fn test_coordinate_ordering_is_row_major() {
        let a2: Coordinate = "A2".parse().unwrap();
        let a10: Coordinate = "A10".parse().unwrap();
        let b1: Coordinate = "B1".parse().unwrap();
        assert!(a2 < a10);
        assert!(a10 < b1);
    }

    #[test]
    fn test_player_id_serializes_as_plain_string() {
        let id = PlayerId::new_random();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: PlayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_player_id_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<PlayerId>().is_err());
        assert!("".parse::<GameId>().is_err());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&Status::Ok).unwrap(), r#""OK""#);
        assert_eq!(
            serde_json::to_string(&Status::ResumeGame).unwrap(),
            r#""resume_game""#
        );
        assert_eq!(
            serde_json::to_string(&Status::OpponentDisconnected).unwrap(),
            r#""opponent_disconnected""#
        );
    }

    #[test]
    fn test_response_error_has_null_data() {
        let resp = Response::error("shoot", "Not your turn");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["action"], "shoot");
        assert_eq!(json["message"], "Not your turn");
        assert!(json["data"].is_null());
        assert!(resp.is_error());
    }
}
