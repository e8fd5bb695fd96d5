//! Durable game records: boards, hit records, and the session document.
//!
//! These are the values the session store owns. They serialize to JSON
//! so a store can keep them as opaque documents.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Coordinate, GameId, PlayerId, ShipId};

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// One player's private ship layout: ship id → occupied cells.
///
/// Created once per player per game by a placement and never changed
/// after the battle starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    ships: BTreeMap<ShipId, BTreeSet<Coordinate>>,
}

impl Board {
    pub fn new(ships: BTreeMap<ShipId, BTreeSet<Coordinate>>) -> Self {
        Self { ships }
    }

    /// Iterates over `(ship id, cells)` pairs in ship-id order.
    pub fn ships(&self) -> impl Iterator<Item = (&ShipId, &BTreeSet<Coordinate>)> {
        self.ships.iter()
    }

    /// Cells occupied by `ship`, if the board has it.
    pub fn cells_of(&self, ship: &str) -> Option<&BTreeSet<Coordinate>> {
        self.ships.get(ship)
    }

    /// Returns the ship occupying `cell`, if any.
    pub fn ship_at(&self, cell: &Coordinate) -> Option<&ShipId> {
        self.ships
            .iter()
            .find(|(_, cells)| cells.contains(cell))
            .map(|(id, _)| id)
    }

    pub fn is_empty(&self) -> bool {
        self.ships.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ships.len()
    }
}

// ---------------------------------------------------------------------------
// HitRecord
// ---------------------------------------------------------------------------

/// Cells hit so far on one player's board, grouped by ship.
///
/// Append-only: recording a cell that is already present changes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HitRecord {
    hits: BTreeMap<ShipId, BTreeSet<Coordinate>>,
}

impl HitRecord {
    /// Records a hit. Returns `false` if the cell was already recorded.
    pub fn record(&mut self, ship: &str, cell: Coordinate) -> bool {
        self.hits.entry(ship.to_owned()).or_default().insert(cell)
    }

    /// Hits recorded against `ship`.
    pub fn hits_on(&self, ship: &str) -> Option<&BTreeSet<Coordinate>> {
        self.hits.get(ship)
    }

    /// A ship is sunk when every one of its cells has been hit.
    pub fn is_sunk(&self, board: &Board, ship: &str) -> bool {
        match (board.cells_of(ship), self.hits_on(ship)) {
            (Some(cells), Some(hits)) => cells.is_subset(hits),
            _ => false,
        }
    }

    /// Returns `true` if every ship on `board` is sunk.
    ///
    /// An empty board is never considered defeated.
    pub fn all_sunk(&self, board: &Board) -> bool {
        !board.is_empty() && board.ships().all(|(id, _)| self.is_sunk(board, id))
    }

    /// Total number of hit cells across all ships.
    pub fn total(&self) -> usize {
        self.hits.values().map(BTreeSet::len).sum()
    }
}

// ---------------------------------------------------------------------------
// GameStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a game session.
///
/// ```text
/// WaitingForOpponent → PlacingShips → InProgress → Finished
/// ```
///
/// Transitions never go backwards. A session may jump straight to
/// `Finished` from any earlier state when it is ended explicitly
/// (forfeit); otherwise each step follows [`GameStatus::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    WaitingForOpponent,
    PlacingShips,
    InProgress,
    Finished,
}

impl GameStatus {
    /// Returns `true` while shots may be fired.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// The state that follows this one, or `None` once finished.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::WaitingForOpponent => Some(Self::PlacingShips),
            Self::PlacingShips => Some(Self::InProgress),
            Self::InProgress => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    /// Returns `true` if moving to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target) || (target == Self::Finished && self != Self::Finished)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForOpponent => write!(f, "waiting_for_opponent"),
            Self::PlacingShips => write!(f, "placing_ships"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

/// Advisory record of a player dropping out of a running game.
///
/// Nothing enforces the window; it is kept so clients and operators can
/// see how long the opponent was told to wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnection {
    pub player_id: PlayerId,
    /// Unix seconds.
    pub at: u64,
    pub reconnect_window_secs: u64,
}

/// The authoritative record of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub game_id: GameId,
    /// Fixed at creation.
    pub players: [PlayerId; 2],
    pub current_turn: Option<PlayerId>,
    pub status: GameStatus,
    /// Unix seconds.
    pub start_time: u64,
    /// Set once when the game finishes.
    pub end_time: Option<u64>,
    #[serde(default)]
    pub winner: Option<PlayerId>,
    #[serde(default)]
    pub disconnections: Vec<Disconnection>,
}

impl GameSession {
    /// A freshly paired session: both players known, boards pending.
    pub fn new(game_id: GameId, players: [PlayerId; 2], start_time: u64) -> Self {
        Self {
            game_id,
            players,
            current_turn: None,
            status: GameStatus::PlacingShips,
            start_time,
            end_time: None,
            winner: None,
            disconnections: Vec::new(),
        }
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains(&player)
    }

    /// The other player, or `None` if `player` is not in this game.
    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        match self.players {
            [a, b] if a == player => Some(b),
            [a, b] if b == player => Some(a),
            _ => None,
        }
    }

    /// Moves to `Finished`, stamping the end time and winner.
    ///
    /// Returns `false` (and changes nothing) if already finished, so the
    /// end time is never overwritten.
    pub fn finish(&mut self, winner: Option<PlayerId>, now: u64) -> bool {
        if !self.status.can_transition_to(GameStatus::Finished) {
            return false;
        }
        self.status = GameStatus::Finished;
        self.current_turn = None;
        self.end_time = Some(now);
        self.winner = winner;
        true
    }

    /// Replaces any previous disconnection entry for the same player.
    pub fn record_disconnection(&mut self, entry: Disconnection) {
        self.disconnections.retain(|d| d.player_id != entry.player_id);
        self.disconnections.push(entry);
    }

    /// Removes the player's disconnection entry. Returns `true` if one existed.
    pub fn clear_disconnection(&mut self, player: PlayerId) -> bool {
        let before = self.disconnections.len();
        self.disconnections.retain(|d| d.player_id != player);
        before != self.disconnections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Coordinate {
        s.parse().unwrap()
    }

    fn board(entries: &[(&str, &[&str])]) -> Board {
        Board::new(
            entries
                .iter()
                .map(|(id, cells)| (id.to_string(), cells.iter().map(|c| cell(c)).collect()))
                .collect(),
        )
    }

    #[test]
    fn test_board_ship_at_finds_owner() {
        let b = board(&[("Destroyer", &["B1", "B2"]), ("Sub", &["D4"])]);
        assert_eq!(b.ship_at(&cell("B2")).map(String::as_str), Some("Destroyer"));
        assert_eq!(b.ship_at(&cell("D4")).map(String::as_str), Some("Sub"));
        assert!(b.ship_at(&cell("A1")).is_none());
    }

    #[test]
    fn test_hit_record_record_is_idempotent() {
        let mut hits = HitRecord::default();
        assert!(hits.record("Destroyer", cell("B1")));
        let once = hits.clone();
        assert!(!hits.record("Destroyer", cell("B1")));
        assert_eq!(hits, once);
        assert_eq!(hits.total(), 1);
    }

    #[test]
    fn test_hit_record_sunk_only_when_every_cell_hit() {
        let b = board(&[("Destroyer", &["B1", "B2"]), ("Sub", &["D4"])]);
        let mut hits = HitRecord::default();
        hits.record("Destroyer", cell("B1"));
        assert!(!hits.is_sunk(&b, "Destroyer"));
        hits.record("Destroyer", cell("B2"));
        assert!(hits.is_sunk(&b, "Destroyer"));
        assert!(!hits.all_sunk(&b));
        hits.record("Sub", cell("D4"));
        assert!(hits.all_sunk(&b));
    }

    #[test]
    fn test_hit_record_all_sunk_false_for_empty_board() {
        assert!(!HitRecord::default().all_sunk(&Board::default()));
    }

    #[test]
    fn test_game_status_next_follows_strict_order() {
        assert_eq!(
            GameStatus::WaitingForOpponent.next(),
            Some(GameStatus::PlacingShips)
        );
        assert_eq!(GameStatus::PlacingShips.next(), Some(GameStatus::InProgress));
        assert_eq!(GameStatus::InProgress.next(), Some(GameStatus::Finished));
        assert_eq!(GameStatus::Finished.next(), None);
    }

    #[test]
    fn test_game_status_can_transition_to_never_regresses() {
        assert!(GameStatus::PlacingShips.can_transition_to(GameStatus::InProgress));
        assert!(GameStatus::PlacingShips.can_transition_to(GameStatus::Finished));
        assert!(!GameStatus::InProgress.can_transition_to(GameStatus::PlacingShips));
        assert!(!GameStatus::Finished.can_transition_to(GameStatus::Finished));
        assert!(!GameStatus::Finished.can_transition_to(GameStatus::InProgress));
    }

    #[test]
    fn test_game_session_opponent_of() {
        let a = PlayerId::new_random();
        let b = PlayerId::new_random();
        let s = GameSession::new(GameId::new_random(), [a, b], 0);
        assert_eq!(s.opponent_of(a), Some(b));
        assert_eq!(s.opponent_of(b), Some(a));
        assert_eq!(s.opponent_of(PlayerId::new_random()), None);
    }

    #[test]
    fn test_game_session_finish_sets_end_time_once() {
        let a = PlayerId::new_random();
        let b = PlayerId::new_random();
        let mut s = GameSession::new(GameId::new_random(), [a, b], 10);
        s.status = GameStatus::InProgress;
        s.current_turn = Some(a);

        assert!(s.finish(Some(a), 20));
        assert_eq!(s.end_time, Some(20));
        assert_eq!(s.current_turn, None);

        assert!(!s.finish(Some(b), 30));
        assert_eq!(s.end_time, Some(20));
        assert_eq!(s.winner, Some(a));
    }

    #[test]
    fn test_game_session_store_roundtrip_preserves_fields() {
        let a = PlayerId::new_random();
        let b = PlayerId::new_random();
        let mut s = GameSession::new(GameId::new_random(), [a, b], 1_700_000_000);
        s.status = GameStatus::InProgress;
        s.current_turn = Some(b);
        s.record_disconnection(Disconnection {
            player_id: a,
            at: 1_700_000_100,
            reconnect_window_secs: 300,
        });

        let json = serde_json::to_vec(&s).unwrap();
        let back: GameSession = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_game_session_record_disconnection_replaces_entry() {
        let a = PlayerId::new_random();
        let mut s = GameSession::new(GameId::new_random(), [a, PlayerId::new_random()], 0);
        for at in [1, 2] {
            s.record_disconnection(Disconnection {
                player_id: a,
                at,
                reconnect_window_secs: 300,
            });
        }
        assert_eq!(s.disconnections.len(), 1);
        assert_eq!(s.disconnections[0].at, 2);
        assert!(s.clear_disconnection(a));
        assert!(!s.clear_disconnection(a));
    }
}
