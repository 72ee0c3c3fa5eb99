//! Board state machine - grid, ink economy, turn order, move validation

use std::collections::HashMap;

use serde::{Deserialize, Serialize, Serializer};

use super::combat::{self, Victor};
use super::snapshot;

/// Ink every player starts with
pub const INITIAL_INK: u32 = 5;
/// Ink granted to every player each time the turn order wraps around
pub const INK_PER_ROUND: u32 = 5;
/// Weakest unit that can be placed or moved
pub const MIN_UNIT: i32 = 1;
/// Strongest unit that can be placed or moved
pub const MAX_UNIT: i32 = 5;
/// `from` coordinate marking a placement instead of a relocation
pub const PLACEMENT: [i32; 2] = [-1, -1];
/// Maximum number of players (one per corner)
pub const MAX_PLAYERS: usize = 4;

/// Grid position as (row, col)
pub type Pos = (usize, usize);

/// A single grid cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cell {
    /// Identity of the owning player, `None` when unowned or fogged
    pub owner: Option<String>,
    /// Unit strength; 0 = no unit, -1 = hidden by fog
    pub value: i32,
    /// Set when the cell received a move in the batch being applied
    #[serde(skip)]
    pub used: bool,
}

impl Cell {
    /// Value of a cell masked by fog of war
    pub const HIDDEN: i32 = -1;

    pub fn new(owner: impl Into<String>, value: i32) -> Self {
        Self {
            owner: Some(owner.into()),
            value,
            used: false,
        }
    }

    pub fn hidden() -> Self {
        Self {
            owner: None,
            value: Self::HIDDEN,
            used: false,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.value == Self::HIDDEN
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0
    }

    pub fn owned_by(&self, uid: &str) -> bool {
        self.owner.as_deref() == Some(uid)
    }
}

/// A single move inside a turn batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveMessage {
    /// Source cell, or [`PLACEMENT`] for a newly placed unit
    pub from: [i32; 2],
    pub to: [i32; 2],
    pub number: i32,
}

impl MoveMessage {
    pub fn place(to: Pos, number: i32) -> Self {
        Self {
            from: PLACEMENT,
            to: [to.0 as i32, to.1 as i32],
            number,
        }
    }

    pub fn relocate(from: Pos, to: Pos, number: i32) -> Self {
        Self {
            from: [from.0 as i32, from.1 as i32],
            to: [to.0 as i32, to.1 as i32],
            number,
        }
    }

    pub fn is_placement(&self) -> bool {
        self.from == PLACEMENT
    }
}

/// Who came out of a fight on top
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FightWinner {
    Player(String),
    Tie,
}

impl Serialize for FightWinner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FightWinner::Player(id) => serializer.serialize_str(id),
            FightWinner::Tie => serializer.serialize_str("tie"),
        }
    }
}

/// Outcome of one fight, reported to both participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FightResult {
    #[serde(rename = "move")]
    pub mv: MoveMessage,
    pub defender_value_before: i32,
    pub attacker: String,
    pub defender: String,
    pub winner: FightWinner,
    pub resulting_attacker_value: i32,
    pub resulting_defender_value: i32,
}

/// Errors raised while constructing a board
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("a board needs at least one player")]
    NoPlayers,

    #[error("at most {MAX_PLAYERS} players fit on a board, got {0}")]
    TooManyPlayers(usize),

    #[error("player {0} listed twice")]
    DuplicatePlayer(String),

    #[error("board must be at least 2x2, got {height}x{width}")]
    TooSmall { height: usize, width: usize },
}

/// Move validation failures, reported only to the offending player
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("not current")]
    NotCurrent,

    #[error("invalid number")]
    InvalidNumber(MoveMessage),

    #[error("out of bounds")]
    OutOfBounds(MoveMessage),

    #[error("not own")]
    NotOwn(MoveMessage),

    #[error("already filled")]
    AlreadyFilled(MoveMessage),

    #[error("insufficient resource")]
    InsufficientInk(MoveMessage),

    #[error("same cell")]
    SameCell(MoveMessage),

    #[error("friendly overwrite")]
    FriendlyOverwrite(MoveMessage),

    #[error("inconsistent state")]
    InconsistentState(MoveMessage),

    #[error("invalid distance")]
    InvalidDistance(MoveMessage),

    #[error("already moved")]
    AlreadyMoved(MoveMessage),
}

impl MoveError {
    /// Wire `problem` string
    pub fn problem(&self) -> String {
        self.to_string()
    }

    /// The move that was rejected, if the error concerns a single move
    pub fn offending_move(&self) -> Option<&MoveMessage> {
        match self {
            MoveError::NotCurrent => None,
            MoveError::InvalidNumber(mv)
            | MoveError::OutOfBounds(mv)
            | MoveError::NotOwn(mv)
            | MoveError::AlreadyFilled(mv)
            | MoveError::InsufficientInk(mv)
            | MoveError::SameCell(mv)
            | MoveError::FriendlyOverwrite(mv)
            | MoveError::InconsistentState(mv)
            | MoveError::InvalidDistance(mv)
            | MoveError::AlreadyMoved(mv) => Some(mv),
        }
    }
}

/// Authoritative board of one match
#[derive(Debug, Clone)]
pub struct Board {
    grid: Vec<Vec<Cell>>,
    height: usize,
    width: usize,
    players: Vec<String>,
    current: usize,
    ink: HashMap<String, u32>,
    fights: HashMap<String, Vec<FightResult>>,
    /// Destinations marked `used` during the batch being applied
    touched: Vec<Pos>,
}

impl Board {
    /// Create a board with every player anchored on its own corner
    pub fn new(height: usize, width: usize, players: Vec<String>) -> Result<Self, BoardError> {
        if height < 2 || width < 2 {
            return Err(BoardError::TooSmall { height, width });
        }
        if players.is_empty() {
            return Err(BoardError::NoPlayers);
        }
        if players.len() > MAX_PLAYERS {
            return Err(BoardError::TooManyPlayers(players.len()));
        }
        for (i, player) in players.iter().enumerate() {
            if players[..i].contains(player) {
                return Err(BoardError::DuplicatePlayer(player.clone()));
            }
        }

        let mut board = Self {
            grid: vec![vec![Cell::default(); width]; height],
            height,
            width,
            ink: players.iter().map(|p| (p.clone(), INITIAL_INK)).collect(),
            players,
            current: 0,
            fights: HashMap::new(),
            touched: Vec::new(),
        };

        let anchors = [
            (0, 0),
            (height - 1, 0),
            (0, width - 1),
            (height - 1, width - 1),
        ];
        for (player, (row, col)) in board.players.iter().zip(anchors) {
            board.grid[row][col].owner = Some(player.clone());
        }

        Ok(board)
    }

    /// Players in turn order
    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn is_current(&self, uid: &str) -> bool {
        self.current_player() == uid
    }

    pub fn current_player(&self) -> &str {
        &self.players[self.current]
    }

    /// Unmasked cell, for inspection
    pub fn cell(&self, (row, col): Pos) -> Option<&Cell> {
        self.grid.get(row).and_then(|r| r.get(col))
    }

    /// Apply a batch of moves for `player`.
    ///
    /// Moves are validated and applied one at a time. The first invalid move
    /// aborts the batch; moves applied before it stay applied and the turn does
    /// not advance. A fully applied batch hands the turn to the next player.
    pub fn make_moves(&mut self, player: &str, moves: &[MoveMessage]) -> Result<(), MoveError> {
        if !self.is_current(player) {
            return Err(MoveError::NotCurrent);
        }

        let outcome = self.apply_batch(player, moves);
        self.clear_used();
        outcome?;

        self.advance_turn();
        Ok(())
    }

    fn apply_batch(&mut self, player: &str, moves: &[MoveMessage]) -> Result<(), MoveError> {
        for mv in moves {
            self.verify_move(player, mv)?;
            if let Some(fight) = self.apply_move(player, mv) {
                self.record_fight(fight);
            }
        }
        Ok(())
    }

    /// Check a single move against the current grid without applying it
    pub fn verify_move(&self, player: &str, mv: &MoveMessage) -> Result<(), MoveError> {
        if !(MIN_UNIT..=MAX_UNIT).contains(&mv.number) {
            return Err(MoveError::InvalidNumber(*mv));
        }
        let to = self.locate(mv.to).ok_or(MoveError::OutOfBounds(*mv))?;
        let to_cell = &self.grid[to.0][to.1];

        if mv.is_placement() {
            if !to_cell.owned_by(player) {
                return Err(MoveError::NotOwn(*mv));
            }
            if !to_cell.is_empty() {
                return Err(MoveError::AlreadyFilled(*mv));
            }
            if mv.number as u32 > self.ink(player) {
                return Err(MoveError::InsufficientInk(*mv));
            }
            return Ok(());
        }

        let from = self.locate(mv.from).ok_or(MoveError::OutOfBounds(*mv))?;
        let from_cell = &self.grid[from.0][from.1];

        if !from_cell.owned_by(player) {
            return Err(MoveError::NotOwn(*mv));
        }
        if from == to {
            return Err(MoveError::SameCell(*mv));
        }
        if to_cell.owned_by(player) && !to_cell.is_empty() {
            return Err(MoveError::FriendlyOverwrite(*mv));
        }
        if from_cell.value != mv.number {
            return Err(MoveError::InconsistentState(*mv));
        }
        if from.0.abs_diff(to.0) > 1 || from.1.abs_diff(to.1) > 1 {
            return Err(MoveError::InvalidDistance(*mv));
        }
        if from_cell.used || to_cell.used {
            return Err(MoveError::AlreadyMoved(*mv));
        }
        Ok(())
    }

    /// Apply an already verified move, returning the fight it caused if any
    fn apply_move(&mut self, player: &str, mv: &MoveMessage) -> Option<FightResult> {
        let Some(to) = self.locate(mv.to) else {
            return None;
        };
        self.mark_used(to);

        if mv.is_placement() {
            if let Some(ink) = self.ink.get_mut(player) {
                *ink -= mv.number as u32;
            }
            self.grid[to.0][to.1].value = mv.number;
            return None;
        }

        let from = self.locate(mv.from)?;
        if self.grid[to.0][to.1].is_empty() {
            let value = std::mem::take(&mut self.grid[from.0][from.1].value);
            let owner = self.grid[from.0][from.1].owner.clone();
            let target = &mut self.grid[to.0][to.1];
            target.value = value;
            target.owner = owner;
            return None;
        }

        Some(self.fight(mv, from, to))
    }

    /// Resolve combat between the unit on `from` and the unit on `to`
    fn fight(&mut self, mv: &MoveMessage, from: Pos, to: Pos) -> FightResult {
        let mut attacker = std::mem::take(&mut self.grid[from.0][from.1]);
        let mut defender = std::mem::take(&mut self.grid[to.0][to.1]);

        let result = resolve_fight(mv, &mut attacker, &mut defender);

        self.grid[from.0][from.1] = attacker;
        self.grid[to.0][to.1] = defender;
        result
    }

    fn record_fight(&mut self, fight: FightResult) {
        self.fights
            .entry(fight.defender.clone())
            .or_default()
            .push(fight.clone());
        if fight.attacker != fight.defender {
            self.fights.entry(fight.attacker.clone()).or_default().push(fight);
        }
    }

    fn mark_used(&mut self, pos: Pos) {
        self.grid[pos.0][pos.1].used = true;
        self.touched.push(pos);
    }

    fn clear_used(&mut self) {
        for (row, col) in self.touched.drain(..) {
            self.grid[row][col].used = false;
        }
    }

    fn advance_turn(&mut self) {
        self.current = (self.current + 1) % self.players.len();
        if self.current == 0 {
            for ink in self.ink.values_mut() {
                *ink += INK_PER_ROUND;
            }
        }
    }

    fn locate(&self, [row, col]: [i32; 2]) -> Option<Pos> {
        let row = usize::try_from(row).ok()?;
        let col = usize::try_from(col).ok()?;
        (row < self.height && col < self.width).then_some((row, col))
    }

    /// Copy of the grid as seen by `uid` through fog of war
    pub fn board_for(&self, uid: &str) -> Vec<Vec<Cell>> {
        snapshot::fog_of_war(&self.grid, uid)
    }

    /// The sole remaining owner on the board, if there is exactly one
    pub fn winner(&self) -> Option<String> {
        let mut owners = self.grid.iter().flatten().filter_map(|c| c.owner.as_deref());
        let first = owners.next()?;
        owners.all(|o| o == first).then(|| first.to_string())
    }

    pub fn ink(&self, uid: &str) -> u32 {
        self.ink.get(uid).copied().unwrap_or(0)
    }

    /// Fights `uid` took part in since the last reset
    pub fn fights(&self, uid: &str) -> &[FightResult] {
        self.fights.get(uid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop the fight results of the turn that was just broadcast
    pub fn reset_fight_cache(&mut self) {
        self.fights.clear();
    }
}

/// Resolve a fight between two cells and describe it.
///
/// The attacker's cell always ends up with value 0; the defender's cell holds
/// whichever unit survived.
pub fn resolve_fight(mv: &MoveMessage, attacker: &mut Cell, defender: &mut Cell) -> FightResult {
    let attacker_id = attacker.owner.clone().unwrap_or_default();
    let defender_id = defender.owner.clone().unwrap_or_default();
    let defender_value_before = defender.value;

    let (victor, survivor) = combat::resolve(attacker, defender);

    let (winner, resulting_attacker_value, resulting_defender_value) = match victor {
        Victor::Attacker => (FightWinner::Player(attacker_id.clone()), survivor, 0),
        Victor::Defender => (FightWinner::Player(defender_id.clone()), 0, survivor),
        Victor::Tie => (FightWinner::Tie, 0, 0),
    };

    FightResult {
        mv: *mv,
        defender_value_before,
        attacker: attacker_id,
        defender: defender_id,
        winner,
        resulting_attacker_value,
        resulting_defender_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Board {
        Board::new(5, 5, vec!["a".into(), "b".into()]).unwrap()
    }

    fn set(board: &mut Board, (row, col): Pos, owner: &str, value: i32) {
        board.grid[row][col] = Cell::new(owner, value);
    }

    #[test]
    fn new_board_anchors_players_on_corners() {
        let board = Board::new(5, 4, vec!["a".into(), "b".into(), "c".into()]).unwrap();
        assert!(board.cell((0, 0)).unwrap().owned_by("a"));
        assert!(board.cell((4, 0)).unwrap().owned_by("b"));
        assert!(board.cell((0, 3)).unwrap().owned_by("c"));
        assert_eq!(board.cell((4, 3)).unwrap().owner, None);
        assert_eq!(board.cell((0, 0)).unwrap().value, 0);
        assert_eq!(board.ink("a"), INITIAL_INK);
        assert_eq!(board.current_player(), "a");
    }

    #[test]
    fn new_board_rejects_bad_setups() {
        assert_eq!(Board::new(5, 5, vec![]).unwrap_err(), BoardError::NoPlayers);
        assert_eq!(
            Board::new(1, 5, vec!["a".into()]).unwrap_err(),
            BoardError::TooSmall { height: 1, width: 5 }
        );
        assert_eq!(
            Board::new(5, 5, vec!["a".into(), "a".into()]).unwrap_err(),
            BoardError::DuplicatePlayer("a".into())
        );
        let five = (0..5).map(|i| i.to_string()).collect();
        assert_eq!(Board::new(5, 5, five).unwrap_err(), BoardError::TooManyPlayers(5));
    }

    #[test]
    fn out_of_turn_batch_is_rejected_without_mutation() {
        let mut board = board();
        let before = board.grid.clone();
        let err = board
            .make_moves("b", &[MoveMessage::place((4, 0), 1)])
            .unwrap_err();
        assert_eq!(err, MoveError::NotCurrent);
        assert_eq!(board.grid, before);
        assert_eq!(board.current_player(), "a");
    }

    #[test]
    fn placement_spends_ink_and_passes_turn() {
        let mut board = board();
        board.make_moves("a", &[MoveMessage::place((0, 0), 3)]).unwrap();
        assert_eq!(board.cell((0, 0)).unwrap().value, 3);
        assert_eq!(board.ink("a"), 2);
        assert_eq!(board.current_player(), "b");
    }

    #[test]
    fn placement_beyond_ink_is_rejected_and_grid_unchanged() {
        let mut board = board();
        board.ink.insert("a".into(), 2);
        let before = board.grid.clone();
        let err = board
            .make_moves("a", &[MoveMessage::place((0, 0), 3)])
            .unwrap_err();
        assert_eq!(err, MoveError::InsufficientInk(MoveMessage::place((0, 0), 3)));
        assert_eq!(err.problem(), "insufficient resource");
        assert_eq!(board.grid, before);
        assert_eq!(board.ink("a"), 2);
    }

    #[test]
    fn placement_requires_owned_empty_cell() {
        let board = {
            let mut b = board();
            set(&mut b, (0, 0), "a", 2);
            b
        };
        assert_eq!(
            board.verify_move("a", &MoveMessage::place((0, 0), 1)),
            Err(MoveError::AlreadyFilled(MoveMessage::place((0, 0), 1)))
        );
        assert_eq!(
            board.verify_move("a", &MoveMessage::place((2, 2), 1)),
            Err(MoveError::NotOwn(MoveMessage::place((2, 2), 1)))
        );
    }

    #[test]
    fn number_and_bounds_are_checked_first() {
        let board = board();
        let zero = MoveMessage::place((0, 0), 0);
        assert_eq!(board.verify_move("a", &zero), Err(MoveError::InvalidNumber(zero)));
        let six = MoveMessage::place((0, 0), 6);
        assert_eq!(board.verify_move("a", &six), Err(MoveError::InvalidNumber(six)));
        let off = MoveMessage {
            from: PLACEMENT,
            to: [5, 0],
            number: 1,
        };
        assert_eq!(board.verify_move("a", &off), Err(MoveError::OutOfBounds(off)));
        let bad_from = MoveMessage {
            from: [-1, 0],
            to: [0, 0],
            number: 1,
        };
        assert_eq!(board.verify_move("a", &bad_from), Err(MoveError::OutOfBounds(bad_from)));
    }

    #[test]
    fn relocation_with_stale_number_is_inconsistent() {
        let mut board = board();
        set(&mut board, (0, 0), "a", 3);
        let before = board.grid.clone();
        let mv = MoveMessage::relocate((0, 0), (1, 1), 2);
        let err = board.make_moves("a", &[mv]).unwrap_err();
        assert_eq!(err, MoveError::InconsistentState(mv));
        assert_eq!(err.problem(), "inconsistent state");
        assert_eq!(board.grid, before);
    }

    #[test]
    fn relocation_rules() {
        let mut board = board();
        set(&mut board, (1, 1), "a", 3);
        set(&mut board, (1, 2), "a", 2);
        set(&mut board, (3, 3), "b", 2);

        let same = MoveMessage::relocate((1, 1), (1, 1), 3);
        assert_eq!(board.verify_move("a", &same), Err(MoveError::SameCell(same)));

        let friendly = MoveMessage::relocate((1, 1), (1, 2), 3);
        assert_eq!(board.verify_move("a", &friendly), Err(MoveError::FriendlyOverwrite(friendly)));

        let far = MoveMessage::relocate((1, 1), (3, 1), 3);
        assert_eq!(board.verify_move("a", &far), Err(MoveError::InvalidDistance(far)));

        let theirs = MoveMessage::relocate((3, 3), (3, 2), 2);
        assert_eq!(board.verify_move("a", &theirs), Err(MoveError::NotOwn(theirs)));

        let diagonal = MoveMessage::relocate((1, 1), (2, 2), 3);
        assert_eq!(board.verify_move("a", &diagonal), Ok(()));

        let onto_own_anchor = MoveMessage::relocate((1, 1), (0, 0), 3);
        assert_eq!(board.verify_move("a", &onto_own_anchor), Ok(()));
    }

    #[test]
    fn relocation_moves_unit_and_keeps_territory() {
        let mut board = board();
        set(&mut board, (0, 0), "a", 4);
        board
            .make_moves("a", &[MoveMessage::relocate((0, 0), (1, 1), 4)])
            .unwrap();
        assert_eq!(board.cell((1, 1)).unwrap(), &Cell::new("a", 4));
        assert_eq!(board.cell((0, 0)).unwrap(), &Cell::new("a", 0));
    }

    #[test]
    fn unit_cannot_hop_twice_in_one_batch() {
        let mut board = board();
        set(&mut board, (0, 0), "a", 2);
        let first = MoveMessage::relocate((0, 0), (1, 1), 2);
        let second = MoveMessage::relocate((1, 1), (2, 2), 2);
        let err = board.make_moves("a", &[first, second]).unwrap_err();
        assert_eq!(err, MoveError::AlreadyMoved(second));
        assert!(!board.cell((1, 1)).unwrap().used);
    }

    #[test]
    fn failed_batch_keeps_earlier_moves() {
        let mut board = board();
        set(&mut board, (1, 1), "a", 1);
        let good = MoveMessage::place((0, 0), 2);
        let bad = MoveMessage::relocate((1, 1), (3, 3), 1);
        let err = board.make_moves("a", &[good, bad]).unwrap_err();

        assert_eq!(err, MoveError::InvalidDistance(bad));
        assert_eq!(board.cell((0, 0)).unwrap().value, 2);
        assert_eq!(board.ink("a"), 3);
        assert_eq!(board.current_player(), "a");
    }

    #[test]
    fn full_round_grants_income() {
        let mut board = board();
        board.make_moves("a", &[MoveMessage::place((0, 0), 5)]).unwrap();
        assert_eq!(board.ink("a"), 0);
        board.make_moves("b", &[]).unwrap();
        assert_eq!(board.current_player(), "a");
        assert_eq!(board.ink("a"), INK_PER_ROUND);
        assert_eq!(board.ink("b"), INITIAL_INK + INK_PER_ROUND);
    }

    #[test]
    fn fights_are_cached_for_both_sides() {
        let mut board = board();
        set(&mut board, (1, 1), "a", 3);
        set(&mut board, (2, 2), "b", 2);
        let mv = MoveMessage::relocate((1, 1), (2, 2), 3);
        board.make_moves("a", &[mv]).unwrap();

        let fight = FightResult {
            mv,
            defender_value_before: 2,
            attacker: "a".into(),
            defender: "b".into(),
            winner: FightWinner::Player("a".into()),
            resulting_attacker_value: 1,
            resulting_defender_value: 0,
        };
        assert_eq!(board.fights("a"), &[fight.clone()]);
        assert_eq!(board.fights("b"), &[fight]);
        assert_eq!(board.cell((2, 2)).unwrap(), &Cell::new("a", 1));

        board.reset_fight_cache();
        assert!(board.fights("a").is_empty());
        assert!(board.fights("b").is_empty());
    }

    #[test]
    fn winner_needs_a_single_owner() {
        let mut board = board();
        assert_eq!(board.winner(), None);

        board.grid[4][0] = Cell::default();
        assert_eq!(board.winner(), Some("a".into()));

        for row in board.grid.iter_mut() {
            for cell in row.iter_mut() {
                *cell = Cell::default();
            }
        }
        assert_eq!(board.winner(), None);
    }

    #[test]
    fn fight_result_serializes_with_tie_sentinel() {
        let mut attacker = Cell::new("a", 3);
        let mut defender = Cell::new("b", 3);
        let mv = MoveMessage::relocate((0, 0), (0, 1), 3);
        let result = resolve_fight(&mv, &mut attacker, &mut defender);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["winner"], "tie");
        assert_eq!(json["move"]["from"], serde_json::json!([0, 0]));
        assert_eq!(json["defenderValueBefore"], 3);
        assert_eq!(defender.owner, None);
    }
}
