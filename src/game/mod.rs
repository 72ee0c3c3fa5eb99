//! Game modules - board rules and match sessions

pub mod board;
pub mod combat;
pub mod r#match;
pub mod snapshot;

pub use board::{Board, BoardError, Cell, FightResult, FightWinner, MoveError, MoveMessage};
pub use r#match::{MatchSession, SessionError};

/// Board dimensions used for every new match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSettings {
    pub board_height: usize,
    pub board_width: usize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            board_height: 5,
            board_width: 5,
        }
    }
}
