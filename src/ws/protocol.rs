//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::{Cell, FightResult, MoveError, MoveMessage};

/// Messages accepted while idle in the lobby
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum LobbyMsg {
    /// Ask to be paired with another player
    FindMatch,
}

/// Messages accepted while playing a match
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum MatchMsg {
    /// Submit the moves of one turn
    Move {
        #[serde(default)]
        moves: Vec<MoveMessage>,
    },
}

/// Fog-of-war board carried inside welcome and update messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum BoardSnapshot {
    /// Initial board sent with the welcome
    Start { board: Vec<Vec<Cell>> },

    /// Board after a turn, with the fights the receiver took part in
    Update {
        board: Vec<Vec<Cell>>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fight: Vec<FightResult>,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Match start, sent once to each participant
    Welcome {
        /// Participants in turn order
        players: Vec<String>,
        board: BoardSnapshot,
        you: String,
        next: String,
        ink: u32,
        /// Round-trip latency in milliseconds
        ping: u64,
    },

    /// State after a turn or a disconnect
    Update {
        board: BoardSnapshot,
        you: String,
        next: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<String>,
        ink: u32,
        ping: u64,
    },

    /// The match is over; the connection returns to the lobby
    Finish { ping: u64 },

    /// A rejected request, sent only to its sender
    Error {
        problem: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
}

impl From<&MoveError> for ServerMsg {
    fn from(err: &MoveError) -> Self {
        ServerMsg::Error {
            problem: err.problem(),
            data: err
                .offending_move()
                .and_then(|mv| serde_json::to_value(mv).ok()),
        }
    }
}
