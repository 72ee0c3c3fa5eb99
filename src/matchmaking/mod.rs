//! Matchmaking - waiting pool and the coordinator that pairs it

pub mod queue;
pub mod service;

pub use service::{Coordinator, MatchmakingError, MatchmakingHandle, MatchmakingStats, QueueRequest};
