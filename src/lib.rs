//! Paper Ink Server - game core and transport for two-player grid battles
//!
//! Connections enter the [`lobby`], ask [`matchmaking`] for an opponent and
//! play a [`game::MatchSession`] on an authoritative [`game::Board`].

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod matchmaking;
pub mod util;
pub mod ws;
