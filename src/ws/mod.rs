//! WebSocket transport and wire protocol

pub mod connection;
pub mod handler;
pub mod protocol;
pub mod socket;

pub use connection::{ConnRef, Connection, ConnectionEvent, Handler, ListenerId, Listeners, SendError};
