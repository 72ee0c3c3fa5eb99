//! Connection capability shared by the lobby, matchmaking and match layers

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::protocol::ServerMsg;

/// Shared handle to a live connection
pub type ConnRef = Arc<dyn Connection>;

/// Callback invoked for every event on a connection
pub type Handler = Arc<dyn Fn(&ConnRef, ConnectionEvent) + Send + Sync>;

/// Handle returned by [`Connection::listen`], used to detach the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Events a transport reports to its listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A text payload arrived
    Message(String),
    /// The peer closed or the transport failed; no further events follow
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A bidirectional client connection as seen by the game core
pub trait Connection: Send + Sync {
    /// Stable identity for the lifetime of the connection
    fn identity(&self) -> &str;

    /// Register a handler for incoming events
    fn listen(&self, handler: Handler) -> ListenerId;

    /// Detach a previously registered handler
    fn remove(&self, listener: ListenerId);

    /// Queue a raw payload for delivery
    fn send(&self, raw: String) -> Result<(), SendError>;

    /// Last measured round-trip latency
    fn ping(&self) -> Duration;

    fn is_open(&self) -> bool;

    /// Encode and queue a server message
    fn send_msg(&self, msg: &ServerMsg) -> Result<(), SendError> {
        let raw = serde_json::to_string(msg)?;
        self.send(raw)
    }
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity())
            .finish()
    }
}

/// Listener registry backing a [`Connection`] implementation
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    handlers: DashMap<ListenerId, Handler>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.insert(id, handler);
        id
    }

    pub fn remove(&self, id: ListenerId) {
        self.handlers.remove(&id);
    }

    /// Deliver `event` to every registered handler.
    ///
    /// Handlers run outside the registry lock so they may add or remove
    /// listeners themselves.
    pub fn dispatch(&self, conn: &ConnRef, event: ConnectionEvent) {
        let handlers: Vec<Handler> = self
            .handlers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for handler in handlers {
            handler(conn, event.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&self) {
        self.handlers.clear();
    }
}
