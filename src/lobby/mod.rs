//! Entry lobby - idle connections waiting to ask for a match

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::matchmaking::MatchmakingHandle;
use crate::ws::connection::{ConnRef, ConnectionEvent, ListenerId};
use crate::ws::protocol::LobbyMsg;

#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("connection {0} is already in the lobby")]
    AlreadyIdle(String),
}

struct Idle {
    conn: ConnRef,
    listener: ListenerId,
}

/// Holds connected players that are neither waiting nor playing
pub struct EntryLobby {
    idle: Mutex<HashMap<String, Idle>>,
    matchmaking: MatchmakingHandle,
}

impl EntryLobby {
    pub fn new(matchmaking: MatchmakingHandle) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(HashMap::new()),
            matchmaking,
        })
    }

    /// Admit a connection and listen for its lobby commands
    pub fn join(self: &Arc<Self>, conn: ConnRef) -> Result<(), LobbyError> {
        let identity = conn.identity().to_string();
        let mut idle = self.idle.lock();
        if idle.contains_key(&identity) {
            return Err(LobbyError::AlreadyIdle(identity));
        }

        let lobby: Weak<Self> = Arc::downgrade(self);
        let listener = conn.listen(Arc::new(move |conn: &ConnRef, event: ConnectionEvent| {
            let Some(lobby) = lobby.upgrade() else {
                return;
            };
            match event {
                ConnectionEvent::Closed => {
                    if lobby.remove(conn.identity()).is_some() {
                        info!(identity = %conn.identity(), "Idle connection closed");
                    }
                }
                ConnectionEvent::Message(raw) => match serde_json::from_str::<LobbyMsg>(&raw) {
                    Ok(msg) => lobby.process(conn, msg),
                    Err(e) => {
                        warn!(identity = %conn.identity(), error = %e, "Invalid lobby message");
                    }
                },
            }
        }));

        idle.insert(
            identity.clone(),
            Idle {
                conn: conn.clone(),
                listener,
            },
        );
        drop(idle);

        info!(identity = %identity, "Connection joined lobby");

        // Closed before the listener was installed: nothing will report it.
        if !conn.is_open() {
            self.remove(&identity);
        }
        Ok(())
    }

    /// Number of idle connections
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.idle.lock().contains_key(identity)
    }

    /// Detach and forget an idle connection
    fn remove(&self, identity: &str) -> Option<ConnRef> {
        let entry = self.idle.lock().remove(identity)?;
        entry.conn.remove(entry.listener);
        Some(entry.conn)
    }

    fn process(&self, conn: &ConnRef, msg: LobbyMsg) {
        match msg {
            LobbyMsg::FindMatch => self.make_match(conn),
        }
    }

    fn make_match(&self, conn: &ConnRef) {
        let Some(conn) = self.remove(conn.identity()) else {
            debug!(identity = %conn.identity(), "findMatch from connection not in lobby");
            return;
        };
        let identity = conn.identity().to_string();
        if let Err(e) = self.matchmaking.find_match(conn) {
            warn!(identity = %identity, error = %e, "Could not hand connection to matchmaking");
        }
    }

    /// Re-admit connections released by finished matches
    pub async fn run_recycler(self: Arc<Self>, mut recycled: mpsc::UnboundedReceiver<ConnRef>) {
        while let Some(conn) = recycled.recv().await {
            if let Err(e) = self.join(conn) {
                warn!(error = %e, "Failed to re-admit connection");
            }
        }
        debug!("Recycler stopped");
    }
}
