//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::lobby::EntryLobby;
use crate::matchmaking::{Coordinator, MatchmakingHandle};
use crate::ws::connection::ConnRef;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lobby: Arc<EntryLobby>,
    pub matchmaking: MatchmakingHandle,
}

/// Long-running tasks the state depends on, to be spawned by the caller
pub struct Services {
    pub coordinator: Coordinator,
    pub recycled: mpsc::UnboundedReceiver<ConnRef>,
}

impl AppState {
    pub fn new(config: Config) -> (Self, Services) {
        let config = Arc::new(config);

        // Connections released by finished matches flow back to the lobby
        let (recycle_tx, recycled) = mpsc::unbounded_channel();

        // Initialize matchmaking coordinator
        let (coordinator, matchmaking) = Coordinator::new(config.match_settings(), recycle_tx);

        // Initialize entry lobby
        let lobby = EntryLobby::new(matchmaking.clone());

        let state = Self {
            config,
            lobby,
            matchmaking,
        };
        (state, Services { coordinator, recycled })
    }

    /// Spawn the coordinator and the lobby recycler on the current runtime
    pub fn spawn_services(&self, services: Services) {
        tokio::spawn(services.coordinator.run());
        tokio::spawn(self.lobby.clone().run_recycler(services.recycled));
    }
}
