//! Matchmaking coordinator - pairs waiting connections into match sessions

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::game::{MatchSession, MatchSettings};
use crate::ws::connection::{ConnRef, ConnectionEvent};

use super::queue::{Waiting, WaitingPool};

/// Requests feeding the waiting pool
#[derive(Debug)]
pub enum QueueRequest {
    /// An idle connection wants a match
    Join(ConnRef),
    /// A waiting connection closed
    Leave(String),
}

/// Snapshot of coordinator state published after every event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchmakingStats {
    pub waiting: usize,
    pub active_matches: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("matchmaking coordinator is not running")]
    Stopped,
}

/// Cloneable entry point into the coordinator
#[derive(Clone)]
pub struct MatchmakingHandle {
    requests: mpsc::UnboundedSender<QueueRequest>,
    stats: watch::Receiver<MatchmakingStats>,
}

impl MatchmakingHandle {
    /// Hand a connection to the waiting pool
    pub fn find_match(&self, conn: ConnRef) -> Result<(), MatchmakingError> {
        self.requests
            .send(QueueRequest::Join(conn))
            .map_err(|_| MatchmakingError::Stopped)
    }

    /// Latest published pool and registry sizes
    pub fn stats(&self) -> MatchmakingStats {
        *self.stats.borrow()
    }
}

/// The coordinator actor.
///
/// Owns the waiting pool and the session registry; both are mutated only
/// from [`Coordinator::run`], one event at a time.
pub struct Coordinator {
    settings: MatchSettings,
    pool: WaitingPool,
    sessions: HashMap<Uuid, Arc<MatchSession>>,
    requests_rx: mpsc::UnboundedReceiver<QueueRequest>,
    requests_tx: mpsc::WeakUnboundedSender<QueueRequest>,
    finished_tx: mpsc::UnboundedSender<Uuid>,
    finished_rx: mpsc::UnboundedReceiver<Uuid>,
    recycle_tx: mpsc::UnboundedSender<ConnRef>,
    stats_tx: watch::Sender<MatchmakingStats>,
}

impl Coordinator {
    /// Build the coordinator; connections freed by finished matches are sent
    /// to `recycle_tx`.
    pub fn new(
        settings: MatchSettings,
        recycle_tx: mpsc::UnboundedSender<ConnRef>,
    ) -> (Self, MatchmakingHandle) {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats) = watch::channel(MatchmakingStats::default());

        let coordinator = Self {
            settings,
            pool: WaitingPool::new(),
            sessions: HashMap::new(),
            requests_rx,
            requests_tx: requests.downgrade(),
            finished_tx,
            finished_rx,
            recycle_tx,
            stats_tx,
        };

        (coordinator, MatchmakingHandle { requests, stats })
    }

    /// Run the event loop until every [`MatchmakingHandle`] is dropped
    pub async fn run(mut self) {
        info!("Matchmaking coordinator started");

        loop {
            tokio::select! {
                request = self.requests_rx.recv() => match request {
                    Some(QueueRequest::Join(conn)) => self.enqueue(conn),
                    Some(QueueRequest::Leave(identity)) => self.leave(&identity),
                    None => break,
                },
                Some(match_id) = self.finished_rx.recv() => self.recycle(match_id),
            }
            self.publish_stats();
        }

        info!(
            waiting = self.pool.len(),
            active_matches = self.sessions.len(),
            "Matchmaking coordinator stopped"
        );
    }

    fn enqueue(&mut self, conn: ConnRef) {
        let identity = conn.identity().to_string();
        if self.pool.contains(&identity) {
            debug!(identity = %identity, "Already waiting for a match");
            return;
        }
        if !conn.is_open() {
            debug!(identity = %identity, "Dropping closed connection");
            return;
        }

        let requests = self.requests_tx.clone();
        let listener = conn.listen(Arc::new(move |conn: &ConnRef, event: ConnectionEvent| {
            if event != ConnectionEvent::Closed {
                return;
            }
            let Some(requests) = requests.upgrade() else {
                return;
            };
            if requests
                .send(QueueRequest::Leave(conn.identity().to_string()))
                .is_err()
            {
                debug!(identity = %conn.identity(), "Coordinator stopped, leave not delivered");
            }
        }));

        self.pool.insert(Waiting::new(conn, listener));
        info!(identity = %identity, queue_size = self.pool.len(), "Connection joined waiting pool");

        if let Some((first, second)) = self.pool.take_pair() {
            self.create_match(first, second);
        }
    }

    fn leave(&mut self, identity: &str) {
        if let Some(entry) = self.pool.remove(identity) {
            entry.conn.remove(entry.listener);
            info!(
                identity = %identity,
                waited_ms = entry.wait_time().as_millis() as u64,
                "Connection left waiting pool"
            );
        }
    }

    fn create_match(&mut self, first: Waiting, second: Waiting) {
        for entry in [&first, &second] {
            entry.conn.remove(entry.listener);
        }

        // A close may have raced the pairing; keep whoever is still there.
        if !first.conn.is_open() || !second.conn.is_open() {
            for entry in [first, second] {
                if entry.conn.is_open() {
                    self.enqueue(entry.conn);
                }
            }
            return;
        }

        let match_id = Uuid::new_v4();
        let connections = vec![first.conn.clone(), second.conn.clone()];
        match MatchSession::start(match_id, connections, &self.settings, self.finished_tx.clone()) {
            Ok(session) => {
                self.sessions.insert(match_id, session);
                info!(
                    match_id = %match_id,
                    players = ?[first.identity(), second.identity()],
                    active_matches = self.sessions.len(),
                    "Created new match"
                );
            }
            Err(e) => {
                error!(match_id = %match_id, error = %e, "Failed to create match");
                self.hand_back(first.conn);
                self.hand_back(second.conn);
            }
        }
    }

    fn recycle(&mut self, match_id: Uuid) {
        let Some(session) = self.sessions.remove(&match_id) else {
            warn!(match_id = %match_id, "Finished match not registered");
            return;
        };

        for conn in session.participants() {
            if conn.is_open() {
                self.hand_back(conn);
            }
        }
        info!(match_id = %match_id, active_matches = self.sessions.len(), "Match removed from registry");
    }

    fn hand_back(&self, conn: ConnRef) {
        if self.recycle_tx.send(conn).is_err() {
            warn!("Lobby is gone, dropping recycled connection");
        }
    }

    fn publish_stats(&self) {
        let stats = MatchmakingStats {
            waiting: self.pool.len(),
            active_matches: self.sessions.len(),
        };
        self.stats_tx.send_if_modified(|current| {
            let changed = *current != stats;
            *current = stats;
            changed
        });
    }
}
