//! Waiting pool of connections that asked for a match

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ws::connection::{ConnRef, ListenerId};

/// Connection in the waiting pool
pub struct Waiting {
    pub conn: ConnRef,
    /// Listener watching for a close while waiting
    pub listener: ListenerId,
    pub queued_at: Instant,
}

impl Waiting {
    pub fn new(conn: ConnRef, listener: ListenerId) -> Self {
        Self {
            conn,
            listener,
            queued_at: Instant::now(),
        }
    }

    pub fn identity(&self) -> &str {
        self.conn.identity()
    }

    /// How long this connection has been waiting
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// Set of waiting connections keyed by identity
#[derive(Default)]
pub struct WaitingPool {
    waiting: HashMap<String, Waiting>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection; returns false if its identity is already waiting
    pub fn insert(&mut self, entry: Waiting) -> bool {
        let identity = entry.identity().to_string();
        if self.waiting.contains_key(&identity) {
            return false;
        }
        self.waiting.insert(identity, entry);
        true
    }

    pub fn remove(&mut self, identity: &str) -> Option<Waiting> {
        self.waiting.remove(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.waiting.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Take any two waiting connections out of the pool.
    ///
    /// No ordering between waiting connections is promised.
    pub fn take_pair(&mut self) -> Option<(Waiting, Waiting)> {
        if self.waiting.len() < 2 {
            return None;
        }
        let mut keys = self.waiting.keys().take(2).cloned();
        let (first, second) = (keys.next()?, keys.next()?);
        Some((self.waiting.remove(&first)?, self.waiting.remove(&second)?))
    }
}
