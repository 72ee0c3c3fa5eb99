//! Shared test double for the connection capability
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use paper_ink_server::ws::{ConnRef, Connection, ConnectionEvent, Handler, ListenerId, Listeners, SendError};

/// In-memory connection that records what the server sends
pub struct FakeConnection {
    identity: String,
    listeners: Listeners,
    sent: Mutex<Vec<String>>,
    open: AtomicBool,
}

impl FakeConnection {
    pub fn new(identity: &str) -> Arc<Self> {
        Arc::new(Self {
            identity: identity.to_string(),
            listeners: Listeners::new(),
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        })
    }

    pub fn handle(self: &Arc<Self>) -> ConnRef {
        self.clone()
    }

    /// Simulate an inbound text frame
    pub fn deliver(self: &Arc<Self>, raw: &str) {
        let handle = self.handle();
        self.listeners
            .dispatch(&handle, ConnectionEvent::Message(raw.to_string()));
    }

    pub fn deliver_json(self: &Arc<Self>, value: Value) {
        self.deliver(&value.to_string());
    }

    /// Simulate the peer going away
    pub fn close(self: &Arc<Self>) {
        if self.open.swap(false, Ordering::SeqCst) {
            let handle = self.handle();
            self.listeners.dispatch(&handle, ConnectionEvent::Closed);
        }
    }

    /// Everything sent so far, decoded
    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|raw| serde_json::from_str(raw).expect("server sent invalid json"))
            .collect()
    }

    /// Decode and forget everything sent so far
    pub fn take_sent(&self) -> Vec<Value> {
        let sent = self.sent();
        self.sent.lock().clear();
        sent
    }

    pub fn commands(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|msg| msg["command"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Connection for FakeConnection {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn listen(&self, handler: Handler) -> ListenerId {
        self.listeners.add(handler)
    }

    fn remove(&self, listener: ListenerId) {
        self.listeners.remove(listener);
    }

    fn send(&self, raw: String) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        self.sent.lock().push(raw);
        Ok(())
    }

    fn ping(&self) -> Duration {
        Duration::from_millis(20)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

pub fn move_cmd(moves: Value) -> Value {
    serde_json::json!({ "command": "move", "moves": moves })
}

pub fn place(row: i32, col: i32, number: i32) -> Value {
    serde_json::json!({ "from": [-1, -1], "to": [row, col], "number": number })
}

pub fn step(from: (i32, i32), to: (i32, i32), number: i32) -> Value {
    serde_json::json!({ "from": [from.0, from.1], "to": [to.0, to.1], "number": number })
}
