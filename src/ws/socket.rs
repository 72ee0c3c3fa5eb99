//! WebSocket-backed implementation of the connection capability

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::connection::{ConnRef, Connection, ConnectionEvent, Handler, ListenerId, Listeners, SendError};

/// A websocket client.
///
/// Outbound frames go through an unbounded channel drained by the socket's
/// writer task, so sending never blocks the caller.
pub struct WsConnection {
    identity: String,
    outbound: mpsc::UnboundedSender<Message>,
    listeners: Listeners,
    open: AtomicBool,
    ping_sent: Mutex<Option<Instant>>,
    latency_micros: AtomicU64,
}

impl WsConnection {
    pub fn new(identity: String, outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            identity,
            outbound,
            listeners: Listeners::new(),
            open: AtomicBool::new(true),
            ping_sent: Mutex::new(None),
            latency_micros: AtomicU64::new(0),
        }
    }

    /// Forward an inbound text frame to the listeners
    pub fn deliver(&self, handle: &ConnRef, text: String) {
        self.listeners.dispatch(handle, ConnectionEvent::Message(text));
    }

    /// Send a latency probe
    pub fn send_probe(&self) -> Result<(), SendError> {
        *self.ping_sent.lock() = Some(Instant::now());
        self.outbound
            .send(Message::Ping(Vec::new()))
            .map_err(|_| SendError::Closed)
    }

    /// Record the answer to the last probe
    pub fn record_pong(&self) {
        if let Some(sent) = self.ping_sent.lock().take() {
            let micros = u64::try_from(sent.elapsed().as_micros()).unwrap_or(u64::MAX);
            self.latency_micros.store(micros, Ordering::Relaxed);
        }
    }

    /// Mark the connection closed and notify listeners exactly once
    pub fn close(&self, handle: &ConnRef) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.listeners.dispatch(handle, ConnectionEvent::Closed);
            self.listeners.clear();
        }
    }
}

impl Connection for WsConnection {
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
        self.outbound
            .send(Message::Text(raw))
            .map_err(|_| SendError::Closed)
    }

    fn ping(&self) -> Duration {
        Duration::from_micros(self.latency_micros.load(Ordering::Relaxed))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
