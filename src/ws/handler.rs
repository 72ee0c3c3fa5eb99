//! WebSocket upgrade handler

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::connection::ConnRef;
use crate::ws::socket::WsConnection;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let identity = Uuid::new_v4().to_string();
    info!(identity = %identity, "New WebSocket connection");

    let (ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let conn = Arc::new(WsConnection::new(identity.clone(), outbound_tx));
    let handle: ConnRef = conn.clone();

    let writer_handle = tokio::spawn(write_loop(identity.clone(), ws_sink, outbound_rx));
    let probe_handle = tokio::spawn(probe_loop(conn.clone(), state.config.ping_interval));

    if let Err(e) = state.lobby.join(handle.clone()) {
        error!(identity = %identity, error = %e, "Failed to admit connection to lobby");
    }

    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);

    // Reader loop: WebSocket -> listeners
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(identity = %identity, "Rate limited input message");
                    continue;
                }
                conn.deliver(&handle, text);
            }
            Ok(Message::Binary(_)) => {
                warn!(identity = %identity, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(identity = %identity, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                conn.record_pong();
            }
            Ok(Message::Close(_)) => {
                info!(identity = %identity, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(identity = %identity, error = %e, "WebSocket error");
                break;
            }
        }
    }

    conn.close(&handle);
    probe_handle.abort();
    writer_handle.abort();

    info!(identity = %identity, "WebSocket connection closed");
}

/// Drain queued frames into the socket
async fn write_loop(
    identity: String,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = ws_sink.send(msg).await {
            debug!(identity = %identity, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Periodically probe latency with websocket pings
async fn probe_loop(conn: Arc<WsConnection>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if conn.send_probe().is_err() {
            break;
        }
    }
}
