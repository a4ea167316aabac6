//! `WebSocket` handler for live reading streams.
//!
//! Clients connect to `GET /ws/sensor`. The write half of the socket is
//! wrapped in an [`ObserverConnection`] and registered with the
//! broadcaster, which sends one snapshot of recent history and then every
//! new reading. This task owns the read half and deregisters the connection
//! when the client leaves, a read fails, the broadcaster closes the
//! connection after a failed write, or the server shuts down. Keep-alive
//! pings are answered by the WebSocket transport itself while this task
//! keeps reading.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt, future};
use sensorhub_core::{ObserverConnection, Outbound};
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming readings.
///
/// # Route
///
/// `GET /ws/sensor`
pub async fn ws_sensor(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

fn to_message(frame: Outbound) -> Message {
    let Outbound::Text(text) = frame;
    Message::Text(text.into())
}

/// Handle the `WebSocket` lifecycle: register, read until done, deregister.
async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let sink = sender.with(|frame: Outbound| future::ready(Ok::<_, axum::Error>(to_message(frame))));

    let label = format!("ws-{}", Uuid::new_v4());
    let conn = ObserverConnection::new(sink, label, state.observer_write_timeout);
    debug!(observer = conn.label(), "WebSocket client connected");

    // A fresh handle is never already registered.
    let _snapshot = state.broadcaster.join(Arc::clone(&conn)).await;

    loop {
        tokio::select! {
            () = conn.closed() => {
                debug!(observer = conn.label(), "Observer closed after failed write");
                break;
            }
            () = state.shutdown.cancelled() => {
                debug!(observer = conn.label(), "Server shutting down, closing WebSocket");
                break;
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(observer = conn.label(), "WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(observer = conn.label(), error = %e, "WebSocket read error");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Pings are answered by the transport; nothing else is expected.
                    }
                }
            }
        }
    }

    state.broadcaster.leave(&conn).await;
}
