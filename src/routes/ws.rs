//! `/ws` — the event hub's WebSocket endpoint (spec.md §4.F). Registers a
//! bounded receiver with the hub and pumps both directions until the client
//! disconnects; the portal never expects incoming frames beyond close.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;

use crate::state::AppShared;

pub async fn upgrade(ws: WebSocketUpgrade, State(shared): State<Arc<AppShared>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, shared))
}

async fn handle_socket(mut socket: WebSocket, shared: Arc<AppShared>) {
    let (id, mut rx) = shared.events.register();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    shared.events.unregister(id);
}
