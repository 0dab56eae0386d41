//! Local broadcaster backing `BroadcastEditFiltered`, and the `/ws` route
//! that forwards it to connected clients as JSON text frames.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tokio::sync::broadcast;
use tracing::warn;
use wikisurge_core::EditEvent;

use crate::pipeline::BroadcastEditFiltered;

const LOCAL_CHANNEL_CAPACITY: usize = 1024;

pub struct LocalBroadcaster {
    sender: broadcast::Sender<EditEvent>,
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LOCAL_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditEvent> {
        self.sender.subscribe()
    }
}

impl Default for LocalBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastEditFiltered for LocalBroadcaster {
    fn broadcast(&self, edit: &EditEvent) {
        // No subscribers is the common case between bursts; an error here
        // just means nobody's listening right now, not a failure.
        let _ = self.sender.send(edit.clone());
    }
}

pub async fn ws_handler(
    State(broadcaster): State<Arc<LocalBroadcaster>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| forward_edits(socket, broadcaster))
}

async fn forward_edits(mut socket: WebSocket, broadcaster: Arc<LocalBroadcaster>) {
    let mut rx = broadcaster.subscribe();
    loop {
        match rx.recv().await {
            Ok(edit) => {
                let Ok(payload) = serde_json::to_string(&edit) else { continue };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    if let Err(err) = socket.close().await {
        warn!(error = %err, "error closing websocket");
    }
}
