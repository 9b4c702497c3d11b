//! WebSocket observer endpoint.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tracing::debug;

use crate::api::SharedPlayer;

/// Upgrade to a WebSocket that carries one text frame per player
/// event, holding the event's tag. The connection has no idle
/// deadline; it ends on peer close or write failure.
pub(crate) async fn listen(ws: WebSocketUpgrade, State(player): State<SharedPlayer>) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, player))
}

async fn stream_events(mut socket: WebSocket, player: SharedPlayer) {
    let (subscription, mut events) = player.events().listen();
    while let Some(event) = events.recv().await {
        if socket.send(Message::Text(event.tag().into())).await.is_err() {
            break;
        }
    }
    player.events().unlisten(subscription);
    debug!("websocket observer detached");
}
