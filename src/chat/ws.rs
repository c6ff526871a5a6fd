use axum::{debug_handler, extract::{ws::{Message as WsMessage, WebSocket}, State, WebSocketUpgrade}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::AppState;

use super::ChatEvent;

/// Streams messages of the open conversation to the browser as JSON.
#[debug_handler]
pub(crate) async fn chat_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    // only the receiver is kept, so closing the panel ends the stream.
    // Subscribing before taking the backlog leaves no gap; the page drops
    // ids it already shows.
    let events = state.ui.chat().map(|panel| {
        let events = panel.subscribe();
        (panel.backlog(), events)
    });
    ws.on_upgrade(async move |mut socket| match events {
        Some((backlog, events)) => forward(socket, backlog, events).await,
        None => {
            let _ = socket.send(WsMessage::Close(None)).await;
        }
    })
}

async fn forward(socket: WebSocket, backlog: Vec<ChatEvent>, mut events: broadcast::Receiver<ChatEvent>) {
    let (mut sender, mut receiver) = socket.split();

    let mut forward_task = tokio::spawn(async move {
        for event in backlog {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(WsMessage::Text(json.into())).await.is_err() {
                return;
            }
        }
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("chat viewer lagged, skipped {n} messages");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut forward_task => break,
            msg = receiver.next() => match msg {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => {
                    forward_task.abort();
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
