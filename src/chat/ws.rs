//! Websocket connection lifecycle.
//!
//! The bearer token rides in the handshake query string; a missing or bad
//! token is refused with 401 before the upgrade, so an unauthenticated
//! socket never exists. After the upgrade, a spawned writer task drains the
//! connection's outbound channel while this task reads inbound frames one at
//! a time, so a connection's own events never run out of order.

use std::sync::Arc;

use axum::debug_handler;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::{Identity, IdentityVerifier};
use crate::store::MessageStore;
use crate::AppState;

use super::events;
use super::hub::Hub;
use super::protocol::ClientEvent;

#[derive(Deserialize)]
pub(crate) struct WsQuery {
    token: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn chat_ws(
    Query(WsQuery { token }): Query<WsQuery>,
    State(verifier): State<IdentityVerifier>,
    State(hub): State<Arc<Hub>>,
    State(store): State<MessageStore>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = token else {
        tracing::warn!("websocket refused: token missing");
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let identity = match verifier.verify(&token) {
        Ok(identity) => identity,
        Err(err) => {
            tracing::warn!("websocket refused: {err}");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| run_connection(hub, store, identity, socket))
}

async fn run_connection(hub: Arc<Hub>, store: MessageStore, identity: Identity, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let ctx = hub.connect(identity, tx);

    while let Some(Ok(frame)) = receiver.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let event = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!("dropping malformed frame from {}: {err}", ctx.identity.id);
                continue;
            }
        };
        events::handle_event(&hub, &store, &ctx, event).await;
    }

    // Leave shared state before the task ends so nothing delivers to a dead
    // connection.
    hub.disconnect(&ctx);
    writer.abort();
}
