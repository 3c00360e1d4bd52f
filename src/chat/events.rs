//! The event router.
//!
//! One explicit dispatch over everything a client can ask for. Each arm does
//! its state mutation, then its delivery. Nothing here ever takes the
//! connection down: a bad event is dropped and logged, and the loop keeps
//! serving.

use crate::store::{MessageStore, NewMessage};

use super::hub::{ConnCtx, Hub};
use super::protocol::{ClientEvent, SendMessage, ServerEvent};
use super::rooms::GENERAL_ROOM;

/// How much history a join loads, newest 50, delivered oldest first.
pub const HISTORY_LIMIT: i64 = 50;

pub async fn handle_event(hub: &Hub, store: &MessageStore, ctx: &ConnCtx, event: ClientEvent) {
    match event {
        ClientEvent::JoinRoom { room_id } => join_room(hub, store, ctx, &room_id).await,
        ClientEvent::LeaveRoom { room_id } => {
            hub.rooms().leave(ctx.conn, &room_id);
            tracing::debug!("user {} left room {room_id}", ctx.identity.id);
        }
        ClientEvent::SendMessage(send) => send_message(hub, store, ctx, send).await,
        ClientEvent::TypingStart { room_id } => {
            hub.broadcast_room_except(
                &room_id,
                ctx.conn,
                &ServerEvent::UserTyping {
                    user_id: ctx.identity.id.clone(),
                    username: ctx.identity.username.clone(),
                },
            );
        }
        ClientEvent::TypingStop { room_id } => {
            hub.broadcast_room_except(
                &room_id,
                ctx.conn,
                &ServerEvent::UserStoppedTyping(ctx.identity.id.clone()),
            );
        }
    }
}

async fn join_room(hub: &Hub, store: &MessageStore, ctx: &ConnCtx, room_id: &str) {
    hub.rooms().join(ctx.conn, room_id);
    tracing::debug!("user {} joined room {room_id}", ctx.identity.id);

    // History reflects what was persisted before this read; anything racing
    // in arrives over the live channel instead.
    match store.recent_history(room_id, HISTORY_LIMIT).await {
        Ok(history) => hub.send_to(ctx.conn, &ServerEvent::LoadHistory(history)),
        Err(err) => {
            tracing::warn!("history fetch for room {room_id} failed: {err}");
        }
    }
}

async fn send_message(hub: &Hub, store: &MessageStore, ctx: &ConnCtx, send: SendMessage) {
    if !send.is_valid() {
        tracing::warn!("dropping malformed message from {}", ctx.identity.id);
        return;
    }

    // Sender fields come from the authenticated identity, never the payload.
    let new = NewMessage {
        room_id: send.room_id,
        sender_id: ctx.identity.id.clone(),
        sender_name: ctx.identity.username.clone(),
        receiver_id: send.receiver_id,
        text: send.text,
        kind: send.kind,
        file_url: send.file_url,
    };

    // Write-then-broadcast, serialized per room: two concurrent sends to the
    // same room go out in their persisted order.
    let seq = hub.room_lock(&new.room_id);
    let _guard = seq.lock().await;

    let saved = match store.append(new).await {
        Ok(saved) => saved,
        Err(err) => {
            // Dropped, not retried; the sender gets no ack either way.
            tracing::warn!("dropping message from {}: {err}", ctx.identity.id);
            return;
        }
    };

    hub.broadcast_room(&saved.room_id, &ServerEvent::ReceiveMessage(saved.clone()));

    // Side-channel notification into the receiver's personal room, so a
    // private message still surfaces when they're not looking at the chat.
    if let Some(receiver_id) = saved.receiver_id.clone() {
        if saved.room_id != GENERAL_ROOM {
            hub.broadcast_room(
                &receiver_id,
                &ServerEvent::PrivateMessageNotification {
                    sender_id: saved.sender_id.clone(),
                    sender_name: saved.sender_name.clone(),
                    message: saved,
                },
            );
        }
    }
}
