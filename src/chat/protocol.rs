//! Wire protocol for the websocket channel.
//!
//! Every frame is a JSON envelope `{"event": name, "data": payload}`.
//! Payload fields are camelCase; event names are snake_case. Unknown or
//! malformed inbound frames are dropped by the connection loop without
//! touching any shared state.

use serde::{Deserialize, Serialize};

use crate::store::{MessageKind, StoredMessage};

/// Client → server events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: String },
    SendMessage(SendMessage),
    #[serde(rename_all = "camelCase")]
    TypingStart { room_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStop { room_id: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub room_id: String,
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub file_url: Option<String>,
    pub receiver_id: Option<String>,
}

impl SendMessage {
    /// A text message needs a body; an attachment needs a URL.
    pub fn is_valid(&self) -> bool {
        if self.room_id.is_empty() {
            return false;
        }
        match self.kind {
            MessageKind::Text => !self.text.trim().is_empty(),
            MessageKind::Image | MessageKind::File => {
                self.file_url.as_deref().is_some_and(|url| !url.is_empty())
            }
        }
    }
}

/// Server → client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    GetOnlineUsers(Vec<OnlineUser>),
    LoadHistory(Vec<StoredMessage>),
    ReceiveMessage(StoredMessage),
    #[serde(rename_all = "camelCase")]
    PrivateMessageNotification {
        sender_id: String,
        sender_name: String,
        message: StoredMessage,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping { user_id: String, username: String },
    UserStoppedTyping(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineUser {
    pub id: String,
    pub username: String,
}
