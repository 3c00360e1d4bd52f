//! The real-time core: presence, room membership, and event fan-out.

mod events;
mod hub;
mod presence;
pub mod protocol;
mod rooms;
mod ws;

use axum::{routing::get, Router};
use uuid::Uuid;

use crate::AppState;

pub use events::{handle_event, HISTORY_LIMIT};
pub use hub::{ConnCtx, Hub};
pub use presence::PresenceRegistry;
pub use rooms::{derive_private_room, RoomMembership, GENERAL_ROOM};

/// Handle for one live websocket session. An identity may own any number of
/// these at once.
pub type ConnId = Uuid;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::chat_ws))
}
