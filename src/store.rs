//! Durable message persistence.
//!
//! Append-only: a message is written exactly once and never mutated. History
//! reads return the newest `limit` rows for a room in insertion order, which
//! is the only ordering the rest of the system relies on.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store call timed out")]
    Timeout,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
}

impl Default for MessageKind {
    fn default() -> Self {
        MessageKind::Text
    }
}

/// A message as composed by the event router, before persistence.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub receiver_id: Option<String>,
    pub text: String,
    pub kind: MessageKind,
    pub file_url: Option<String>,
}

/// A persisted message, as stored and as broadcast on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            sender_name TEXT NOT NULL,
            receiver_id TEXT,
            text TEXT NOT NULL,
            kind TEXT NOT NULL,
            file_url TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // History fetch filters by room on every join.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_room ON messages (room_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            reset_token TEXT,
            reset_expires TEXT,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Handle on the messages table. Every call is bounded by `timeout`; the
/// caller treats a timeout the same as any other store failure.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl MessageStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> MessageStore {
        MessageStore { pool, timeout }
    }

    /// Persist a message, assigning its id and timestamp. Returns the
    /// stored form, which is what gets broadcast.
    pub async fn append(&self, new: NewMessage) -> Result<StoredMessage, StoreError> {
        let msg = StoredMessage {
            id: Uuid::now_v7().to_string(),
            room_id: new.room_id,
            sender_id: new.sender_id,
            sender_name: new.sender_name,
            receiver_id: new.receiver_id,
            text: new.text,
            kind: new.kind,
            file_url: new.file_url,
            created_at: OffsetDateTime::now_utc(),
        };

        let insert = sqlx::query(
            "INSERT INTO messages (id,room_id,sender_id,sender_name,receiver_id,text,kind,file_url,created_at)
             VALUES (?,?,?,?,?,?,?,?,?)",
        )
        .bind(&msg.id)
        .bind(&msg.room_id)
        .bind(&msg.sender_id)
        .bind(&msg.sender_name)
        .bind(&msg.receiver_id)
        .bind(&msg.text)
        .bind(msg.kind)
        .bind(&msg.file_url)
        .bind(msg.created_at)
        .execute(&self.pool);

        match tokio::time::timeout(self.timeout, insert).await {
            Ok(result) => {
                result?;
                Ok(msg)
            }
            Err(_) => Err(StoreError::Timeout),
        }
    }

    /// The most recent `limit` messages for a room, oldest first.
    pub async fn recent_history(
        &self,
        room_id: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let fetch = sqlx::query_as::<_, StoredMessage>(
            "SELECT id,room_id,sender_id,sender_name,receiver_id,text,kind,file_url,created_at
             FROM messages WHERE room_id=? ORDER BY rowid DESC LIMIT ?",
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool);

        let mut rows = match tokio::time::timeout(self.timeout, fetch).await {
            Ok(result) => result?,
            Err(_) => return Err(StoreError::Timeout),
        };
        rows.reverse();
        Ok(rows)
    }
}
