pub mod appresult;
pub mod auth;
pub mod chat;
pub mod config;
pub mod store;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub store: store::MessageStore,
    pub verifier: auth::IdentityVerifier,
    pub hub: Arc<chat::Hub>,
}
