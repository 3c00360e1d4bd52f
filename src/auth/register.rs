use axum::{debug_handler, extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AppResult, AppState};

use super::{hash_password, Identity, IdentityVerifier};

#[derive(Deserialize)]
pub(crate) struct RegisterBody {
    username: String,
    email: String,
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(db_pool): State<SqlitePool>,
    State(verifier): State<IdentityVerifier>,
    Json(RegisterBody { username, email, password }): Json<RegisterBody>,
) -> AppResult<Response> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE email=? OR username=?")
        .bind(&email)
        .bind(&username)
        .fetch_optional(&db_pool)
        .await?;
    if existing.is_some() {
        return Ok((StatusCode::BAD_REQUEST, Json(json!({ "message": "User already exists" })))
            .into_response());
    }

    let id = Uuid::now_v7().to_string();
    sqlx::query("INSERT INTO users (id,username,email,password_hash,created_at) VALUES (?,?,?,?,?)")
        .bind(&id)
        .bind(&username)
        .bind(&email)
        .bind(hash_password(&password)?)
        .bind(OffsetDateTime::now_utc())
        .execute(&db_pool)
        .await?;

    tracing::info!("registered user {username} ({id})");

    let token = verifier.issue(&Identity { id: id.clone(), username: username.clone() })?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "user": { "id": id, "username": username, "email": email },
        })),
    )
        .into_response())
}
