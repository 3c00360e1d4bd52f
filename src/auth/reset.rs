use axum::{debug_handler, extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime};

use crate::{AppResult, AppState};

use super::hash_password;

const RESET_TOKEN_TTL: Duration = Duration::hours(1);

#[derive(Deserialize)]
pub(crate) struct ForgotPasswordBody {
    email: String,
}

/// Generate a reset token for the account. There is no mail transport wired
/// up, so the token comes back in the response body.
#[debug_handler(state = AppState)]
pub(crate) async fn forgot_password(
    State(db_pool): State<SqlitePool>,
    Json(ForgotPasswordBody { email }): Json<ForgotPasswordBody>,
) -> AppResult<Response> {
    let row = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE email=?")
        .bind(&email)
        .fetch_optional(&db_pool)
        .await?;
    let Some((id,)) = row else {
        return Ok((StatusCode::NOT_FOUND, Json(json!({ "message": "User not found" })))
            .into_response());
    };

    let token: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();

    sqlx::query("UPDATE users SET reset_token=?, reset_expires=? WHERE id=?")
        .bind(&token)
        .bind(OffsetDateTime::now_utc() + RESET_TOKEN_TTL)
        .bind(&id)
        .execute(&db_pool)
        .await?;

    Ok(Json(json!({ "message": "Reset token generated", "resetToken": token })).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResetPasswordBody {
    token: String,
    new_password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn reset_password(
    State(db_pool): State<SqlitePool>,
    Json(ResetPasswordBody { token, new_password }): Json<ResetPasswordBody>,
) -> AppResult<Response> {
    let row = sqlx::query_as::<_, (String, OffsetDateTime)>(
        "SELECT id,reset_expires FROM users WHERE reset_token=?",
    )
    .bind(&token)
    .fetch_optional(&db_pool)
    .await?;

    let valid = row.as_ref().is_some_and(|(_, expires)| *expires > OffsetDateTime::now_utc());
    let Some((id, _)) = row.filter(|_| valid) else {
        return Ok((StatusCode::BAD_REQUEST, Json(json!({ "message": "Invalid or expired token" })))
            .into_response());
    };

    sqlx::query("UPDATE users SET password_hash=?, reset_token=NULL, reset_expires=NULL WHERE id=?")
        .bind(hash_password(&new_password)?)
        .bind(&id)
        .execute(&db_pool)
        .await?;

    Ok(Json(json!({ "message": "Password reset successful" })).into_response())
}
