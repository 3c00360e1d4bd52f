use axum::{debug_handler, extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{AppResult, AppState};

use super::{verify_password, Identity, IdentityVerifier};

#[derive(Deserialize)]
pub(crate) struct LoginBody {
    email: String,
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    State(verifier): State<IdentityVerifier>,
    Json(LoginBody { email, password }): Json<LoginBody>,
) -> AppResult<Response> {
    let row = sqlx::query_as::<_, (String, String, String)>(
        "SELECT id,username,password_hash FROM users WHERE email=?",
    )
    .bind(&email)
    .fetch_optional(&db_pool)
    .await?;

    let Some((id, username, password_hash)) = row else {
        return Ok(invalid_credentials());
    };
    if !verify_password(&password, &password_hash) {
        return Ok(invalid_credentials());
    }

    let token = verifier.issue(&Identity { id: id.clone(), username: username.clone() })?;
    Ok(Json(json!({
        "token": token,
        "user": { "id": id, "username": username, "email": email },
    }))
    .into_response())
}

fn invalid_credentials() -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": "Invalid credentials" }))).into_response()
}
