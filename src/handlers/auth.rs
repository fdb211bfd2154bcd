use axum::{extract::{Query, State}, http::StatusCode, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::{Cookie, Cookies};
use chrono::{Duration, Utc};

use crate::{
    database::Database,
    middleware::AUTH_COOKIE,
    models::{token::is_expired, PasswordResetToken, User, UserResponse},
    utils::{create_token, generate_token, hash_password, verify_password},
    utils::mailer,
};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(db): State<Database>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<UserResponse>, StatusCode> {
    if body.name.is_empty() || body.email.is_empty() || body.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let password_hash = hash_password(&body.password).map_err(|e| {
        log::error!("Failed to hash password: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(&body.name)
    .bind(body.email.to_lowercase())
    .bind(&password_hash)
    .fetch_one(&db)
    .await
    .map_err(|e| {
        log::warn!("Registration failed for {}: {e}", body.email);
        StatusCode::BAD_REQUEST
    })?;

    Ok(Json(user.into()))
}

pub async fn login(
    State(db): State<Database>,
    cookies: Cookies,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, StatusCode> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE email = $1 AND enabled = true",
    )
    .bind(body.email.to_lowercase())
    .fetch_optional(&db)
    .await
    .map_err(|e| {
        log::error!("Login lookup failed: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_password(&body.password, &user.password_hash).unwrap_or(false) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = create_token(user.id, user.email.clone()).map_err(|e| {
        log::error!("Failed to create session token: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let cookie = Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::hours(24))
        .build();
    cookies.add(cookie);

    Ok(Json(json!({
        "user": UserResponse::from(user),
    })))
}

pub async fn logout(cookies: Cookies) -> Json<Value> {
    let mut cookie = Cookie::from(AUTH_COOKIE);
    cookie.set_path("/");
    cookies.remove(cookie);
    Json(json!({ "message": "Logged out" }))
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

const RESET_SENT_MESSAGE: &str =
    "If an account with that email exists, a password reset link will be sent.";

pub async fn forgot_password(
    State(db): State<Database>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, StatusCode> {
    if body.email.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let email = body.email.to_lowercase();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&db)
        .await
        .map_err(|e| {
            log::error!("Password reset lookup failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    // Same response whether or not the account exists.
    let Some(_user) = user else {
        return Ok(Json(json!({ "message": RESET_SENT_MESSAGE })));
    };

    let token = generate_token();
    let expires_at = Utc::now() + Duration::hours(1);

    let mut tx = db.begin().await.map_err(|e| {
        log::error!("Failed to open transaction: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    sqlx::query("DELETE FROM password_reset_tokens WHERE email = $1")
        .bind(&email)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to invalidate old reset tokens: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    sqlx::query("INSERT INTO password_reset_tokens (email, token, expires_at) VALUES ($1, $2, $3)")
        .bind(&email)
        .bind(&token)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to store reset token: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit reset token: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let base_url =
        std::env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let reset_url = format!("{base_url}/reset-password?token={token}");

    // Mail failure does not change the response; the token stays usable once
    // the relay recovers.
    if let Err(e) = mailer::send_password_reset_email(&email, &reset_url).await {
        log::error!("Failed to send password reset email: {e}");
    }

    Ok(Json(json!({ "message": RESET_SENT_MESSAGE })))
}

#[derive(Deserialize)]
pub struct ValidateTokenQuery {
    pub token: Option<String>,
}

pub async fn validate_reset_token(
    State(db): State<Database>,
    Query(query): Query<ValidateTokenQuery>,
) -> Result<Json<Value>, StatusCode> {
    let token = query.token.ok_or(StatusCode::BAD_REQUEST)?;

    let reset_token = sqlx::query_as::<_, PasswordResetToken>(
        "SELECT * FROM password_reset_tokens WHERE token = $1",
    )
    .bind(&token)
    .fetch_optional(&db)
    .await
    .map_err(|e| {
        log::error!("Reset token lookup failed: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::BAD_REQUEST)?;

    if is_expired(reset_token.expires_at, Utc::now()) {
        return Err(StatusCode::BAD_REQUEST);
    }

    Ok(Json(json!({ "message": "Token is valid" })))
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

pub async fn reset_password(
    State(db): State<Database>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, StatusCode> {
    if body.token.is_empty() || body.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let reset_token = sqlx::query_as::<_, PasswordResetToken>(
        "SELECT * FROM password_reset_tokens WHERE token = $1",
    )
    .bind(&body.token)
    .fetch_optional(&db)
    .await
    .map_err(|e| {
        log::error!("Reset token lookup failed: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .ok_or(StatusCode::BAD_REQUEST)?;

    if is_expired(reset_token.expires_at, Utc::now()) {
        let _ = sqlx::query("DELETE FROM password_reset_tokens WHERE token = $1")
            .bind(&body.token)
            .execute(&db)
            .await;
        return Err(StatusCode::BAD_REQUEST);
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&reset_token.email)
        .fetch_optional(&db)
        .await
        .map_err(|e| {
            log::error!("User lookup for reset failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let Some(user) = user else {
        // Token points at a deleted account; burn it.
        let _ = sqlx::query("DELETE FROM password_reset_tokens WHERE token = $1")
            .bind(&body.token)
            .execute(&db)
            .await;
        return Err(StatusCode::NOT_FOUND);
    };

    let password_hash = hash_password(&body.password).map_err(|e| {
        log::error!("Failed to hash new password: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    // Password update and token burn are atomic: the token is single use.
    let mut tx = db.begin().await.map_err(|e| {
        log::error!("Failed to open transaction: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(&password_hash)
        .bind(user.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to update password: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    sqlx::query("DELETE FROM password_reset_tokens WHERE token = $1")
        .bind(&body.token)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            log::error!("Failed to delete reset token: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit password reset: {e}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({ "message": "Password reset successfully" })))
}
