use crate::db::{self, NewUser};
use crate::domain::models::{User, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::messages::{self, interpolate_message};
use crate::state::SharedState;
use crate::web::extract::{check_length, AppJson};
use crate::web::response::ApiResponse;
use crate::web::session;
use anyhow::anyhow;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: User,
    /// Same token as the cookie, for clients using the Authorization header.
    pub access_token: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .with_state(state)
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid && email.len() <= 254 {
        Ok(())
    } else {
        Err(ApiError::BadRequest("A valid email is required".to_string()))
    }
}

/// Signs a session for `user`; returns the Set-Cookie headers and the body.
fn start_session(user: User, state: &SharedState) -> ApiResult<(HeaderMap, AuthPayload)> {
    let token = session::sign_session(user.id, user.role, &state.config.session_key)
        .map_err(|e| ApiError::Internal(anyhow!("Failed to sign session: {}", e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&session::session_cookie(&token, state.config.production))
            .map_err(|e| ApiError::Internal(e.into()))?,
    );
    Ok((
        headers,
        AuthPayload {
            user,
            access_token: token,
        },
    ))
}

async fn signup(
    State(state): State<SharedState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_email(&payload.email)?;
    check_length("password", &payload.password, 8, 128)?;
    check_length("firstName", &payload.first_name, 0, 100)?;
    check_length("lastName", &payload.last_name, 0, 100)?;

    let email = payload.email.trim().to_lowercase();
    if db::find_user_by_email(&state.pool, &email).await?.is_some() {
        return Err(ApiError::Conflict(interpolate_message(
            messages::EMAIL_TAKEN,
            &[("email", &email)],
        )));
    }

    let hash = hash_password(&payload.password)?;
    let user = db::insert_user(
        &state.pool,
        NewUser {
            email: &email,
            hash: &hash,
            role: UserRole::User,
            first_name: payload.first_name.trim(),
            last_name: payload.last_name.trim(),
        },
    )
    .await?;

    tracing::info!("User {} signed up", user.id);
    let message = interpolate_message(messages::SIGNUP_OK, &[("email", &user.email)]);
    let (headers, payload) = start_session(user, &state)?;
    Ok((headers, ApiResponse::created(message, payload)))
}

async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let ip = addr.ip().to_string();
    if state.login_limiter.check(&ip).await.is_err() {
        tracing::warn!("Login rate limit exceeded for IP: {}", ip);
        return Err(ApiError::TooManyRequests);
    }

    let user = db::find_user_by_email(&state.pool, payload.email.trim())
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::Unauthorized(messages::INVALID_CREDENTIALS.to_string()))?;

    if !verify_password(&payload.password, &user.hash) {
        tracing::warn!("Failed login for {}", user.email);
        return Err(ApiError::Unauthorized(messages::INVALID_CREDENTIALS.to_string()));
    }

    tracing::info!("User {} logged in", user.id);
    let message = interpolate_message(messages::LOGIN_OK, &[("email", &user.email)]);
    let (headers, payload) = start_session(user, &state)?;
    Ok((headers, ApiResponse::ok(message, payload)))
}

async fn logout(State(state): State<SharedState>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&session::clear_session_cookie(state.config.production)) {
        headers.insert(header::SET_COOKIE, value);
    }
    (headers, ApiResponse::message(messages::LOGOUT_OK))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email(" user@example.com ").is_ok());
        assert!(validate_email("user@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("plain").is_err());
    }
}
