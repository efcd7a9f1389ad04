use crate::db;
use crate::domain::models::UserRole;
use crate::error::ApiError;
use crate::state::SharedState;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_TTL_DAYS: i64 = 7;

/// Verified token contents. The role is the one held at sign-in.
#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub role: UserRole,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
    #[error("bad role")]
    Role,
}

pub fn sign_session(user_id: Uuid, role: UserRole, key: &[u8]) -> Result<String, SessionError> {
    let exp = Utc::now() + Duration::days(SESSION_TTL_DAYS);
    sign_claims(user_id, role, exp.timestamp(), key)
}

fn sign_claims(user_id: Uuid, role: UserRole, exp: i64, key: &[u8]) -> Result<String, SessionError> {
    let payload = format!("{}|{}|{}", user_id, role.as_str(), exp);
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes()),
        general_purpose::URL_SAFE_NO_PAD.encode(sig)
    ))
}

pub fn verify_session(token: &str, key: &[u8]) -> Result<SessionClaims, SessionError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(SessionError::Invalid)?;
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let pieces: Vec<&str> = payload.split('|').collect();
    if pieces.len() != 3 {
        return Err(SessionError::Invalid);
    }
    let user_id = Uuid::parse_str(pieces[0]).map_err(|_| SessionError::Invalid)?;
    let role = UserRole::parse(pieces[1]).ok_or(SessionError::Role)?;
    let exp: i64 = pieces[2].parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }
    Ok(SessionClaims { user_id, role })
}

/// Bearer token first, then the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(val) = auth.to_str() {
            if let Some(bearer) = val.strip_prefix("Bearer ") {
                let bearer = bearer.trim();
                if !bearer.is_empty() {
                    return Some(bearer.to_string());
                }
            }
        }
    }
    let prefix = format!("{}=", SESSION_COOKIE);
    for cookie in headers.get_all(axum::http::header::COOKIE) {
        if let Ok(val) = cookie.to_str() {
            for pair in val.split(';') {
                if let Some(rest) = pair.trim().strip_prefix(prefix.as_str()) {
                    if !rest.is_empty() {
                        return Some(rest.to_string());
                    }
                }
            }
        }
    }
    None
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        SESSION_COOKIE,
        token,
        SESSION_TTL_DAYS * 24 * 60 * 60,
        secure_flag
    )
}

pub fn clear_session_cookie(secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0{}", SESSION_COOKIE, secure_flag)
}

// ============================================
// Axum Extractor for UserSession
// ============================================

/// Authenticated caller. The role is re-read from the database so role
/// changes apply to existing sessions.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl UserSession {
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }

    /// The user themselves or an admin.
    pub fn require_self_or_admin(&self, user_id: Uuid) -> Result<(), ApiError> {
        if self.user_id == user_id || self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for UserSession
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared_state = SharedState::from_ref(state);

        let token = extract_token(&parts.headers).ok_or_else(ApiError::unauthorized)?;

        let claims = verify_session(&token, &shared_state.config.session_key).map_err(|e| {
            tracing::warn!("Session verification failed: {}", e);
            ApiError::Unauthorized("Invalid or expired session".to_string())
        })?;

        let user = db::find_user_by_id(&shared_state.pool, claims.user_id).await?;

        let Some(user) = user else {
            return Err(ApiError::unauthorized());
        };

        if !user.is_active {
            return Err(ApiError::Unauthorized("Account is deactivated".to_string()));
        }
        if claims.role != user.role {
            tracing::debug!(
                "Role of {} changed since sign-in ({} -> {})",
                user.id,
                claims.role.as_str(),
                user.role.as_str()
            );
        }

        Ok(UserSession {
            user_id: user.id,
            role: user.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_sign_and_verify() {
        let id = Uuid::new_v4();
        let token = sign_session(id, UserRole::Moderator, KEY).unwrap();
        let claims = verify_session(&token, KEY).unwrap();
        assert_eq!(claims.user_id, id);
        assert_eq!(claims.role, UserRole::Moderator);

        let payload = general_purpose::URL_SAFE_NO_PAD
            .decode(token.split_once('.').unwrap().0)
            .unwrap();
        let payload = String::from_utf8(payload).unwrap();
        let exp: i64 = payload.rsplit('|').next().unwrap().parse().unwrap();
        let ttl = exp - Utc::now().timestamp();
        assert!(ttl > 6 * 24 * 3600 && ttl <= 7 * 24 * 3600);
    }

    #[test]
    fn test_rejects_tampering_and_expiry() {
        let token = sign_session(Uuid::new_v4(), UserRole::User, KEY).unwrap();
        assert!(matches!(
            verify_session(&token, b"another-key-another-key-another!!"),
            Err(SessionError::Signature)
        ));
        assert!(matches!(verify_session("garbage", KEY), Err(SessionError::Invalid)));

        let expired = sign_claims(Uuid::new_v4(), UserRole::User, Utc::now().timestamp() - 10, KEY).unwrap();
        assert!(matches!(verify_session(&expired, KEY), Err(SessionError::Expired)));
    }

    #[test]
    fn test_extract_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("theme=dark; session=from-cookie"));
        assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert("authorization", HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));

        assert_eq!(extract_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = session_cookie("tok", true);
        assert!(cookie.starts_with("session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.ends_with("; Secure"));
        assert!(clear_session_cookie(false).contains("Max-Age=0"));
    }

    #[test]
    fn test_role_guards() {
        let id = Uuid::new_v4();
        let user = UserSession { user_id: id, role: UserRole::User };
        assert!(user.require_staff().is_err());
        assert!(user.require_self_or_admin(id).is_ok());
        assert!(user.require_self_or_admin(Uuid::new_v4()).is_err());

        let admin = UserSession { user_id: Uuid::new_v4(), role: UserRole::Admin };
        assert!(admin.require_admin().is_ok());
        assert!(admin.require_self_or_admin(id).is_ok());
    }
}
