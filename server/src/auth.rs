//! JWT issuance/verification + RBAC gating (spec §6 "Auth/RBAC"), absent
//! from the teacher's stub bearer check in its own `auth.rs`; built fresh
//! from `jsonwebtoken` + `bcrypt`, the pair the pack reaches for
//! (`moabualruz-ricecoder`, `marlonsc-mcb`).

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;
use archon_core::error::ArchonError;
use archon_core::model::Role;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub role: Role,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| ApiError(ArchonError::Internal(e.to_string())))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

fn issue_token(state: &AppState, user_id: i64, username: &str, role: Role, token_type: TokenType) -> ApiResult<String> {
    let expires_in = match token_type {
        TokenType::Access => chrono::Duration::minutes(state.config.jwt_expire_minutes),
        TokenType::Refresh => chrono::Duration::days(state.config.jwt_refresh_expire_days),
    };
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: (chrono::Utc::now() + expires_in).timestamp(),
        token_type,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(state.config.jwt_secret_key.as_bytes()))
        .map_err(|e| ApiError(ArchonError::Internal(e.to_string())))
}

pub fn issue_access_token(state: &AppState, user_id: i64, username: &str, role: Role) -> ApiResult<String> {
    issue_token(state, user_id, username, role, TokenType::Access)
}

pub fn issue_refresh_token(state: &AppState, user_id: i64, username: &str, role: Role) -> ApiResult<String> {
    issue_token(state, user_id, username, role, TokenType::Refresh)
}

pub fn verify_token(state: &AppState, token: &str, expected: TokenType) -> ApiResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret_key.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError(ArchonError::Unauthorized))?;

    if data.claims.token_type != expected {
        return Err(ApiError(ArchonError::Unauthorized));
    }
    Ok(data.claims)
}

/// Axum extractor: pulls the bearer token from `Authorization`, verifies it,
/// and resolves to a synthesized admin when `disable_auth` is set (spec §6
/// dev bypass).
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.config.disable_auth {
            return Ok(AuthUser { user_id: 0, username: "dev-admin".to_string(), role: Role::Admin });
        }

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError(ArchonError::Unauthorized))?;
        let token = header.strip_prefix("Bearer ").ok_or(ApiError(ArchonError::Unauthorized))?;

        let State(state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError(ArchonError::Internal("state extraction failed".to_string())))?;
        let claims = verify_token(&state, token, TokenType::Access)?;

        Ok(AuthUser { user_id: claims.sub, username: claims.username, role: claims.role })
    }
}

/// Role-gating helper used inside handlers: `require_role(&user, Role::Admin)?`.
pub fn require_role(user: &AuthUser, required: Role) -> ApiResult<()> {
    if user.role.satisfies(required) {
        Ok(())
    } else {
        Err(ApiError(ArchonError::Forbidden))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcrypt_round_trips() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }
}
