//! `/auth/*` handlers (spec §6): bootstrap-first-admin registration, login,
//! refresh, and the current-user probe the web UI polls on load.

use crate::auth::{hash_password, issue_access_token, issue_refresh_token, verify_password, verify_token, AuthUser, TokenType};
use crate::catalog;
use crate::errors::ApiResult;
use crate::state::AppState;
use archon_core::error::ArchonError;
use archon_core::model::Role;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub username: String,
    pub role: Role,
}

pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> ApiResult<Json<TokenResponse>> {
    let user = catalog::get_user_by_username(&state.db, &body.username)
        .await?
        .ok_or(ArchonError::Unauthorized)?;
    if !verify_password(&body.password, &user.password_hash) {
        return Err(ArchonError::Unauthorized.into());
    }
    let role = catalog::parse_role(&user.role);
    let access_token = issue_access_token(&state, user.id, &user.username, role)?;
    let refresh_token = issue_refresh_token(&state, user.id, &user.username, role)?;
    Ok(Json(TokenResponse { access_token, refresh_token, token_type: "bearer", username: user.username, role }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(State(state): State<AppState>, Json(body): Json<RefreshRequest>) -> ApiResult<Json<TokenResponse>> {
    let claims = verify_token(&state, &body.refresh_token, TokenType::Refresh)?;
    let user = catalog::get_user_by_id(&state.db, claims.sub).await?.ok_or(ArchonError::Unauthorized)?;
    let role = catalog::parse_role(&user.role);
    let access_token = issue_access_token(&state, user.id, &user.username, role)?;
    let refresh_token = issue_refresh_token(&state, user.id, &user.username, role)?;
    Ok(Json(TokenResponse { access_token, refresh_token, token_type: "bearer", username: user.username, role }))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

pub async fn me(user: AuthUser) -> Json<MeResponse> {
    Json(MeResponse { user_id: user.user_id, username: user.username, role: user.role })
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub username: String,
    pub role: Role,
}

/// Public only while zero users exist; the first registrant becomes
/// `admin`, every later attempt is rejected (spec §6).
pub async fn register(State(state): State<AppState>, Json(body): Json<RegisterRequest>) -> ApiResult<Json<RegisterResponse>> {
    let existing = catalog::count_users(&state.db).await?;
    if existing > 0 {
        return Err(ArchonError::Forbidden.into());
    }
    let hash = hash_password(&body.password)?;
    let user = catalog::create_user(&state.db, &body.username, &hash, Role::Admin).await?;
    Ok(Json(RegisterResponse { username: user.username, role: Role::Admin }))
}

/// Admin-only registration of additional users, any role.
pub async fn admin_register(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<AdminRegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    crate::auth::require_role(&user, Role::Admin)?;
    let hash = hash_password(&body.password)?;
    let created = catalog::create_user(&state.db, &body.username, &hash, body.role).await?;
    Ok(Json(RegisterResponse { username: created.username, role: body.role }))
}

#[derive(Debug, Deserialize)]
pub struct AdminRegisterRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
}
