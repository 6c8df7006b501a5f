//! `/audit/*` handlers (spec §6, C13 §4.11): read access to the hash-chained
//! audit log, restricted to analyst/admin, plus an admin-only integrity
//! check endpoint.

use crate::auth::{require_role, AuthUser};
use crate::catalog;
use crate::errors::ApiResult;
use crate::state::AppState;
use archon_core::model::{AuditEntry, Role};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

pub async fn list(State(state): State<AppState>, user: AuthUser, Query(q): Query<ListQuery>) -> ApiResult<Json<Vec<AuditEntry>>> {
    require_role(&user, Role::Admin)?;
    let limit = q.limit.clamp(1, 1000);
    Ok(Json(catalog::list_audit_entries(&state.db, limit).await?))
}

pub async fn for_document(State(state): State<AppState>, user: AuthUser, Path(document_id): Path<i64>) -> ApiResult<Json<Vec<AuditEntry>>> {
    require_role(&user, Role::Analyst)?;
    Ok(Json(catalog::list_audit_entries_for_document(&state.db, document_id).await?))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub intact: bool,
    pub first_tampered_id: Option<i64>,
}

pub async fn verify(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<VerifyResponse>> {
    require_role(&user, Role::Admin)?;
    let first_tampered_id = catalog::verify_audit_chain(&state.db).await?;
    Ok(Json(VerifyResponse { intact: first_tampered_id.is_none(), first_tampered_id }))
}
