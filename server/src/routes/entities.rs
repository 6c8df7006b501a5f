//! `/entities/*` handlers (spec §6, C7 §4.7): per-document entity listing,
//! the distinct type catalog, the cross-document graph aggregate, and a
//! manual merge for near-duplicate entity strings.

use crate::auth::{require_role, AuthUser};
use crate::catalog::{self, EntityGraphRow};
use crate::errors::ApiResult;
use crate::state::AppState;
use archon_core::model::{Entity, Role};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

fn default_list_limit() -> i64 {
    500
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub entity_type: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

pub async fn list(State(state): State<AppState>, _user: AuthUser, Query(q): Query<ListQuery>) -> ApiResult<Json<Vec<Entity>>> {
    let limit = q.limit.clamp(1, 5000);
    Ok(Json(catalog::list_entities(&state.db, q.entity_type.as_deref(), limit).await?))
}

pub async fn for_document(State(state): State<AppState>, _user: AuthUser, Path(document_id): Path<i64>) -> ApiResult<Json<Vec<Entity>>> {
    Ok(Json(catalog::list_entities_for_document(&state.db, document_id).await?))
}

pub async fn types(State(state): State<AppState>, _user: AuthUser) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(catalog::list_entity_types(&state.db).await?))
}

fn default_min_count() -> i64 {
    1
}

fn default_graph_limit() -> i64 {
    200
}

#[derive(Debug, Deserialize)]
pub struct GraphQuery {
    pub entity_type: Option<String>,
    #[serde(default = "default_min_count")]
    pub min_count: i64,
    #[serde(default = "default_graph_limit")]
    pub limit: i64,
    pub project_path: Option<String>,
    /// Reserved for a future single-entity neighborhood view; currently
    /// accepted but ignored, the graph is returned flat.
    pub focus: Option<String>,
}

pub async fn graph(State(state): State<AppState>, _user: AuthUser, Query(q): Query<GraphQuery>) -> ApiResult<Json<Vec<EntityGraphRow>>> {
    let _ = q.focus;
    let limit = q.limit.clamp(1, 2000);
    let rows = catalog::entity_graph(&state.db, q.entity_type.as_deref(), q.min_count, limit, q.project_path.as_deref()).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub from_id: i64,
    pub into_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub merged: bool,
}

pub async fn merge(State(state): State<AppState>, user: AuthUser, Json(body): Json<MergeRequest>) -> ApiResult<Json<MergeResponse>> {
    require_role(&user, Role::Analyst)?;
    catalog::merge_entities(&state.db, body.from_id, body.into_id).await?;
    Ok(Json(MergeResponse { merged: true }))
}
