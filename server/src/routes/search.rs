//! `POST /search` (spec §6, C11 §4.10): thin HTTP wrapper around
//! `retriever::hybrid_search`, timing the request for `processing_time_ms`.

use crate::auth::AuthUser;
use crate::errors::ApiResult;
use crate::retriever::{self, SearchResult};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Instant;

fn default_limit() -> usize {
    20
}

fn default_semantic_weight() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
pub struct SearchRequestBody {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub scan_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponseBody {
    pub query: String,
    pub total_results: u64,
    pub results: Vec<SearchResult>,
    pub processing_time_ms: u64,
}

pub async fn search(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(body): Json<SearchRequestBody>,
) -> ApiResult<Json<SearchResponseBody>> {
    let started = Instant::now();
    let req = retriever::SearchRequest {
        query: body.query.clone(),
        limit: body.limit.clamp(1, 100),
        offset: body.offset,
        semantic_weight: body.semantic_weight.clamp(0.0, 1.0),
        file_types: body.file_types,
        scan_ids: body.scan_ids,
    };
    let (results, total_results) = retriever::hybrid_search(&state, &req).await?;
    Ok(Json(SearchResponseBody {
        query: body.query,
        total_results,
        results,
        processing_time_ms: started.elapsed().as_millis() as u64,
    }))
}
