//! `/scan/*` handlers (spec §6, §4.8): launch/estimate/list/inspect/cancel/
//! resume/delete, plus the `GET /scan/{id}/progress` polling fallback for
//! clients that don't use the WebSocket.

use crate::auth::{require_role, AuthUser};
use crate::catalog;
use crate::errors::ApiResult;
use crate::orchestrator;
use crate::state::AppState;
use archon_core::error::ArchonError;
use archon_core::model::{FileType, Role, Scan};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct CreateScanRequest {
    pub path: String,
    #[serde(default)]
    pub enable_embeddings: bool,
}

/// Resolve `raw_path` against `documents_path` and reject anything that
/// escapes the allowed ingestion root (spec §6 "scan paths must canonicalize
/// within this root").
fn resolve_scan_root(state: &AppState, raw_path: &str) -> ApiResult<PathBuf> {
    let candidate = PathBuf::from(raw_path);
    let canonical = candidate.canonicalize().map_err(|_| ArchonError::Validation(format!("path does not exist: {raw_path}")))?;
    let allowed_root = state
        .config
        .documents_path
        .canonicalize()
        .map_err(|_| ArchonError::Internal("configured documents_path is invalid".to_string()))?;
    if !canonical.starts_with(&allowed_root) {
        return Err(ArchonError::Validation("path is outside the allowed ingestion root".to_string()).into());
    }
    Ok(canonical)
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateScanRequest>,
) -> ApiResult<Json<Scan>> {
    require_role(&user, Role::Analyst)?;
    let canonical = resolve_scan_root(&state, &body.path)?;
    let root_str = canonical.display().to_string();

    if let Some(existing) = catalog::find_active_scan_by_path(&state.db, &root_str).await? {
        return Ok(Json(existing));
    }

    let scan = catalog::create_scan(&state.db, &root_str, body.enable_embeddings).await?;
    catalog::append_audit_entry(&state.db, "scan_created", None, Some(scan.id), Some(&root_str), "internal").await.ok();
    orchestrator::spawn(state, scan.id, false);
    Ok(Json(scan))
}

#[derive(Debug, Serialize)]
pub struct EmbeddingEstimate {
    pub tokens: i64,
    pub cost_usd: f64,
    pub free_tier_available: bool,
    pub note: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub file_count: i64,
    pub size_mb: f64,
    pub type_counts: HashMap<String, i64>,
    pub embedding_estimate: EmbeddingEstimate,
}

#[derive(Debug, Deserialize)]
pub struct EstimateQuery {
    pub path: String,
}

const AVG_TOKENS_PER_FILE: i64 = 500;
const GEMINI_PRICE_PER_MILLION_TOKENS: f64 = 0.15;
const FREE_TIER_FILE_CEILING: i64 = 100_000;

/// Walks the target path counting files and bytes per `FileType` without
/// touching the catalog, so a caller can preview cost before committing to
/// `POST /scan` (spec §6).
pub async fn estimate(State(state): State<AppState>, user: AuthUser, Query(q): Query<EstimateQuery>) -> ApiResult<Json<EstimateResponse>> {
    require_role(&user, Role::Analyst)?;
    let root = resolve_scan_root(&state, &q.path)?;

    let (file_count, size_bytes, type_counts) = tokio::task::spawn_blocking(move || walk_for_estimate(&root))
        .await
        .map_err(|e| ArchonError::Internal(e.to_string()))?;

    let estimated_tokens = file_count * AVG_TOKENS_PER_FILE;
    let cost_usd = (estimated_tokens as f64 / 1_000_000.0) * GEMINI_PRICE_PER_MILLION_TOKENS;
    let free_tier_available = file_count < FREE_TIER_FILE_CEILING;

    Ok(Json(EstimateResponse {
        file_count,
        size_mb: (size_bytes as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0,
        type_counts,
        embedding_estimate: EmbeddingEstimate {
            tokens: estimated_tokens,
            cost_usd: (cost_usd * 100.0).round() / 100.0,
            free_tier_available,
            note: if free_tier_available { "within the free tier's generous rate limits" } else { "high volume, expect metered billing" },
        },
    }))
}

fn walk_for_estimate(root: &std::path::Path) -> (i64, u64, HashMap<String, i64>) {
    let mut file_count = 0i64;
    let mut size_bytes = 0u64;
    let mut type_counts: HashMap<String, i64> = HashMap::new();
    walk_for_estimate_inner(root, &mut file_count, &mut size_bytes, &mut type_counts);
    (file_count, size_bytes, type_counts)
}

fn walk_for_estimate_inner(dir: &std::path::Path, file_count: &mut i64, size_bytes: &mut u64, type_counts: &mut HashMap<String, i64>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(ft) = entry.file_type() else { continue };
        if ft.is_dir() {
            walk_for_estimate_inner(&path, file_count, size_bytes, type_counts);
            continue;
        }
        if !ft.is_file() {
            continue;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if matches!(FileType::from_extension(ext), FileType::Unknown) {
            continue;
        }
        *file_count += 1;
        *size_bytes += std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let type_name = file_type_label(FileType::from_extension(ext));
        *type_counts.entry(type_name.to_string()).or_insert(0) += 1;
    }
}

fn file_type_label(t: FileType) -> &'static str {
    match t {
        FileType::Pdf => "pdf",
        FileType::Image => "image",
        FileType::Text => "text",
        FileType::Video => "video",
        FileType::Email => "email",
        FileType::Unknown => "unknown",
    }
}

pub async fn list(State(state): State<AppState>, _user: AuthUser) -> ApiResult<Json<Vec<Scan>>> {
    Ok(Json(catalog::list_scans(&state.db).await?))
}

pub async fn get(State(state): State<AppState>, _user: AuthUser, Path(id): Path<i64>) -> ApiResult<Json<Scan>> {
    let scan = catalog::get_scan(&state.db, id).await?.ok_or_else(|| ArchonError::NotFound(format!("scan {id}")))?;
    Ok(Json(scan))
}

#[derive(Debug, Serialize)]
pub struct ScanProgressResponse {
    pub scan: Scan,
    pub recent_errors: Vec<catalog::ScanErrorRow>,
}

pub async fn progress(State(state): State<AppState>, _user: AuthUser, Path(id): Path<i64>) -> ApiResult<Json<ScanProgressResponse>> {
    let scan = catalog::get_scan(&state.db, id).await?.ok_or_else(|| ArchonError::NotFound(format!("scan {id}")))?;
    let recent_errors = catalog::last_scan_errors(&state.db, id, 10).await?;
    Ok(Json(ScanProgressResponse { scan, recent_errors }))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub async fn cancel(State(state): State<AppState>, user: AuthUser, Path(id): Path<i64>) -> ApiResult<Json<CancelResponse>> {
    require_role(&user, Role::Analyst)?;
    let cancelled = orchestrator::cancel(&state, id);
    Ok(Json(CancelResponse { cancelled }))
}

pub async fn resume(State(state): State<AppState>, user: AuthUser, Path(id): Path<i64>) -> ApiResult<Json<Scan>> {
    require_role(&user, Role::Analyst)?;
    let scan = catalog::get_scan(&state.db, id).await?.ok_or_else(|| ArchonError::NotFound(format!("scan {id}")))?;
    if scan.status.is_terminal() && scan.status != archon_core::model::ScanStatus::Cancelled {
        return Err(ArchonError::Conflict("only a cancelled scan can be resumed".to_string()).into());
    }
    orchestrator::spawn(state, id, true);
    Ok(Json(scan))
}

pub async fn delete(State(state): State<AppState>, user: AuthUser, Path(id): Path<i64>) -> ApiResult<Json<serde_json::Value>> {
    require_role(&user, Role::Admin)?;
    let _ = state.lexical.delete_by_scan(&id.to_string()).await;
    let _ = state.vector.delete_by_scan(&id.to_string()).await;
    catalog::delete_scan(&state.db, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
