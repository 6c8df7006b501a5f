//! HTTP route assembly (spec §6): groups handlers under their resource
//! prefixes and layers per-route rate limiting on top of the global
//! request-id span every route shares.

pub mod audit;
pub mod auth;
pub mod chat;
pub mod entities;
pub mod scan;
pub mod search;
pub mod system;
pub mod ws;

use crate::middleware::{rate_limit, request_id};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

async fn chat_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, crate::errors::ApiError> {
    let max = state.config.rate_limit_chat_per_minute;
    rate_limit("chat", max, State(state), req, next).await
}

async fn document_ai_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, crate::errors::ApiError> {
    let max = state.config.rate_limit_document_ai_per_minute;
    rate_limit("document_ai", max, State(state), req, next).await
}

/// Builds the full router. Per-route rate limiting is applied with
/// `from_fn_with_state` layers scoped to just the chat and scan-creation
/// routes (spec §4.13); everything else shares the global request-id span.
pub fn build(state: AppState) -> Router {
    let chat_routes = Router::new()
        .route("/chat", post(chat::send))
        .route("/chat/stream", post(chat::stream))
        .layer(axum::middleware::from_fn_with_state(state.clone(), chat_rate_limit));

    let scan_ai_routes = Router::new()
        .route("/scan", post(scan::create))
        .route("/scan/estimate", get(scan::estimate))
        .layer(axum::middleware::from_fn_with_state(state.clone(), document_ai_rate_limit));

    let scan_routes = Router::new()
        .route("/scan", get(scan::list))
        .route("/scan/{id}", get(scan::get).delete(scan::delete))
        .route("/scan/{id}/progress", get(scan::progress))
        .route("/scan/{id}/cancel", post(scan::cancel))
        .route("/scan/{id}/resume", post(scan::resume));

    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/me", get(auth::me))
        .route("/auth/admin-register", post(auth::admin_register));

    let search_routes = Router::new().route("/search", post(search::search));

    let audit_routes = Router::new()
        .route("/audit", get(audit::list))
        .route("/audit/document/{id}", get(audit::for_document))
        .route("/audit/verify", get(audit::verify));

    let entity_routes = Router::new()
        .route("/entities", get(entities::list))
        .route("/entities/document/{id}", get(entities::for_document))
        .route("/entities/types", get(entities::types))
        .route("/entities/graph", get(entities::graph))
        .route("/entities/merge", post(entities::merge));

    let ws_routes = Router::new().route("/ws/scan/{id}", get(ws::scan_progress));

    Router::new()
        .merge(auth_routes)
        .merge(scan_routes)
        .merge(scan_ai_routes)
        .merge(chat_routes)
        .merge(search_routes)
        .merge(audit_routes)
        .merge(entity_routes)
        .merge(ws_routes)
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .layer(axum::middleware::from_fn_with_state(state.clone(), request_id))
        .with_state(state)
}
