//! `/chat` and `/chat/stream` (spec §6, C12 §4.12): non-streaming JSON
//! response and an SSE token stream, both session-scoped via the
//! `X-Session-Id` header.

use crate::auth::AuthUser;
use crate::errors::ApiResult;
use crate::rag::{self, ChatRequest as EngineRequest, ChatStreamEvent};
use crate::state::AppState;
use archon_core::error::ArchonError;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

fn default_true() -> bool {
    true
}

fn default_context_limit() -> usize {
    8
}

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub message: String,
    #[serde(default = "default_true")]
    pub use_rag: bool,
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
    #[serde(default = "default_true")]
    pub include_history: bool,
    #[serde(default)]
    pub locale: String,
}

fn session_id_from_headers(headers: &HeaderMap) -> String {
    let raw = headers.get("x-session-id").and_then(|v| v.to_str().ok());
    rag::session_id_or_default(raw)
}

fn engine_request(session_id: String, body: ChatRequestBody) -> EngineRequest {
    EngineRequest {
        session_id,
        message: body.message,
        use_rag: body.use_rag,
        context_limit: body.context_limit.clamp(1, 20),
        include_history: body.include_history,
        locale: body.locale,
    }
}

pub async fn send(
    State(state): State<AppState>,
    _user: AuthUser,
    headers: HeaderMap,
    Json(body): Json<ChatRequestBody>,
) -> ApiResult<Json<rag::ChatResponse>> {
    if !state.config.embeddings_configured() {
        return Err(ArchonError::Validation("AI not configured: set ARCHON_GEMINI_API_KEY".to_string()).into());
    }
    let session_id = session_id_from_headers(&headers);
    let response = rag::chat(&state, engine_request(session_id, body)).await?;
    Ok(Json(response))
}

pub async fn stream(
    State(state): State<AppState>,
    _user: AuthUser,
    headers: HeaderMap,
    Json(body): Json<ChatRequestBody>,
) -> ApiResult<impl IntoResponse> {
    if !state.config.embeddings_configured() {
        return Err(ArchonError::Validation("AI not configured: set ARCHON_GEMINI_API_KEY".to_string()).into());
    }
    let session_id = session_id_from_headers(&headers);
    let events = rag::chat_stream(state, engine_request(session_id, body)).await?;
    Ok(Sse::new(to_sse(events)).keep_alive(KeepAlive::default()))
}

#[derive(Serialize)]
#[serde(untagged)]
enum SseFrame {
    Token { token: String },
    Done { done: bool, contexts: Vec<rag::ChatContext>, message_count: usize },
}

fn to_sse(events: impl Stream<Item = ChatStreamEvent>) -> impl Stream<Item = Result<Event, Infallible>> {
    use futures::StreamExt;
    events.map(|event| {
        let frame = match event {
            ChatStreamEvent::Token(text) => SseFrame::Token { token: text },
            ChatStreamEvent::Done { contexts, message_count } => SseFrame::Done { done: true, contexts, message_count },
        };
        Ok(Event::default().json_data(&frame).unwrap_or_else(|_| Event::default().data("{}")))
    })
}
