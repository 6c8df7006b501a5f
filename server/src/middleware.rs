//! Request correlation + rate-limiting middleware (SPEC_FULL.md §2, spec
//! §4.13/§5). Request-id span generalizes
//! `original_source/backend/app/telemetry/request_context.py`'s contextvar
//! into a `tracing::Span` set per request.

use crate::state::AppState;
use archon_core::error::ArchonError;
use archon_core::ratelimit::SlidingWindow;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Tags every request with a correlation id and records it in `Metrics`
/// (§2 "request totals/latency").
pub async fn request_id(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    use tracing::Instrument;

    let request_id = req
        .headers()
        .get("X-Request-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", request_id = %request_id, method = %req.method(), path = %req.uri().path());

    req.extensions_mut().insert(request_id.clone());
    let started = Instant::now();
    let mut response = next.run(req).instrument(span).await;
    state.metrics.record_request(started.elapsed());
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-Id", value);
    }
    response
}

fn client_key(req: &Request) -> String {
    if let Some(forwarded) = req.headers().get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }
    req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip().to_string()).unwrap_or_else(|| "unknown".to_string())
}

/// Sliding-window rate limiting, keyed by `limiter_name` (e.g. "chat",
/// "document_ai") and client key. Prefers the Redis-backed shared window;
/// falls back to the in-process `DashMap` silently on broker failure
/// (spec §4.13 — fallback must not raise).
pub async fn rate_limit(
    limiter_name: &'static str,
    max_per_minute: u32,
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, crate::errors::ApiError> {
    let key = client_key(&req);
    let window = Duration::from_secs(60);

    let decision = if let Some(redis) = &state.redis {
        match check_redis_window(redis.clone(), limiter_name, &key, window, max_per_minute).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, "rate limiter backend unreachable, falling back to in-process state");
                check_fallback_window(&state, limiter_name, &key, window, max_per_minute)
            }
        }
    } else {
        check_fallback_window(&state, limiter_name, &key, window, max_per_minute)
    };

    if !decision.allowed {
        return Err(crate::errors::ApiError(ArchonError::RateLimited {
            retry_after_secs: decision.retry_after.map(|d| d.as_secs()).unwrap_or(60),
        }));
    }

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        response.headers_mut().insert("X-RateLimit-Remaining", value);
    }
    Ok(response)
}

fn check_fallback_window(
    state: &AppState,
    limiter_name: &'static str,
    key: &str,
    window: Duration,
    max: u32,
) -> archon_core::ratelimit::RateLimitDecision {
    let entry_key = (limiter_name.to_string(), key.to_string());
    let mut entry = state.rate_limit_fallback.entry(entry_key).or_insert_with(SlidingWindow::new);
    entry.check(std::time::Instant::now(), window, max)
}

async fn check_redis_window(
    mut conn: redis::aio::ConnectionManager,
    limiter_name: &str,
    key: &str,
    window: Duration,
    max: u32,
) -> anyhow::Result<archon_core::ratelimit::RateLimitDecision> {
    use redis::AsyncCommands;

    let redis_key = format!("ratelimit:{limiter_name}:{key}");
    let now_ms = chrono::Utc::now().timestamp_millis();
    let window_start = now_ms - window.as_millis() as i64;

    let _: () = conn.zrembyscore(&redis_key, i64::MIN, window_start).await?;
    let count: u32 = conn.zcard(&redis_key).await?;

    if count >= max {
        let oldest: Vec<(String, f64)> = conn.zrange_withscores(&redis_key, 0, 0).await?;
        let retry_after = oldest
            .first()
            .map(|(_, score)| {
                let elapsed_ms = now_ms - *score as i64;
                let remaining_ms = (window.as_millis() as i64 - elapsed_ms).max(0);
                Duration::from_millis(remaining_ms as u64)
            })
            .unwrap_or(window);
        return Ok(archon_core::ratelimit::RateLimitDecision { allowed: false, remaining: 0, retry_after: Some(retry_after) });
    }

    let _: () = conn.zadd(&redis_key, now_ms.to_string(), now_ms).await?;
    let _: () = conn.expire(&redis_key, window.as_secs() as i64).await?;

    Ok(archon_core::ratelimit::RateLimitDecision { allowed: true, remaining: max - count - 1, retry_after: None })
}
