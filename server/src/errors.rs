//! Maps `ArchonError` onto an HTTP response (spec §7), generalizing the
//! teacher's ad hoc `(StatusCode, Json<serde_json::Value>)` handler errors
//! in `server/src/api.rs` into one `IntoResponse` impl every route shares.

use archon_core::error::ArchonError;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError(pub ArchonError);

impl From<ArchonError> for ApiError {
    fn from(e: ArchonError) -> Self {
        ApiError(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ApiError(ArchonError::NotFound("row not found".into())),
            other => ApiError(ArchonError::Internal(other.to_string())),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError(ArchonError::Internal(e.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "error": self.0.to_string() }));
        let mut response = (status, body).into_response();
        if let ArchonError::RateLimited { retry_after_secs } = &self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
