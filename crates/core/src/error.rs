//! Domain error types shared by the orchestrator, retriever, and chat engine.
//!
//! Per-file ingestion failures and request-validation failures are distinct:
//! the former are recorded as `ScanError` rows and never abort a scan, the
//! latter are surfaced to the caller. `ArchonError` models both, and the
//! server's HTTP layer maps the `Surfaced` variants onto status codes.

use thiserror::Error;

/// A single step failure during per-file ingestion (C9 step i). Always
/// non-fatal to the scan; recorded and counted against `failed_files`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PerFileError {
    #[error("empty or whitespace-only extracted content")]
    EmptyContent,
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("hashing failed: {0}")]
    Hashing(String),
    #[error("lexical indexing failed: {0}")]
    LexicalIndex(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector indexing failed: {0}")]
    VectorIndex(String),
    #[error("entity extraction failed: {0}")]
    Ner(String),
    #[error("archive expansion failed: {0}")]
    Archive(String),
}

impl PerFileError {
    /// The `error_type` stored on a `ScanError` row — mirrors the spec's
    /// "exception class name" wording with a stable Rust-side tag instead.
    pub fn error_type(&self) -> &'static str {
        match self {
            PerFileError::EmptyContent => "EmptyContent",
            PerFileError::Extraction(_) => "ExtractionError",
            PerFileError::Hashing(_) => "HashingError",
            PerFileError::LexicalIndex(_) => "LexicalIndexError",
            PerFileError::Embedding(_) => "EmbeddingError",
            PerFileError::VectorIndex(_) => "VectorIndexError",
            PerFileError::Ner(_) => "NERError",
            PerFileError::Archive(_) => "ArchiveError",
        }
    }
}

/// Errors that reach the API boundary and map directly onto an HTTP status.
#[derive(Debug, Error)]
pub enum ArchonError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ArchonError {
    pub fn status_code(&self) -> u16 {
        match self {
            ArchonError::Validation(_) => 400,
            ArchonError::NotFound(_) => 404,
            ArchonError::Conflict(_) => 409,
            ArchonError::Unauthorized => 401,
            ArchonError::Forbidden => 403,
            ArchonError::RateLimited { .. } => 429,
            ArchonError::Internal(_) => 500,
        }
    }
}
