//! Data model (spec §3): Scan, Document, Entity, AuditEntry, ChatSession.
//!
//! These are plain records shared between the catalog layer and the HTTP
//! DTOs; `sqlx::FromRow` is derived in the server crate on newtype wrappers
//! where a driver-specific mapping is needed, keeping this crate free of I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl ScanStatus {
    /// Terminal statuses may only be reached once (spec §3 invariant).
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: i64,
    pub root_path: String,
    pub status: ScanStatus,
    pub total_files: i64,
    pub processed_files: i64,
    pub failed_files: i64,
    pub embeddings_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub fatal_error_message: Option<String>,
}

impl Scan {
    /// `processed_files + failed_files <= total_files` once discovery is
    /// complete — checked wherever totals are updated, not just on read.
    pub fn counts_consistent(&self) -> bool {
        self.processed_files + self.failed_files <= self.total_files
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Image,
    Text,
    Video,
    Email,
    Unknown,
}

impl FileType {
    pub fn from_extension(ext: &str) -> FileType {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => FileType::Pdf,
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "gif" | "webp" => FileType::Image,
            "txt" | "md" | "csv" | "json" | "xml" | "html" | "htm" | "log" => FileType::Text,
            "mp4" | "avi" | "mov" | "mkv" | "webm" => FileType::Video,
            "eml" | "mbox" | "pst" => FileType::Email,
            _ => FileType::Unknown,
        }
    }
}

/// Well-known placeholders short-circuiting the embedding step (glossary:
/// "deferred-OCR sentinel").
pub const IMAGE_DEFERRED_SENTINEL: &str = "[IMAGE] OCR déféré";
pub const VIDEO_DEFERRED_SENTINEL: &str = "[VIDEO] OCR déféré";

pub fn is_deferred_ocr(text: &str) -> bool {
    text.starts_with("[IMAGE]") || text.starts_with("[VIDEO]")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub scan_id: i64,
    pub file_path: String,
    pub file_name: String,
    pub file_type: FileType,
    pub file_size: i64,
    pub text_content: String,
    pub text_length: i64,
    pub has_ocr: bool,
    pub archive_path: Option<String>,
    pub hash_md5: String,
    pub hash_sha256: String,
    pub file_modified_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub lexical_ref: Option<String>,
    pub vector_refs: Vec<String>,
}

impl Document {
    pub fn hash_is_valid(&self) -> bool {
        self.hash_sha256.is_empty() || (self.hash_sha256.len() == 64 && self.hash_sha256.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Per,
    Org,
    Loc,
    Misc,
    Date,
}

impl EntityType {
    /// Label normalization table (spec §4.7): model-native labels collapse
    /// onto the five canonical types.
    pub fn normalize(raw_label: &str) -> EntityType {
        match raw_label.to_ascii_uppercase().as_str() {
            "PER" | "PERSON" => EntityType::Per,
            "ORG" | "ORGANIZATION" => EntityType::Org,
            "LOC" | "GPE" | "FAC" | "LOCATION" => EntityType::Loc,
            "DATE" | "TIME" => EntityType::Date,
            _ => EntityType::Misc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub document_id: i64,
    pub text: String,
    pub entity_type: EntityType,
    pub count: u32,
    pub start_char: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub document_id: Option<i64>,
    pub scan_id: Option<i64>,
    pub details: Option<String>,
    pub user_ip: String,
    pub entry_hash: String,
    pub previous_hash: String,
    pub created_at: DateTime<Utc>,
}

pub const AUDIT_GENESIS: &str = "GENESIS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Analyst,
    Viewer,
}

impl Role {
    /// `admin ⊃ analyst ⊃ viewer` (spec §6).
    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    fn rank(self) -> u8 {
        match self {
            Role::Viewer => 0,
            Role::Analyst => 1,
            Role::Admin => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_label_normalization() {
        assert_eq!(EntityType::normalize("PERSON"), EntityType::Per);
        assert_eq!(EntityType::normalize("GPE"), EntityType::Loc);
        assert_eq!(EntityType::normalize("FAC"), EntityType::Loc);
        assert_eq!(EntityType::normalize("anything_else"), EntityType::Misc);
    }

    #[test]
    fn role_hierarchy() {
        assert!(Role::Admin.satisfies(Role::Viewer));
        assert!(Role::Analyst.satisfies(Role::Analyst));
        assert!(!Role::Viewer.satisfies(Role::Analyst));
    }

    #[test]
    fn deferred_ocr_detection() {
        assert!(is_deferred_ocr(IMAGE_DEFERRED_SENTINEL));
        assert!(is_deferred_ocr(VIDEO_DEFERRED_SENTINEL));
        assert!(!is_deferred_ocr("ordinary extracted text"));
    }

    #[test]
    fn scan_counts_consistency() {
        let scan = Scan {
            id: 1,
            root_path: "/root".into(),
            status: ScanStatus::Running,
            total_files: 10,
            processed_files: 6,
            failed_files: 4,
            embeddings_enabled: true,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            fatal_error_message: None,
        };
        assert!(scan.counts_consistent());
    }
}
