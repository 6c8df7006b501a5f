//! Content Store (C1 §3): repository functions over the Postgres catalog
//! schema (`migrations/0001_init.sql`). Every row type mirrors
//! `archon_core::model`; mapping between the DB's `TEXT`-as-enum columns
//! and the core enums happens at the edges of this module so the rest of
//! the server works with the core types directly.
//!
//! Runtime-checked queries (`sqlx::query_as`, not the `query_as!` macro) are
//! used throughout since this workspace is built without a live database to
//! validate against at compile time.

use archon_core::model::{
    AuditEntry, Document, Entity, EntityType, FileType, Role, Scan, ScanStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

fn scan_status_str(s: ScanStatus) -> &'static str {
    match s {
        ScanStatus::Pending => "pending",
        ScanStatus::Running => "running",
        ScanStatus::Completed => "completed",
        ScanStatus::Failed => "failed",
        ScanStatus::Cancelled => "cancelled",
    }
}

fn parse_scan_status(s: &str) -> ScanStatus {
    match s {
        "running" => ScanStatus::Running,
        "completed" => ScanStatus::Completed,
        "failed" => ScanStatus::Failed,
        "cancelled" => ScanStatus::Cancelled,
        _ => ScanStatus::Pending,
    }
}

fn file_type_str(t: FileType) -> &'static str {
    match t {
        FileType::Pdf => "pdf",
        FileType::Image => "image",
        FileType::Text => "text",
        FileType::Video => "video",
        FileType::Email => "email",
        FileType::Unknown => "unknown",
    }
}

fn parse_file_type(s: &str) -> FileType {
    match s {
        "pdf" => FileType::Pdf,
        "image" => FileType::Image,
        "text" => FileType::Text,
        "video" => FileType::Video,
        "email" => FileType::Email,
        _ => FileType::Unknown,
    }
}

fn entity_type_str(t: EntityType) -> &'static str {
    match t {
        EntityType::Per => "PER",
        EntityType::Org => "ORG",
        EntityType::Loc => "LOC",
        EntityType::Misc => "MISC",
        EntityType::Date => "DATE",
    }
}

fn parse_entity_type(s: &str) -> EntityType {
    match s {
        "PER" => EntityType::Per,
        "ORG" => EntityType::Org,
        "LOC" => EntityType::Loc,
        "DATE" => EntityType::Date,
        _ => EntityType::Misc,
    }
}

pub fn parse_role(s: &str) -> Role {
    match s {
        "admin" => Role::Admin,
        "analyst" => Role::Analyst,
        _ => Role::Viewer,
    }
}

pub fn role_str(r: Role) -> &'static str {
    match r {
        Role::Admin => "admin",
        Role::Analyst => "analyst",
        Role::Viewer => "viewer",
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

pub async fn count_users(db: &PgPool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT count(*) FROM users").fetch_one(db).await
}

pub async fn get_user_by_username(db: &PgPool, username: &str) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as("SELECT id, username, password_hash, role FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(db)
        .await
}

pub async fn get_user_by_id(db: &PgPool, id: i64) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as("SELECT id, username, password_hash, role FROM users WHERE id = $1").bind(id).fetch_optional(db).await
}

pub async fn create_user(db: &PgPool, username: &str, password_hash: &str, role: Role) -> sqlx::Result<UserRow> {
    sqlx::query_as(
        "INSERT INTO users (username, password_hash, role) VALUES ($1, $2, $3)
         RETURNING id, username, password_hash, role",
    )
    .bind(username)
    .bind(password_hash)
    .bind(role_str(role))
    .fetch_one(db)
    .await
}

// ---------------------------------------------------------------------------
// Scans
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct ScanRow {
    id: i64,
    root_path: String,
    status: String,
    total_files: i64,
    processed_files: i64,
    failed_files: i64,
    embeddings_enabled: bool,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    fatal_error_message: Option<String>,
}

impl From<ScanRow> for Scan {
    fn from(r: ScanRow) -> Self {
        Scan {
            id: r.id,
            root_path: r.root_path,
            status: parse_scan_status(&r.status),
            total_files: r.total_files,
            processed_files: r.processed_files,
            failed_files: r.failed_files,
            embeddings_enabled: r.embeddings_enabled,
            created_at: r.created_at,
            started_at: r.started_at,
            completed_at: r.completed_at,
            fatal_error_message: r.fatal_error_message,
        }
    }
}

const SCAN_COLUMNS: &str = "id, root_path, status, total_files, processed_files, failed_files, \
     embeddings_enabled, created_at, started_at, completed_at, fatal_error_message";

/// A scan on the same resolved path already pending/running — the caller
/// (API) deduplicates onto this instead of creating a new one (spec §6).
pub async fn find_active_scan_by_path(db: &PgPool, root_path: &str) -> sqlx::Result<Option<Scan>> {
    let row: Option<ScanRow> = sqlx::query_as(&format!(
        "SELECT {SCAN_COLUMNS} FROM scans WHERE root_path = $1 AND status IN ('pending', 'running')"
    ))
    .bind(root_path)
    .fetch_optional(db)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn create_scan(db: &PgPool, root_path: &str, embeddings_enabled: bool) -> sqlx::Result<Scan> {
    let row: ScanRow = sqlx::query_as(&format!(
        "INSERT INTO scans (root_path, status, embeddings_enabled) VALUES ($1, 'pending', $2)
         RETURNING {SCAN_COLUMNS}"
    ))
    .bind(root_path)
    .bind(embeddings_enabled)
    .fetch_one(db)
    .await?;
    Ok(row.into())
}

pub async fn get_scan(db: &PgPool, id: i64) -> sqlx::Result<Option<Scan>> {
    let row: Option<ScanRow> = sqlx::query_as(&format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row.map(Into::into))
}

pub async fn list_scans(db: &PgPool) -> sqlx::Result<Vec<Scan>> {
    let rows: Vec<ScanRow> =
        sqlx::query_as(&format!("SELECT {SCAN_COLUMNS} FROM scans ORDER BY created_at DESC")).fetch_all(db).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn mark_scan_running(db: &PgPool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE scans SET status = 'running', started_at = now() WHERE id = $1").bind(id).execute(db).await?;
    Ok(())
}

pub async fn set_total_files(db: &PgPool, id: i64, total: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE scans SET total_files = $2 WHERE id = $1").bind(id).bind(total).execute(db).await?;
    Ok(())
}

pub async fn increment_processed(db: &PgPool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE scans SET processed_files = processed_files + 1 WHERE id = $1").bind(id).execute(db).await?;
    Ok(())
}

pub async fn increment_failed(db: &PgPool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE scans SET failed_files = failed_files + 1 WHERE id = $1").bind(id).execute(db).await?;
    Ok(())
}

pub async fn mark_scan_completed(db: &PgPool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE scans SET status = 'completed', completed_at = now() WHERE id = $1").bind(id).execute(db).await?;
    Ok(())
}

pub async fn mark_scan_failed(db: &PgPool, id: i64, message: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE scans SET status = 'failed', completed_at = now(), fatal_error_message = $2 WHERE id = $1")
        .bind(id)
        .bind(message)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn mark_scan_cancelled(db: &PgPool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE scans SET status = 'cancelled', completed_at = now() WHERE id = $1").bind(id).execute(db).await?;
    Ok(())
}

pub async fn delete_scan(db: &PgPool, id: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM scans WHERE id = $1").bind(id).execute(db).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct DocumentRow {
    id: i64,
    scan_id: i64,
    file_path: String,
    file_name: String,
    file_type: String,
    file_size: i64,
    text_content: String,
    text_length: i64,
    has_ocr: bool,
    archive_path: Option<String>,
    hash_md5: String,
    hash_sha256: String,
    file_modified_at: DateTime<Utc>,
    indexed_at: DateTime<Utc>,
    lexical_ref: Option<String>,
    vector_refs: serde_json::Value,
}

impl From<DocumentRow> for Document {
    fn from(r: DocumentRow) -> Self {
        Document {
            id: r.id,
            scan_id: r.scan_id,
            file_path: r.file_path,
            file_name: r.file_name,
            file_type: parse_file_type(&r.file_type),
            file_size: r.file_size,
            text_content: r.text_content,
            text_length: r.text_length,
            has_ocr: r.has_ocr,
            archive_path: r.archive_path,
            hash_md5: r.hash_md5,
            hash_sha256: r.hash_sha256,
            file_modified_at: r.file_modified_at,
            indexed_at: r.indexed_at,
            lexical_ref: r.lexical_ref,
            vector_refs: serde_json::from_value(r.vector_refs).unwrap_or_default(),
        }
    }
}

const DOCUMENT_COLUMNS: &str = "id, scan_id, file_path, file_name, file_type, file_size, text_content, \
     text_length, has_ocr, archive_path, hash_md5, hash_sha256, file_modified_at, indexed_at, \
     lexical_ref, vector_refs";

pub async fn document_exists(db: &PgPool, scan_id: i64, file_path: &str) -> sqlx::Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM documents WHERE scan_id = $1 AND file_path = $2")
        .bind(scan_id)
        .bind(file_path)
        .fetch_one(db)
        .await?;
    Ok(count > 0)
}

#[allow(clippy::too_many_arguments)]
pub struct NewDocument<'a> {
    pub scan_id: i64,
    pub file_path: &'a str,
    pub file_name: &'a str,
    pub file_type: FileType,
    pub file_size: i64,
    pub text_content: &'a str,
    pub has_ocr: bool,
    pub archive_path: Option<&'a str>,
    pub hash_md5: &'a str,
    pub hash_sha256: &'a str,
    pub file_modified_at: DateTime<Utc>,
}

pub async fn insert_document(db: &PgPool, doc: NewDocument<'_>) -> sqlx::Result<Document> {
    let row: DocumentRow = sqlx::query_as(&format!(
        "INSERT INTO documents (scan_id, file_path, file_name, file_type, file_size, text_content, \
         text_length, has_ocr, archive_path, hash_md5, hash_sha256, file_modified_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING {DOCUMENT_COLUMNS}"
    ))
    .bind(doc.scan_id)
    .bind(doc.file_path)
    .bind(doc.file_name)
    .bind(file_type_str(doc.file_type))
    .bind(doc.file_size)
    .bind(doc.text_content)
    .bind(doc.text_content.chars().count() as i64)
    .bind(doc.has_ocr)
    .bind(doc.archive_path)
    .bind(doc.hash_md5)
    .bind(doc.hash_sha256)
    .bind(doc.file_modified_at)
    .fetch_one(db)
    .await?;
    Ok(row.into())
}

pub async fn set_document_refs(db: &PgPool, id: i64, lexical_ref: Option<&str>, vector_refs: &[String]) -> sqlx::Result<()> {
    sqlx::query("UPDATE documents SET lexical_ref = $2, vector_refs = $3 WHERE id = $1")
        .bind(id)
        .bind(lexical_ref)
        .bind(serde_json::to_value(vector_refs).unwrap_or_default())
        .execute(db)
        .await?;
    Ok(())
}

pub async fn get_document(db: &PgPool, id: i64) -> sqlx::Result<Option<Document>> {
    let row: Option<DocumentRow> =
        sqlx::query_as(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1")).bind(id).fetch_optional(db).await?;
    Ok(row.map(Into::into))
}

pub async fn list_documents_by_scan(db: &PgPool, scan_id: i64) -> sqlx::Result<Vec<Document>> {
    let rows: Vec<DocumentRow> = sqlx::query_as(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE scan_id = $1"))
        .bind(scan_id)
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

// ---------------------------------------------------------------------------
// Scan errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ScanErrorRow {
    pub id: i64,
    pub scan_id: i64,
    pub file_path: String,
    pub error_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_scan_error(db: &PgPool, scan_id: i64, file_path: &str, error_type: &str, message: &str) -> sqlx::Result<()> {
    const MAX_MESSAGE_CHARS: usize = 2000;
    let truncated: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
    sqlx::query("INSERT INTO scan_errors (scan_id, file_path, error_type, message) VALUES ($1, $2, $3, $4)")
        .bind(scan_id)
        .bind(file_path)
        .bind(error_type)
        .bind(truncated)
        .execute(db)
        .await?;
    Ok(())
}

/// Last `n` errors for a scan, newest first — used to populate the
/// terminal progress event (spec §4.8 step 6, N=10).
pub async fn last_scan_errors(db: &PgPool, scan_id: i64, n: i64) -> sqlx::Result<Vec<ScanErrorRow>> {
    sqlx::query_as("SELECT id, scan_id, file_path, error_type, message, created_at FROM scan_errors WHERE scan_id = $1 ORDER BY created_at DESC LIMIT $2")
        .bind(scan_id)
        .bind(n)
        .fetch_all(db)
        .await
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct EntityRow {
    id: i64,
    document_id: i64,
    text: String,
    entity_type: String,
    count: i32,
    start_char: Option<i64>,
}

impl From<EntityRow> for Entity {
    fn from(r: EntityRow) -> Self {
        Entity {
            id: r.id,
            document_id: r.document_id,
            text: r.text,
            entity_type: parse_entity_type(&r.entity_type),
            count: r.count as u32,
            start_char: r.start_char.map(|v| v as usize),
        }
    }
}

const ENTITY_COLUMNS: &str = "id, document_id, text, entity_type, count, start_char";

/// Merge-upsert: (document_id, text, type) is unique (spec §3), so a repeat
/// occurrence sums its count into the existing row rather than duplicating.
pub async fn upsert_entity(
    db: &PgPool,
    document_id: i64,
    text: &str,
    entity_type: EntityType,
    count: u32,
    start_char: Option<usize>,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO entities (document_id, text, entity_type, count, start_char) VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (document_id, text, entity_type)
         DO UPDATE SET count = entities.count + excluded.count",
    )
    .bind(document_id)
    .bind(text)
    .bind(entity_type_str(entity_type))
    .bind(count as i32)
    .bind(start_char.map(|v| v as i64))
    .execute(db)
    .await?;
    Ok(())
}

pub async fn list_entities_for_document(db: &PgPool, document_id: i64) -> sqlx::Result<Vec<Entity>> {
    let rows: Vec<EntityRow> =
        sqlx::query_as(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE document_id = $1")).bind(document_id).fetch_all(db).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_entity_types(db: &PgPool) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar("SELECT DISTINCT entity_type FROM entities ORDER BY entity_type").fetch_all(db).await
}

/// Flat entity listing for `GET /entities`, optionally filtered by type,
/// newest-document-first, capped at `limit`.
pub async fn list_entities(db: &PgPool, entity_type: Option<&str>, limit: i64) -> sqlx::Result<Vec<Entity>> {
    let rows: Vec<EntityRow> = sqlx::query_as(&format!(
        "SELECT {ENTITY_COLUMNS} FROM entities WHERE ($1::text IS NULL OR entity_type = $1) ORDER BY id DESC LIMIT $2"
    ))
    .bind(entity_type)
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EntityGraphRow {
    pub text: String,
    pub entity_type: String,
    pub total_count: i64,
    pub document_count: i64,
}

/// Aggregate entities across documents for the graph view (`GET
/// /entities/graph`), optionally scoped to a project path prefix and a
/// minimum total count.
pub async fn entity_graph(
    db: &PgPool,
    entity_type: Option<&str>,
    min_count: i64,
    limit: i64,
    project_path: Option<&str>,
) -> sqlx::Result<Vec<EntityGraphRow>> {
    let sql = "SELECT e.text, e.entity_type, sum(e.count) AS total_count, count(DISTINCT e.document_id) AS document_count
         FROM entities e JOIN documents d ON d.id = e.document_id
         WHERE ($1::text IS NULL OR e.entity_type = $1)
           AND ($4::text IS NULL OR d.file_path LIKE $4 || '%')
         GROUP BY e.text, e.entity_type
         HAVING sum(e.count) >= $2
         ORDER BY total_count DESC
         LIMIT $3";
    sqlx::query_as(sql)
        .bind(entity_type)
        .bind(min_count)
        .bind(limit)
        .bind(project_path)
        .fetch_all(db)
        .await
}

pub async fn merge_entities(db: &PgPool, from_id: i64, into_id: i64) -> sqlx::Result<()> {
    let mut tx = db.begin().await?;
    let from: Option<EntityRow> =
        sqlx::query_as(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = $1")).bind(from_id).fetch_optional(&mut *tx).await?;
    if let Some(from) = from {
        sqlx::query("UPDATE entities SET count = count + $2 WHERE id = $1").bind(into_id).bind(from.count).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM entities WHERE id = $1").bind(from_id).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Audit chain
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct AuditRow {
    id: i64,
    action: String,
    document_id: Option<i64>,
    scan_id: Option<i64>,
    details: Option<String>,
    user_ip: String,
    entry_hash: String,
    previous_hash: String,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(r: AuditRow) -> Self {
        AuditEntry {
            id: r.id,
            action: r.action,
            document_id: r.document_id,
            scan_id: r.scan_id,
            details: r.details,
            user_ip: r.user_ip,
            entry_hash: r.entry_hash,
            previous_hash: r.previous_hash,
            created_at: r.created_at,
        }
    }
}

const AUDIT_COLUMNS: &str = "id, action, document_id, scan_id, details, user_ip, entry_hash, previous_hash, created_at";

/// Append one entry to the hash chain (C13 §4.11): reads the last entry's
/// hash (or GENESIS) and the new row's hash under the same transaction so
/// concurrent appends can't race onto the same `previous_hash`.
pub async fn append_audit_entry(
    db: &PgPool,
    action: &str,
    document_id: Option<i64>,
    scan_id: Option<i64>,
    details: Option<&str>,
    user_ip: &str,
) -> sqlx::Result<AuditEntry> {
    let mut tx = db.begin().await?;
    let previous_hash: String = sqlx::query_scalar("SELECT entry_hash FROM audit_entries ORDER BY id DESC LIMIT 1 FOR UPDATE")
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or_else(|| archon_core::audit::genesis().to_string());

    let created_at = Utc::now();
    let created_at_iso = created_at.to_rfc3339();
    let entry_hash = archon_core::audit::compute_entry_hash(action, &created_at_iso, details, &previous_hash);

    let row: AuditRow = sqlx::query_as(&format!(
        "INSERT INTO audit_entries (action, document_id, scan_id, details, user_ip, entry_hash, previous_hash, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {AUDIT_COLUMNS}"
    ))
    .bind(action)
    .bind(document_id)
    .bind(scan_id)
    .bind(details)
    .bind(user_ip)
    .bind(&entry_hash)
    .bind(&previous_hash)
    .bind(created_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row.into())
}

pub async fn list_audit_entries(db: &PgPool, limit: i64) -> sqlx::Result<Vec<AuditEntry>> {
    let rows: Vec<AuditRow> =
        sqlx::query_as(&format!("SELECT {AUDIT_COLUMNS} FROM audit_entries ORDER BY id DESC LIMIT $1")).bind(limit).fetch_all(db).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_audit_entries_for_document(db: &PgPool, document_id: i64) -> sqlx::Result<Vec<AuditEntry>> {
    let rows: Vec<AuditRow> = sqlx::query_as(&format!(
        "SELECT {AUDIT_COLUMNS} FROM audit_entries WHERE document_id = $1 ORDER BY id ASC"
    ))
    .bind(document_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Recompute and check every entry's linkage, in id order. Returns the
/// first tampered entry's id, or `None` if the chain verifies intact.
pub async fn verify_audit_chain(db: &PgPool) -> sqlx::Result<Option<i64>> {
    let rows: Vec<AuditRow> = sqlx::query_as(&format!("SELECT {AUDIT_COLUMNS} FROM audit_entries ORDER BY id ASC")).fetch_all(db).await?;
    let timestamps: Vec<String> = rows.iter().map(|r| r.created_at.to_rfc3339()).collect();
    let links: Vec<archon_core::audit::ChainLink> = rows
        .iter()
        .zip(timestamps.iter())
        .map(|(r, created_at_iso)| archon_core::audit::ChainLink {
            action: &r.action,
            created_at_iso,
            details: r.details.as_deref(),
            previous_hash: &r.previous_hash,
            entry_hash: &r.entry_hash,
        })
        .collect();
    Ok(archon_core::audit::verify_chain(&links).map(|idx| rows[idx].id))
}
