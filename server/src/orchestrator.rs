//! Scan Orchestrator (C9 §4.8): the job state machine driving C2-C8 per
//! file, writing to the catalog (C1), and publishing progress (C10).
//! Grounded on spec.md §4.8 directly; the background-task-with-shared-state
//! idiom (spawn a tokio task, poll a cancellation flag between units of
//! work) is the same shape as the teacher's idle-session-pruning loop in
//! `server/src/main.rs`.

use crate::archive::{self, ArchiveLeaf};
use crate::catalog;
use crate::clients::lexical::LexicalDocument;
use crate::clients::vector::{ChunkToUpsert, DocMeta};
use crate::extract::{forensic, ExtractedText, ExtractorRegistry};
use crate::progress::ScanEvent;
use crate::state::AppState;
use archon_core::error::PerFileError;
use archon_core::model::{is_deferred_ocr, Document, FileType};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A scoped resource (archive temp dir, forensic mount) a `PendingFile`
/// keeps alive until it's done being read. Type-erased because a file can
/// be nested under both an archive *and* a forensic mount at once (an
/// archive member found inside a mounted image) and the two guard types
/// differ.
type ScopedGuard = Arc<dyn Any + Send + Sync>;

/// A file ready for the per-file pipeline, resolved to its logical
/// (scan-relative, archive-aware) path.
struct PendingFile {
    real_path: PathBuf,
    logical_path: String,
    archive_path: Option<String>,
    /// Kept alive (and thus the archive temp dir / forensic mount kept
    /// live) until every `PendingFile` sharing it has been processed or
    /// dropped (spec §5: temp dirs released before the worker finishes the
    /// file — in practice, the last file under a shared container/mount).
    _guards: Vec<ScopedGuard>,
}

/// Walk `root`, expanding archives and forensic images as they're found.
/// Bounded by the same `max_archive_depth` the archive expander enforces.
fn discover(root: &Path, config: &crate::config::Config) -> Vec<PendingFile> {
    let mut out = Vec::new();
    walk_dir(root, root, config, &mut out);
    out
}

fn walk_dir(dir: &Path, root: &Path, config: &crate::config::Config, out: &mut Vec<PendingFile>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            walk_dir(&path, root, config, out);
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        expand_one(&path, root, config, out);
    }
}

const FORENSIC_EXTENSIONS: &[&str] = &["e01", "dd", "raw", "img", "aff"];

fn expand_one(path: &Path, root: &Path, config: &crate::config::Config, out: &mut Vec<PendingFile>) {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    let rel = path.strip_prefix(root).unwrap_or(path).display().to_string();

    if FORENSIC_EXTENSIONS.contains(&ext.as_str()) {
        match forensic::mount_image(path, config) {
            Ok(mounted) => {
                // Arc-wrap the mount guard so every file discovered under it
                // shares ownership; the image stays mounted until the last
                // such `PendingFile` is processed or dropped, then
                // `MountedImage::drop` unmounts it (spec §5).
                let mount_point = mounted.mount_point.clone();
                let guard: ScopedGuard = Arc::new(mounted);

                // Recurse into the mounted tree, prefixing each member's
                // logical path with the image's own scan-relative path so
                // it reads like an archive member (spec §3 `archive_path`).
                let mut nested = Vec::new();
                walk_dir(&mount_point, &mount_point, config, &mut nested);
                for mut file in nested {
                    let member_rel = file.logical_path.clone();
                    file.logical_path = format!("{rel}/{member_rel}");
                    file.archive_path = Some(format!("{rel}/"));
                    file._guards.push(guard.clone());
                    out.push(file);
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "forensic image mount failed, skipping");
            }
        }
        return;
    }

    if archive::is_container(path.extension().unwrap_or_else(|| std::ffi::OsStr::new(""))) {
        match archive::expand(path, config.max_archive_depth, &config.unar_path, &config.sevenzip_path) {
            Ok(leaves) => {
                for leaf in leaves {
                    out.push(pending_from_leaf(leaf, &rel));
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "archive expansion failed, skipping container");
            }
        }
        return;
    }

    out.push(PendingFile { real_path: path.to_path_buf(), logical_path: rel, archive_path: None, _guards: Vec::new() });
}

fn pending_from_leaf(leaf: ArchiveLeaf, container_rel: &str) -> PendingFile {
    let trail_names: Vec<String> = leaf
        .virtual_archive_trail
        .iter()
        .map(|p| Path::new(p).file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| p.clone()))
        .collect();
    let leaf_name = leaf.leaf_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let archive_path = format!("{}/", trail_names.join("/"));
    let logical_path = format!("{container_rel}/{archive_path}{leaf_name}");
    let guards = leaf.into_guard().map(|g| g as ScopedGuard).into_iter().collect();
    PendingFile { real_path: leaf.leaf_path, logical_path, archive_path: Some(archive_path), _guards: guards }
}

/// Spawn the background task driving `scan_id` through the state machine.
/// `resume` skips files already present as a Document for this scan.
pub fn spawn(state: AppState, scan_id: i64, resume: bool) {
    let token = CancellationToken::new();
    state.scan_tasks.insert(scan_id, token.clone());
    tokio::spawn(async move {
        let started = std::time::Instant::now();
        let timeout = Duration::from_secs(state.config.scan_task_timeout_secs);
        let run = run_scan(state.clone(), scan_id, resume, token.clone());
        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(scan_id, error = %e, "scan failed");
                let _ = catalog::mark_scan_failed(&state.db, scan_id, &e.to_string()).await;
                state.progress.publish(ScanEvent::Failed { scan_id, reason: e.to_string() });
            }
            Err(_) => {
                tracing::error!(scan_id, "scan exceeded hard timeout");
                let _ = catalog::mark_scan_failed(&state.db, scan_id, "ingestion task exceeded its hard timeout").await;
                state.progress.publish(ScanEvent::Failed { scan_id, reason: "timeout".to_string() });
            }
        }
        state.metrics.record_scan_task(started.elapsed());
        state.scan_tasks.remove(&scan_id);
        state.progress.retire(scan_id);
    });
}

/// Revoke a running scan's task handle; the orchestrator observes this
/// between files and transitions to `cancelled` (spec §5).
pub fn cancel(state: &AppState, scan_id: i64) -> bool {
    if let Some(token) = state.scan_tasks.get(&scan_id) {
        token.cancel();
        true
    } else {
        false
    }
}

async fn run_scan(state: AppState, scan_id: i64, resume: bool, cancel_token: CancellationToken) -> anyhow::Result<()> {
    let scan = catalog::get_scan(&state.db, scan_id).await?.ok_or_else(|| anyhow::anyhow!("scan {scan_id} disappeared"))?;
    let root = PathBuf::from(&scan.root_path);

    catalog::mark_scan_running(&state.db, scan_id).await?;
    state.progress.publish(ScanEvent::Started { scan_id, total_files: 0 });

    let config = state.config.clone();
    let pending = {
        let root = root.clone();
        tokio::task::spawn_blocking(move || discover(&root, &config)).await?
    };

    let total_files = pending.len() as i64;
    catalog::set_total_files(&state.db, scan_id, total_files).await?;
    state.progress.publish(ScanEvent::Started { scan_id, total_files });

    let mut processed = 0i64;
    let mut failed = 0i64;

    for file in pending {
        if cancel_token.is_cancelled() {
            catalog::mark_scan_cancelled(&state.db, scan_id).await?;
            state.progress.publish(ScanEvent::Cancelled { scan_id });
            return Ok(());
        }

        if resume && catalog::document_exists(&state.db, scan_id, &file.logical_path).await? {
            continue;
        }

        state.progress.publish(ScanEvent::FileProcessed {
            scan_id,
            processed,
            total_files,
            file_path: file.logical_path.clone(),
        });

        match process_one_file(&state, scan_id, &file).await {
            Ok(()) => {
                processed += 1;
                catalog::increment_processed(&state.db, scan_id).await?;
                state.progress.publish(ScanEvent::FileProcessed {
                    scan_id,
                    processed,
                    total_files,
                    file_path: file.logical_path.clone(),
                });
            }
            Err(e) => {
                failed += 1;
                catalog::increment_failed(&state.db, scan_id).await?;
                catalog::insert_scan_error(&state.db, scan_id, &file.logical_path, e.error_type(), &e.to_string()).await?;
                state.progress.publish(ScanEvent::FileFailed {
                    scan_id,
                    processed,
                    total_files,
                    file_path: file.logical_path.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    catalog::mark_scan_completed(&state.db, scan_id).await?;
    state.progress.publish(ScanEvent::Completed { scan_id, processed, failed });
    Ok(())
}

/// Steps (b)-(h) of spec §4.8 for one discovered file: extract, hash,
/// insert the Document row, index lexically, embed+index vectors, extract
/// entities, commit. Lexical indexing happens before the vector upsert;
/// either of the latter two may fail without failing the document (spec §5
/// ordering guarantee).
async fn process_one_file(state: &AppState, scan_id: i64, file: &PendingFile) -> Result<(), PerFileError> {
    let real_path = file.real_path.clone();
    let extracted = {
        let registry = state.extractors.clone();
        let config = state.config.clone();
        let path = real_path.clone();
        tokio::task::spawn_blocking(move || registry.extract(&path, &config))
            .await
            .map_err(|e| PerFileError::Extraction(e.to_string()))??
    };

    // A container file (.mbox/.pst) can yield multiple virtual documents;
    // an ordinary file yields exactly one. Each is processed independently
    // so one bad sub-message doesn't fail its siblings.
    let mut first_err = None;
    for (index, piece) in extracted.into_iter().enumerate() {
        let logical_path = match &piece.virtual_name {
            Some(name) => format!("{}/{name}", file.logical_path),
            None => file.logical_path.clone(),
        };
        if let Err(e) = process_one_piece(state, scan_id, &real_path, &logical_path, file.archive_path.as_deref(), piece).await {
            tracing::warn!(scan_id, logical_path, index, error = %e, "sub-document failed");
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn process_one_piece(
    state: &AppState,
    scan_id: i64,
    real_path: &Path,
    logical_path: &str,
    archive_path: Option<&str>,
    piece: ExtractedText,
) -> Result<(), PerFileError> {
    if piece.text.trim().is_empty() {
        return Err(PerFileError::EmptyContent);
    }

    let file_name = Path::new(logical_path).file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let file_type = ExtractorRegistry::file_type_for(Path::new(logical_path));

    let hashes = {
        let path = real_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            std::fs::File::open(&path)
                .and_then(|f| archon_core::hashing::hash_reader(f, archon_core::hashing::DEFAULT_CHUNK_SIZE))
                .unwrap_or(archon_core::hashing::FileHashes::empty())
        })
        .await
        .unwrap_or(archon_core::hashing::FileHashes::empty())
    };

    let file_size = std::fs::metadata(real_path).map(|m| m.len() as i64).unwrap_or(0);
    let file_modified_at = piece
        .intrinsic_date
        .or_else(|| std::fs::metadata(real_path).ok().and_then(|m| m.modified().ok()).map(chrono::DateTime::<chrono::Utc>::from))
        .unwrap_or_else(chrono::Utc::now);

    let doc = catalog::insert_document(
        &state.db,
        catalog::NewDocument {
            scan_id,
            file_path: logical_path,
            file_name: &file_name,
            file_type,
            file_size,
            text_content: &piece.text,
            has_ocr: piece.used_ocr,
            archive_path,
            hash_md5: &hashes.md5,
            hash_sha256: &hashes.sha256,
            file_modified_at,
        },
    )
    .await
    .map_err(|e| PerFileError::Extraction(format!("catalog insert failed: {e}")))?;

    index_document(state, &doc).await?;
    Ok(())
}

/// Steps (e)-(g): lexical index, then embed+vector index (unless the text
/// is a deferred-OCR sentinel), then entity extraction. Called both from
/// the discovery pipeline and from single-document reprocessing.
pub async fn index_document(state: &AppState, doc: &Document) -> Result<(), PerFileError> {
    let lexical_doc = LexicalDocument {
        id: doc.id.to_string(),
        document_id: doc.id.to_string(),
        scan_id: doc.scan_id.to_string(),
        file_path: doc.file_path.clone(),
        file_name: doc.file_name.clone(),
        file_type: file_type_str(doc.file_type).to_string(),
        text_content: doc.text_content.clone(),
        file_modified_at: doc.file_modified_at.to_rfc3339(),
        indexed_at: doc.indexed_at.to_rfc3339(),
        file_size: doc.file_size,
    };
    let lexical_ref = match state.lexical.index(&lexical_doc).await {
        Ok(()) => Some(doc.id.to_string()),
        Err(e) => {
            tracing::warn!(document_id = doc.id, error = %e, "lexical indexing failed");
            None
        }
    };

    let mut vector_refs = Vec::new();
    if state.config.embeddings_configured() && !is_deferred_ocr(&doc.text_content) {
        match embed_and_upsert(state, doc).await {
            Ok(ids) => vector_refs = ids,
            Err(e) => {
                tracing::warn!(document_id = doc.id, error = %e, "embedding/vector indexing failed");
                record_step_error(state, doc, PerFileError::Embedding(e.to_string())).await;
            }
        }
    }

    catalog::set_document_refs(&state.db, doc.id, lexical_ref.as_deref(), &vector_refs)
        .await
        .map_err(|e| PerFileError::LexicalIndex(e.to_string()))?;

    let entities = archon_core::entities::extract_entities(&doc.text_content);
    let mut entity_error = None;
    for entity in entities {
        if let Err(e) =
            catalog::upsert_entity(&state.db, doc.id, &entity.text, entity.entity_type, entity.count, Some(entity.start_char)).await
        {
            tracing::warn!(document_id = doc.id, error = %e, "entity upsert failed");
            entity_error.get_or_insert(e.to_string());
        }
    }
    if let Some(message) = entity_error {
        record_step_error(state, doc, PerFileError::Ner(message)).await;
    }

    Ok(())
}

/// Records a non-fatal per-file step failure as a `ScanError` row (spec
/// §4.8 step (i), §7: "per-file ingestion errors ... recorded as ScanError
/// rows; never fail the scan"). Embedding and entity-extraction failures
/// reach here without aborting `index_document` itself.
async fn record_step_error(state: &AppState, doc: &Document, error: PerFileError) {
    if let Err(insert_err) =
        catalog::insert_scan_error(&state.db, doc.scan_id, &doc.file_path, error.error_type(), &error.to_string()).await
    {
        tracing::warn!(document_id = doc.id, error = %insert_err, "failed to record ScanError row for {}", error.error_type());
    }
}

async fn embed_and_upsert(state: &AppState, doc: &Document) -> anyhow::Result<Vec<String>> {
    let chunks = state.embedding.chunk(&doc.text_content);
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = state.embedding.embed_batch(&texts).await;

    let to_upsert: Vec<ChunkToUpsert> = chunks
        .iter()
        .zip(vectors.into_iter())
        .map(|(c, v)| ChunkToUpsert { index: c.index, text: c.text.clone(), vector: v })
        .collect();

    let meta = DocMeta {
        document_id: doc.id.to_string(),
        scan_id: doc.scan_id.to_string(),
        file_path: doc.file_path.clone(),
        file_name: doc.file_name.clone(),
        file_type: file_type_str(doc.file_type).to_string(),
    };
    state.vector.upsert(&meta, &to_upsert).await
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

/// Single-document reprocessing (spec §4.8 "Reprocessing"): delete stale
/// vectors, then re-run the lexical/vector/entity steps against the
/// existing text.
pub async fn reprocess_document(state: &AppState, document_id: i64) -> anyhow::Result<()> {
    let doc = catalog::get_document(&state.db, document_id).await?.ok_or_else(|| anyhow::anyhow!("document not found"))?;
    if let Err(e) = state.vector.delete_by_document(&doc.id.to_string()).await {
        tracing::warn!(document_id, error = %e, "stale vector delete failed, continuing");
    }
    index_document(state, &doc).await.map_err(|e| anyhow::anyhow!(e.to_string()))
}
