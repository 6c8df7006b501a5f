//! Archive Expander (C3 §4.1): depth-bounded recursive archive walk with a
//! path-traversal guard, producing `(leaf_path, virtual_archive_trail)`
//! pairs. Zip/tar/tar.gz/tar.bz2 are handled in-process; rar/7z shell out to
//! `unar`/`7z` and degrade gracefully when the binary is missing.

use anyhow::{Context, Result};
use archon_core::archive_guard::is_safe_archive_entry;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A leaf file ready for extraction, with the trail of archive paths it was
/// found inside (empty for a plain file on disk).
#[derive(Debug, Clone)]
pub struct ArchiveLeaf {
    pub leaf_path: PathBuf,
    pub virtual_archive_trail: Vec<String>,
    /// Keeps the scoped temp directories for this leaf's trail alive until
    /// the caller is done reading it.
    _guard: Option<std::sync::Arc<TempDir>>,
}

impl ArchiveLeaf {
    /// Takes the scoped temp-directory guard out of this leaf so a caller
    /// building its own wrapper type can keep it alive for as long as it
    /// needs the leaf's file content readable.
    pub fn into_guard(self) -> Option<std::sync::Arc<TempDir>> {
        self._guard
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive expansion failed: {0}")]
    Expansion(String),
    #[error("required tool '{0}' is not installed")]
    MissingTool(String),
}

fn container_kind(path: &Path) -> Option<&'static str> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some("tar.gz")
    } else if name.ends_with(".tar.bz2") {
        Some("tar.bz2")
    } else if name.ends_with(".tar") {
        Some("tar")
    } else if name.ends_with(".zip") {
        Some("zip")
    } else if name.ends_with(".rar") {
        Some("rar")
    } else if name.ends_with(".7z") {
        Some("7z")
    } else {
        None
    }
}

/// Expand `path` into its leaves, bounded to `max_depth` nesting levels.
/// Non-container files pass through unchanged with an empty trail.
pub fn expand(path: &Path, max_depth: u32, unar_path: &str, sevenzip_path: &str) -> Result<Vec<ArchiveLeaf>> {
    let mut out = Vec::new();
    expand_inner(path, Vec::new(), max_depth, unar_path, sevenzip_path, &mut out)?;
    Ok(out)
}

fn expand_inner(
    path: &Path,
    trail: Vec<String>,
    depth_remaining: u32,
    unar_path: &str,
    sevenzip_path: &str,
    out: &mut Vec<ArchiveLeaf>,
) -> Result<()> {
    let Some(kind) = container_kind(path) else {
        out.push(ArchiveLeaf { leaf_path: path.to_path_buf(), virtual_archive_trail: trail, _guard: None });
        return Ok(());
    };

    if depth_remaining == 0 {
        tracing::warn!(path = %path.display(), "archive nesting exceeds max depth, skipping");
        return Ok(());
    }

    let temp_dir = TempDir::new().context("creating scoped temp directory for archive expansion")?;
    let extracted = match kind {
        "zip" => extract_zip(path, temp_dir.path()),
        "tar" => extract_tar(path, temp_dir.path(), None),
        "tar.gz" => extract_tar(path, temp_dir.path(), Some("gz")),
        "tar.bz2" => extract_tar(path, temp_dir.path(), Some("bz2")),
        "rar" => extract_via_tool(unar_path, path, temp_dir.path()),
        "7z" => extract_via_tool(sevenzip_path, path, temp_dir.path()),
        _ => unreachable!(),
    };

    if let Err(e) = extracted {
        tracing::warn!(path = %path.display(), error = %e, "archive expansion failed, skipping container");
        return Ok(());
    }

    let guard = std::sync::Arc::new(temp_dir);
    let mut trail_here = trail.clone();
    trail_here.push(path.display().to_string());

    let mut members = Vec::new();
    collect_files(guard.path(), &mut members)?;
    for member in members {
        expand_inner(&member, trail_here.clone(), depth_remaining - 1, unar_path, sevenzip_path, out)?;
    }
    // Keep the guard alive on every leaf pushed directly under this archive
    // by re-tagging the ones that were pushed as plain pass-through files.
    for leaf in out.iter_mut() {
        if leaf._guard.is_none() && leaf.leaf_path.starts_with(guard.path()) {
            leaf._guard = Some(guard.clone());
        }
    }
    Ok(())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else {
            out.push(entry.path());
        }
    }
    Ok(())
}

fn extract_zip(path: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if !is_safe_archive_entry(&name) {
            tracing::warn!(entry = %name, "refusing unsafe zip entry");
            continue;
        }
        let out_path = dest.join(&name);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out_file)?;
    }
    Ok(())
}

fn extract_tar(path: &Path, dest: &Path, compression: Option<&str>) -> Result<()> {
    let file = std::fs::File::open(path)?;
    let reader: Box<dyn std::io::Read> = match compression {
        Some("gz") => Box::new(flate2::read::GzDecoder::new(file)),
        Some("bz2") => Box::new(bzip2::read::BzDecoder::new(file)),
        _ => Box::new(file),
    };
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().to_string();
        if !is_safe_archive_entry(&name) {
            tracing::warn!(entry = %name, "refusing unsafe tar entry");
            continue;
        }
        entry.unpack_in(dest)?;
    }
    Ok(())
}

fn extract_via_tool(tool: &str, path: &Path, dest: &Path) -> Result<()> {
    let output = std::process::Command::new(tool)
        .arg("-o")
        .arg(dest)
        .arg(path)
        .output()
        .map_err(|_| ArchiveError::MissingTool(tool.to_string()))?;
    if !output.status.success() {
        anyhow::bail!(ArchiveError::Expansion(String::from_utf8_lossy(&output.stderr).to_string()));
    }
    Ok(())
}

pub fn is_container(ext: &OsStr) -> bool {
    container_kind(Path::new(&format!("x.{}", ext.to_string_lossy()))).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_file_passes_through_with_empty_trail() {
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("note.txt");
        std::fs::write(&file_path, "hello").unwrap();
        let leaves = expand(&file_path, 5, "unar", "7z").unwrap();
        assert_eq!(leaves.len(), 1);
        assert!(leaves[0].virtual_archive_trail.is_empty());
    }

    #[test]
    fn zip_with_traversal_entry_is_skipped() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("evil.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer.start_file::<_, ()>("../../etc/passwd", Default::default()).unwrap();
        writer.write_all(b"pwned").unwrap();
        writer.start_file::<_, ()>("safe.txt", Default::default()).unwrap();
        writer.write_all(b"fine").unwrap();
        writer.finish().unwrap();

        let leaves = expand(&zip_path, 5, "unar", "7z").unwrap();
        assert!(leaves.iter().all(|l| l.leaf_path.file_name().unwrap() != "passwd"));
        assert!(leaves.iter().any(|l| l.leaf_path.file_name().unwrap() == "safe.txt"));
    }

    #[test]
    fn container_kind_detects_double_extension_tarballs() {
        assert_eq!(container_kind(Path::new("a.tar.gz")), Some("tar.gz"));
        assert_eq!(container_kind(Path::new("a.tar.bz2")), Some("tar.bz2"));
        assert_eq!(container_kind(Path::new("a.txt")), None);
    }
}
