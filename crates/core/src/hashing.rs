//! Streaming MD5/SHA256 hashing (C4), ported from
//! `compute_file_hashes`/`compute_content_hashes` in the original Python
//! service: fixed-size chunk reads, lowercase hex digests, and an
//! empty-string sentinel pair on an unreadable file rather than an error —
//! the orchestrator treats that pair as non-fatal.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

pub const DEFAULT_CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHashes {
    pub md5: String,
    pub sha256: String,
}

impl FileHashes {
    pub const fn empty() -> Self {
        FileHashes { md5: String::new(), sha256: String::new() }
    }
}

/// Hash a readable stream in fixed-size chunks. Deterministic for a given
/// byte sequence regardless of how it's chunked (spec §8 hashing property).
pub fn hash_reader<R: Read>(mut reader: R, chunk_size: usize) -> std::io::Result<FileHashes> {
    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        md5.update(&buf[..n]);
        sha256.update(&buf[..n]);
    }
    Ok(FileHashes { md5: hex::encode(md5.finalize()), sha256: hex::encode(sha256.finalize()) })
}

/// Hash a file on disk. Returns the empty-pair sentinel on any I/O error,
/// matching the original's non-fatal-unreadable-file behavior exactly.
pub fn compute_file_hashes(path: &Path) -> FileHashes {
    compute_file_hashes_chunked(path, DEFAULT_CHUNK_SIZE)
}

pub fn compute_file_hashes_chunked(path: &Path, chunk_size: usize) -> FileHashes {
    match std::fs::File::open(path) {
        Ok(f) => hash_reader(f, chunk_size).unwrap_or_else(|_| FileHashes::empty()),
        Err(_) => FileHashes::empty(),
    }
}

/// Hash in-memory content (used for mbox sub-messages, re-hash on reprocess).
pub fn compute_content_hashes(content: &[u8]) -> FileHashes {
    let mut md5 = Md5::new();
    md5.update(content);
    let mut sha256 = Sha256::new();
    sha256.update(content);
    FileHashes { md5: hex::encode(md5.finalize()), sha256: hex::encode(sha256.finalize()) }
}

pub fn verify_file_hash(path: &Path, expected_sha256: &str) -> bool {
    compute_file_hashes(path).sha256.eq_ignore_ascii_case(expected_sha256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn whole_file_and_chunked_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        let content = b"the quick brown fox jumps over the lazy dog".repeat(500);
        f.write_all(&content).unwrap();
        drop(f);

        let whole = compute_file_hashes_chunked(&path, 1 << 20);
        let chunked = compute_file_hashes_chunked(&path, 7);
        assert_eq!(whole, chunked);
        assert_eq!(compute_content_hashes(&content), whole);
    }

    #[test]
    fn deterministic() {
        let a = compute_content_hashes(b"hello world");
        let b = compute_content_hashes(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.sha256.len(), 64);
    }

    #[test]
    fn unreadable_file_returns_empty_sentinel() {
        let hashes = compute_file_hashes(Path::new("/nonexistent/path/does/not/exist"));
        assert_eq!(hashes, FileHashes::empty());
    }

    #[test]
    fn verify_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"abc123").unwrap();
        let h = compute_file_hashes(&path);
        assert!(verify_file_hash(&path, &h.sha256));
        assert!(!verify_file_hash(&path, "deadbeef"));
    }
}
