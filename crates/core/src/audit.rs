//! Audit Chain (C13 §4.11): append-only SHA256 hash-linked log. Pure
//! hash-computation lives here; the server crate owns reading the last row
//! and persisting new ones.

use crate::model::AUDIT_GENESIS;
use sha2::{Digest, Sha256};

/// `entry_hash = SHA256(action | created_at_iso | details_or_empty | previous_hash)`,
/// matching spec §3/§4.11 exactly (pipe-joined, empty string for absent
/// details, literal "GENESIS" for the first entry).
pub fn compute_entry_hash(action: &str, created_at_iso: &str, details: Option<&str>, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action.as_bytes());
    hasher.update(b"|");
    hasher.update(created_at_iso.as_bytes());
    hasher.update(b"|");
    hasher.update(details.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn genesis() -> &'static str {
    AUDIT_GENESIS
}

/// A minimal view of a chain entry sufficient to verify linkage, independent
/// of the full `AuditEntry` model (so verification can run against any
/// projection of the catalog rows).
pub struct ChainLink<'a> {
    pub action: &'a str,
    pub created_at_iso: &'a str,
    pub details: Option<&'a str>,
    pub previous_hash: &'a str,
    pub entry_hash: &'a str,
}

/// Verify a full chain in order. Returns the index of the first entry whose
/// linkage or hash doesn't check out, or `None` if the chain is intact.
pub fn verify_chain(entries: &[ChainLink<'_>]) -> Option<usize> {
    let mut expected_previous = AUDIT_GENESIS.to_string();
    for (i, entry) in entries.iter().enumerate() {
        if entry.previous_hash != expected_previous {
            return Some(i);
        }
        let recomputed = compute_entry_hash(entry.action, entry.created_at_iso, entry.details, entry.previous_hash);
        if recomputed != entry.entry_hash {
            return Some(i);
        }
        expected_previous = entry.entry_hash.to_string();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_chain(tampered_details_at: Option<usize>) -> Vec<(String, String, Option<String>)> {
        let raw = vec![
            ("create_scan", "2026-01-01T00:00:00Z", Some("{\"id\":1}".to_string())),
            ("index_document", "2026-01-01T00:01:00Z", Some("{\"id\":2}".to_string())),
            ("complete_scan", "2026-01-01T00:02:00Z", None),
        ];
        raw.into_iter()
            .enumerate()
            .map(|(i, (action, ts, details))| {
                let details = if Some(i) == tampered_details_at {
                    Some("{\"id\":TAMPERED}".to_string())
                } else {
                    details
                };
                (action.to_string(), ts.to_string(), details)
            })
            .collect()
    }

    fn hash_chain(rows: &[(String, String, Option<String>)]) -> Vec<String> {
        let mut hashes = Vec::new();
        let mut prev = AUDIT_GENESIS.to_string();
        for (action, ts, details) in rows {
            let h = compute_entry_hash(action, ts, details.as_deref(), &prev);
            hashes.push(h.clone());
            prev = h;
        }
        hashes
    }

    #[test]
    fn intact_chain_verifies() {
        let rows = build_chain(None);
        let hashes = hash_chain(&rows);
        let mut prev = AUDIT_GENESIS.to_string();
        let mut links = Vec::new();
        for (i, (action, ts, details)) in rows.iter().enumerate() {
            links.push(ChainLink { action, created_at_iso: ts, details: details.as_deref(), previous_hash: Box::leak(prev.clone().into_boxed_str()), entry_hash: &hashes[i] });
            prev = hashes[i].clone();
        }
        assert_eq!(verify_chain(&links), None);
    }

    #[test]
    fn tampering_with_entry_is_detected() {
        // Build the real (untampered) chain to get correct hashes, then feed
        // the verifier a tampered `details` field for entry B (index 1) while
        // keeping its recorded entry_hash as originally computed — the
        // hash-chain check must flag the mismatch at B.
        let original_rows = build_chain(None);
        let hashes = hash_chain(&original_rows);
        let tampered_rows = build_chain(Some(1));

        let mut prev_owned = vec![AUDIT_GENESIS.to_string()];
        for h in &hashes[..hashes.len() - 1] {
            prev_owned.push(h.clone());
        }

        let links: Vec<ChainLink> = tampered_rows
            .iter()
            .enumerate()
            .map(|(i, (action, ts, details))| ChainLink {
                action,
                created_at_iso: ts,
                details: details.as_deref(),
                previous_hash: &prev_owned[i],
                entry_hash: &hashes[i],
            })
            .collect();

        assert_eq!(verify_chain(&links), Some(1));
    }

    #[test]
    fn deterministic_hash() {
        let a = compute_entry_hash("x", "t", Some("d"), "GENESIS");
        let b = compute_entry_hash("x", "t", Some("d"), "GENESIS");
        assert_eq!(a, b);
    }
}
