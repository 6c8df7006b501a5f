//! Weighted Reciprocal Rank Fusion (C11 §4.10), ported from
//! `reciprocal_rank_fusion` in `original_source/backend/app/api/search.py`:
//! each source contributes `weight / (k + rank + 1)` per document, a
//! document appearing in both sources sums both contributions, and the
//! result is a score per `document_id` rather than a merged result list —
//! callers re-attach display fields (snippet, file_name, ...) themselves.

use std::collections::HashMap;

pub const RRF_K: f64 = 60.0;

/// One hit from a single recall side, in rank order (0-based rank is
/// implicit in position within the slice passed to `fuse`).
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub document_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub document_id: String,
    pub score: f64,
    pub from_lexical: bool,
    pub from_semantic: bool,
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
}

/// Fuse lexical and semantic hit lists. `semantic_weight` in `[0, 1]`;
/// `keyword_weight = 1 - semantic_weight`. Order of the returned vec is by
/// descending score, ties broken by the side that contributed the larger
/// weight keeping its original relative order (stable sort on a secondary
/// key derived from whichever rank is present).
pub fn fuse(lexical: &[RankedHit], semantic: &[RankedHit], semantic_weight: f64) -> Vec<FusedHit> {
    let semantic_weight = semantic_weight.clamp(0.0, 1.0);
    let keyword_weight = 1.0 - semantic_weight;

    let mut acc: HashMap<String, FusedHit> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for (rank, hit) in lexical.iter().enumerate() {
        let contribution = keyword_weight / (RRF_K + rank as f64 + 1.0);
        let entry = acc.entry(hit.document_id.clone()).or_insert_with(|| {
            order.push(hit.document_id.clone());
            FusedHit {
                document_id: hit.document_id.clone(),
                score: 0.0,
                from_lexical: false,
                from_semantic: false,
                lexical_rank: None,
                semantic_rank: None,
            }
        });
        entry.score += contribution;
        entry.from_lexical = true;
        entry.lexical_rank = Some(rank);
    }

    for (rank, hit) in semantic.iter().enumerate() {
        let contribution = semantic_weight / (RRF_K + rank as f64 + 1.0);
        let entry = acc.entry(hit.document_id.clone()).or_insert_with(|| {
            order.push(hit.document_id.clone());
            FusedHit {
                document_id: hit.document_id.clone(),
                score: 0.0,
                from_lexical: false,
                from_semantic: false,
                lexical_rank: None,
                semantic_rank: None,
            }
        });
        entry.score += contribution;
        entry.from_semantic = true;
        entry.semantic_rank = Some(rank);
    }

    let mut fused: Vec<FusedHit> = order.into_iter().filter_map(|id| acc.remove(&id)).collect();
    // Stable sort: descending score, ties keep insertion (first-seen) order.
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

/// Apply `offset..offset+limit` after fusion (spec §4.10 final step).
pub fn paginate(fused: Vec<FusedHit>, offset: usize, limit: usize) -> Vec<FusedHit> {
    fused.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str) -> RankedHit {
        RankedHit { document_id: id.to_string() }
    }

    #[test]
    fn weighted_rrf_flips_with_weight() {
        let lexical = vec![hit("doc1"), hit("doc2")];
        let semantic = vec![hit("doc2"), hit("doc1")];

        let low = fuse(&lexical, &semantic, 0.1);
        assert_eq!(low[0].document_id, "doc1");

        let high = fuse(&lexical, &semantic, 0.9);
        assert_eq!(high[0].document_id, "doc2");
    }

    #[test]
    fn single_source_score_is_that_sources_rrf_alone() {
        let lexical = vec![hit("doc1"), hit("doc2")];
        let fused = fuse(&lexical, &[], 0.5);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - 0.5 / (RRF_K + 1.0)).abs() < 1e-12);
        assert!(!fused[0].from_semantic);
    }

    #[test]
    fn both_empty_yields_empty_result() {
        let fused = fuse(&[], &[], 0.5);
        assert!(fused.is_empty());
    }

    #[test]
    fn document_in_both_sums_contributions() {
        let lexical = vec![hit("doc1")];
        let semantic = vec![hit("doc1")];
        let fused = fuse(&lexical, &semantic, 0.5);
        assert_eq!(fused.len(), 1);
        let expected = 0.5 / (RRF_K + 1.0) + 0.5 / (RRF_K + 1.0);
        assert!((fused[0].score - expected).abs() < 1e-12);
        assert!(fused[0].from_lexical && fused[0].from_semantic);
    }

    #[test]
    fn pagination_slices_after_fusion() {
        let lexical = vec![hit("a"), hit("b"), hit("c"), hit("d")];
        let fused = fuse(&lexical, &[], 0.0);
        let page = paginate(fused, 1, 2);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].document_id, "b");
    }

    #[test]
    fn rrf_monotonicity_semantic_side() {
        // doc A ranks better on the semantic side only; doc B ranks better on
        // the lexical side only. As semantic_weight increases 0 -> 1, A's
        // score relative to B must never decrease.
        let lexical = vec![hit("b"), hit("a")];
        let semantic = vec![hit("a"), hit("b")];
        let mut prev_diff = f64::NEG_INFINITY;
        for step in 0..=10 {
            let w = step as f64 / 10.0;
            let fused = fuse(&lexical, &semantic, w);
            let score = |id: &str| fused.iter().find(|h| h.document_id == id).unwrap().score;
            let diff = score("a") - score("b");
            assert!(diff >= prev_diff - 1e-12);
            prev_diff = diff;
        }
    }
}
