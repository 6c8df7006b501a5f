//! Maximal Marginal Relevance re-selection and per-document dedup for the
//! Vector Index Adapter (C6 §4.5), ported from the selection logic in
//! `original_source/backend/app/services/qdrant.py`.

#[derive(Debug, Clone)]
pub struct Candidate {
    pub document_id: String,
    pub chunk_index: usize,
    pub score: f64,
    pub vector: Option<Vec<f32>>,
}

/// Keep only the highest-scoring chunk per `document_id`, preserving the
/// relative order of first appearance among the kept items by score.
pub fn dedup_by_document(candidates: Vec<Candidate>) -> Vec<Candidate> {
    use std::collections::HashMap;
    let mut best: HashMap<String, Candidate> = HashMap::new();
    for c in candidates {
        best.entry(c.document_id.clone())
            .and_modify(|existing| {
                if c.score > existing.score {
                    *existing = c.clone();
                }
            })
            .or_insert(c);
    }
    let mut out: Vec<Candidate> = best.into_values().collect();
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Iteratively pick the candidate maximizing
/// `lambda * relevance - (1 - lambda) * max_similarity_to_already_picked`,
/// falling back to pure relevance order when vectors are unavailable.
/// Returns at most `k` picks, already deduplicated by document.
pub fn mmr_select(candidates: Vec<Candidate>, k: usize, lambda: f64) -> Vec<Candidate> {
    let pool = dedup_by_document(candidates);
    if pool.is_empty() || k == 0 {
        return Vec::new();
    }

    if pool.iter().any(|c| c.vector.is_none()) {
        return pool.into_iter().take(k).collect();
    }

    let mut remaining: Vec<Candidate> = pool;
    let mut picked: Vec<Candidate> = Vec::new();

    // First pick is always the argmax of relevance (spec §8 MMR property).
    remaining.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    picked.push(remaining.remove(0));

    while picked.len() < k && !remaining.is_empty() {
        let mut best_idx = 0usize;
        let mut best_value = f64::NEG_INFINITY;
        for (idx, cand) in remaining.iter().enumerate() {
            let max_sim = picked
                .iter()
                .map(|p| cosine_similarity(cand.vector.as_ref().unwrap(), p.vector.as_ref().unwrap()))
                .fold(f64::NEG_INFINITY, f64::max);
            let max_sim = if max_sim.is_finite() { max_sim } else { 0.0 };
            let value = lambda * cand.score - (1.0 - lambda) * max_sim;
            if value > best_value {
                best_value = value;
                best_idx = idx;
            }
        }
        picked.push(remaining.remove(best_idx));
    }

    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: &str, score: f64, vector: Vec<f32>) -> Candidate {
        Candidate { document_id: id.to_string(), chunk_index: 0, score, vector: Some(vector) }
    }

    #[test]
    fn dedup_keeps_highest_scoring_chunk() {
        let candidates = vec![
            Candidate { document_id: "d1".into(), chunk_index: 0, score: 0.2, vector: None },
            Candidate { document_id: "d1".into(), chunk_index: 1, score: 0.9, vector: None },
            Candidate { document_id: "d2".into(), chunk_index: 0, score: 0.5, vector: None },
        ];
        let out = dedup_by_document(candidates);
        assert_eq!(out.len(), 2);
        let d1 = out.iter().find(|c| c.document_id == "d1").unwrap();
        assert_eq!(d1.chunk_index, 1);
    }

    #[test]
    fn first_pick_is_argmax_relevance() {
        let candidates = vec![
            cand("a", 0.5, vec![1.0, 0.0]),
            cand("b", 0.9, vec![0.0, 1.0]),
            cand("c", 0.3, vec![1.0, 1.0]),
        ];
        let picked = mmr_select(candidates, 3, 0.5);
        assert_eq!(picked[0].document_id, "b");
    }

    #[test]
    fn high_lambda_prefers_near_duplicate_low_lambda_prefers_diverse() {
        let candidates = vec![
            cand("top", 0.9, vec![1.0, 0.0]),
            cand("near_dup", 0.85, vec![0.99, 0.01]),
            cand("diverse", 0.6, vec![0.0, 1.0]),
        ];

        let high_lambda = mmr_select(candidates.clone(), 2, 0.95);
        assert_eq!(high_lambda[1].document_id, "near_dup");

        let low_lambda = mmr_select(candidates, 2, 0.05);
        assert_eq!(low_lambda[1].document_id, "diverse");
    }

    #[test]
    fn missing_vectors_fall_back_to_relevance_order() {
        let candidates = vec![
            Candidate { document_id: "a".into(), chunk_index: 0, score: 0.9, vector: None },
            Candidate { document_id: "b".into(), chunk_index: 0, score: 0.5, vector: Some(vec![1.0]) },
        ];
        let picked = mmr_select(candidates, 2, 0.5);
        assert_eq!(picked[0].document_id, "a");
    }

    #[test]
    fn final_result_size_is_min_k_candidates() {
        let candidates = vec![cand("a", 0.9, vec![1.0]), cand("b", 0.5, vec![0.5])];
        let picked = mmr_select(candidates, 10, 0.5);
        assert_eq!(picked.len(), 2);
    }
}
