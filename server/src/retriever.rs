//! Hybrid Retriever I/O glue (C11 §4.10): calls the lexical/vector clients,
//! fuses with `archon_core::rrf`, and re-attaches display fields the pure
//! fusion function intentionally drops.

use crate::clients::lexical::LexicalSearchParams;
use crate::clients::vector::VectorSearchOptions;
use crate::state::AppState;
use archon_core::rrf::{fuse, paginate, RankedHit};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub score: f64,
    pub from_lexical: bool,
    pub from_semantic: bool,
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
    pub snippet: String,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub offset: usize,
    pub semantic_weight: f64,
    pub file_types: Vec<String>,
    pub scan_ids: Vec<String>,
}

pub async fn hybrid_search(state: &AppState, req: &SearchRequest) -> anyhow::Result<(Vec<SearchResult>, u64)> {
    let fetch_limit = req.limit * 2;

    let mut lexical_display: std::collections::HashMap<String, (String, String, String, String, Vec<String>)> =
        std::collections::HashMap::new();
    let mut lexical_ranked = Vec::new();
    let mut estimated_total = 0u64;

    if req.semantic_weight < 1.0 {
        let params = LexicalSearchParams {
            limit: fetch_limit,
            offset: 0,
            file_types: req.file_types.clone(),
            scan_ids: req.scan_ids.clone(),
            project_path: None,
        };
        match state.lexical.search(&req.query, &params).await {
            Ok(result) => {
                estimated_total = result.estimated_total_hits;
                for (hit, snippet, highlights) in result.hits {
                    lexical_ranked.push(RankedHit { document_id: hit.id.clone() });
                    lexical_display.insert(hit.id.clone(), (hit.file_path, hit.file_name, hit.file_type, snippet, highlights));
                }
            }
            Err(e) => tracing::warn!(error = %e, "lexical index unavailable, degrading to semantic-only"),
        }
    }

    let mut semantic_display: std::collections::HashMap<String, crate::clients::vector::VectorHit> = std::collections::HashMap::new();
    let mut semantic_ranked = Vec::new();

    if req.semantic_weight > 0.0 && state.config.embeddings_configured() {
        let semantic_result: anyhow::Result<Vec<crate::clients::vector::VectorHit>> = async {
            let query_vector = state.embedding.embed_query(&req.query).await?;
            let opts = VectorSearchOptions {
                k: fetch_limit,
                file_types: req.file_types.clone(),
                scan_ids: req.scan_ids.clone(),
                ..Default::default()
            };
            state.vector.search(&query_vector, &opts).await
        }
        .await;

        match semantic_result {
            Ok(hits) => {
                for hit in hits {
                    semantic_ranked.push(RankedHit { document_id: hit.document_id.clone() });
                    semantic_display.insert(hit.document_id.clone(), hit);
                }
            }
            Err(e) => tracing::warn!(error = %e, "vector index unavailable, degrading to lexical-only"),
        }
    }

    let fused = fuse(&lexical_ranked, &semantic_ranked, req.semantic_weight);
    let page = paginate(fused, req.offset, req.limit);

    let results = page
        .into_iter()
        .map(|hit| {
            if let Some((file_path, file_name, file_type, snippet, highlights)) = lexical_display.remove(&hit.document_id) {
                SearchResult {
                    document_id: hit.document_id,
                    file_path,
                    file_name,
                    file_type,
                    score: hit.score,
                    from_lexical: hit.from_lexical,
                    from_semantic: hit.from_semantic,
                    lexical_rank: hit.lexical_rank,
                    semantic_rank: hit.semantic_rank,
                    snippet,
                    highlights,
                }
            } else if let Some(vhit) = semantic_display.remove(&hit.document_id) {
                SearchResult {
                    document_id: hit.document_id,
                    file_path: vhit.file_path,
                    file_name: vhit.file_name,
                    file_type: vhit.file_type,
                    score: hit.score,
                    from_lexical: hit.from_lexical,
                    from_semantic: hit.from_semantic,
                    lexical_rank: hit.lexical_rank,
                    semantic_rank: hit.semantic_rank,
                    snippet: vhit.chunk_text.chars().take(200).collect(),
                    highlights: Vec::new(),
                }
            } else {
                SearchResult {
                    document_id: hit.document_id,
                    file_path: String::new(),
                    file_name: String::new(),
                    file_type: String::new(),
                    score: hit.score,
                    from_lexical: hit.from_lexical,
                    from_semantic: hit.from_semantic,
                    lexical_rank: hit.lexical_rank,
                    semantic_rank: hit.semantic_rank,
                    snippet: String::new(),
                    highlights: Vec::new(),
                }
            }
        })
        .collect();

    Ok((results, estimated_total))
}
