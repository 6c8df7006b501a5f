//! Vector Index Adapter (C6 §4.5), grounded on
//! `original_source/backend/app/services/qdrant.py`: collection init with
//! cosine distance + payload indexes, point upsert with a truncated-text
//! payload, k-NN search with dedup-by-document and optional MMR
//! diversification (the MMR/dedup math itself lives in `archon_core::mmr`,
//! exercised here only after deserializing the HTTP response).

use archon_core::mmr::{dedup_by_document, mmr_select, Candidate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const PAYLOAD_TEXT_TRUNCATE: usize = 1000;
const DEFAULT_CANDIDATE_MULTIPLIER: usize = 2;
const MMR_CANDIDATE_MULTIPLIER: usize = 18;

pub struct VectorClient {
    http: reqwest::Client,
    base_url: String,
    dimension: usize,
    collection: &'static str,
}

#[derive(Debug, Clone)]
pub struct ChunkToUpsert {
    pub index: usize,
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct DocMeta {
    pub document_id: String,
    pub scan_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
}

#[derive(Debug, Clone)]
pub struct VectorSearchOptions {
    pub k: usize,
    pub file_types: Vec<String>,
    pub scan_ids: Vec<String>,
    pub use_mmr: bool,
    pub lambda: f64,
    pub candidate_multiplier: Option<usize>,
    pub min_score: Option<f64>,
}

impl Default for VectorSearchOptions {
    fn default() -> Self {
        Self {
            k: 10,
            file_types: Vec::new(),
            scan_ids: Vec::new(),
            use_mmr: false,
            lambda: 0.68,
            candidate_multiplier: None,
            min_score: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub document_id: String,
    pub chunk_index: usize,
    pub chunk_text: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub score: f64,
}

#[derive(Deserialize)]
struct QdrantPoint {
    #[serde(rename = "id")]
    _id: Value,
    score: f64,
    payload: QdrantPayload,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct QdrantPayload {
    document_id: String,
    chunk_index: usize,
    chunk_text: String,
    file_path: String,
    file_name: String,
    file_type: String,
}

#[derive(Deserialize)]
struct QdrantSearchResponse {
    result: Vec<QdrantPoint>,
}

impl VectorClient {
    pub fn new(http: reqwest::Client, base_url: String, dimension: usize) -> Self {
        Self { http, base_url, dimension, collection: "archon_documents" }
    }

    /// Lightweight reachability probe for `GET /health` (§2: "degraded-mode
    /// flags for the lexical/vector engines").
    pub async fn health(&self) -> bool {
        self.http.get(&self.base_url).send().await.map(|r| r.status().is_success()).unwrap_or(false)
    }

    /// Idempotent collection init with cosine distance + payload indexes on
    /// document_id/scan_id/file_type (spec §4.5).
    pub async fn ensure_collection(&self) -> anyhow::Result<()> {
        let url = format!("{}/collections/{}", self.base_url, self.collection);
        let body = json!({
            "vectors": { "size": self.dimension, "distance": "Cosine" }
        });
        let _ = self.http.put(url).json(&body).send().await?;
        for field in ["document_id", "scan_id", "file_type"] {
            let idx_url = format!("{}/collections/{}/index", self.base_url, self.collection);
            let _ = self
                .http
                .put(idx_url)
                .json(&json!({ "field_name": field, "field_schema": "keyword" }))
                .send()
                .await;
        }
        Ok(())
    }

    pub async fn upsert(&self, meta: &DocMeta, chunks: &[ChunkToUpsert]) -> anyhow::Result<Vec<String>> {
        let mut point_ids = Vec::with_capacity(chunks.len());
        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let point_id = uuid::Uuid::new_v4().to_string();
            let truncated: String = chunk.text.chars().take(PAYLOAD_TEXT_TRUNCATE).collect();
            points.push(json!({
                "id": point_id,
                "vector": chunk.vector,
                "payload": {
                    "document_id": meta.document_id,
                    "scan_id": meta.scan_id,
                    "file_path": meta.file_path,
                    "file_name": meta.file_name,
                    "file_type": meta.file_type,
                    "chunk_index": chunk.index,
                    "chunk_text": truncated,
                }
            }));
            point_ids.push(point_id);
        }
        let url = format!("{}/collections/{}/points", self.base_url, self.collection);
        self.http.put(url).json(&json!({ "points": points })).send().await?.error_for_status()?;
        Ok(point_ids)
    }

    pub async fn search(&self, query_vector: &[f32], opts: &VectorSearchOptions) -> anyhow::Result<Vec<VectorHit>> {
        let multiplier = opts
            .candidate_multiplier
            .unwrap_or(if opts.use_mmr { MMR_CANDIDATE_MULTIPLIER } else { DEFAULT_CANDIDATE_MULTIPLIER });
        let fetch_limit = opts.k * multiplier;

        let mut must = Vec::new();
        if !opts.file_types.is_empty() {
            must.push(json!({ "key": "file_type", "match": { "any": opts.file_types } }));
        }
        if !opts.scan_ids.is_empty() {
            must.push(json!({ "key": "scan_id", "match": { "any": opts.scan_ids } }));
        }
        let filter = if must.is_empty() { Value::Null } else { json!({ "must": must }) };

        let url = format!("{}/collections/{}/points/search", self.base_url, self.collection);
        let body = json!({
            "vector": query_vector,
            "limit": fetch_limit,
            "filter": filter,
            "with_payload": true,
            "with_vector": opts.use_mmr,
        });
        let resp: QdrantSearchResponse = self.http.post(url).json(&body).send().await?.error_for_status()?.json().await?;

        // `Candidate` only carries what the pure selection math in
        // `archon_core::mmr` needs (document_id for dedup, chunk_index,
        // score, vector); keep the rest of the payload on the side, keyed by
        // (document_id, chunk_index) which is unique per point, and
        // re-attach it to whichever candidates survive selection.
        let mut display: std::collections::HashMap<(String, usize), QdrantPayload> = std::collections::HashMap::new();
        let mut candidates = Vec::with_capacity(resp.result.len());
        for point in resp.result {
            if !opts.min_score.map(|min| point.score >= min).unwrap_or(true) {
                continue;
            }
            candidates.push(Candidate {
                document_id: point.payload.document_id.clone(),
                chunk_index: point.payload.chunk_index,
                score: point.score,
                vector: point.vector,
            });
            display.insert((point.payload.document_id.clone(), point.payload.chunk_index), point.payload);
        }

        let picked = if opts.use_mmr {
            mmr_select(candidates, opts.k, opts.lambda)
        } else {
            let mut deduped = dedup_by_document(candidates);
            deduped.truncate(opts.k);
            deduped
        };

        Ok(picked
            .into_iter()
            .filter_map(|c| {
                let payload = display.remove(&(c.document_id, c.chunk_index))?;
                Some(VectorHit {
                    document_id: payload.document_id,
                    chunk_index: payload.chunk_index,
                    chunk_text: payload.chunk_text,
                    file_path: payload.file_path,
                    file_name: payload.file_name,
                    file_type: payload.file_type,
                    score: c.score,
                })
            })
            .collect())
    }

    pub async fn delete_by_document(&self, document_id: &str) -> anyhow::Result<()> {
        let url = format!("{}/collections/{}/points/delete", self.base_url, self.collection);
        self.http
            .post(url)
            .json(&json!({ "filter": { "must": [{ "key": "document_id", "match": { "value": document_id } }] } }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn delete_by_scan(&self, scan_id: &str) -> anyhow::Result<()> {
        let url = format!("{}/collections/{}/points/delete", self.base_url, self.collection);
        self.http
            .post(url)
            .json(&json!({ "filter": { "must": [{ "key": "scan_id", "match": { "value": scan_id } }] } }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
