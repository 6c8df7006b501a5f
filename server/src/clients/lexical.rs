//! Lexical Index Adapter (C7 §4.6), grounded on
//! `original_source/backend/app/services/meilisearch.py`: index settings,
//! filter-string assembly (delegating escaping/validation to
//! `archon_core::lexical_filter`), and the search/index/delete contract.

use archon_core::lexical_filter::{and_all, int_in_group, or_group, starts_with_clause, validate_scan_ids};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub struct LexicalClient {
    http: reqwest::Client,
    base_url: String,
    index_uid: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct LexicalDocument {
    pub id: String,
    pub document_id: String,
    pub scan_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub text_content: String,
    pub file_modified_at: String,
    pub indexed_at: String,
    pub file_size: i64,
}

#[derive(Debug, Clone, Default)]
pub struct LexicalSearchParams {
    pub limit: usize,
    pub offset: usize,
    pub file_types: Vec<String>,
    pub scan_ids: Vec<String>,
    pub project_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LexicalHit {
    pub id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub scan_id: String,
    #[serde(rename = "_formatted")]
    pub formatted: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct LexicalSearchResult {
    pub hits: Vec<(LexicalHit, String, Vec<String>)>, // (hit, snippet, match positions / highlight fragments)
    pub estimated_total_hits: u64,
    pub processing_time_ms: u64,
}

#[derive(Deserialize)]
struct MeiliSearchResponse {
    hits: Vec<LexicalHit>,
    #[serde(rename = "estimatedTotalHits")]
    estimated_total_hits: u64,
    #[serde(rename = "processingTimeMs")]
    processing_time_ms: u64,
}

impl LexicalClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url, index_uid: "archon_documents" }
    }

    /// Lightweight reachability probe for `GET /health` (§2: "degraded-mode
    /// flags for the lexical/vector engines").
    pub async fn health(&self) -> bool {
        self.http.get(format!("{}/health", self.base_url)).send().await.map(|r| r.status().is_success()).unwrap_or(false)
    }

    /// Idempotent index settings push (spec §4.6): searchable/filterable/
    /// sortable attributes, highlight tags, crop length.
    pub async fn ensure_settings(&self) -> anyhow::Result<()> {
        let url = format!("{}/indexes/{}/settings", self.base_url, self.index_uid);
        let body = json!({
            "searchableAttributes": ["text_content", "file_name", "file_path"],
            "filterableAttributes": ["file_type", "scan_id", "file_modified_at", "file_path"],
            "sortableAttributes": ["file_modified_at", "indexed_at", "file_size"],
        });
        self.http.patch(url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn index(&self, doc: &LexicalDocument) -> anyhow::Result<()> {
        let url = format!("{}/indexes/{}/documents", self.base_url, self.index_uid);
        self.http.post(url).json(&[doc]).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn delete(&self, doc_id: &str) -> anyhow::Result<()> {
        let url = format!("{}/indexes/{}/documents/{}", self.base_url, self.index_uid, doc_id);
        self.http.delete(url).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn delete_by_scan(&self, scan_id: &str) -> anyhow::Result<()> {
        let filter = int_in_group("scan_id", &[scan_id.parse().unwrap_or_default()]);
        let url = format!("{}/indexes/{}/documents/delete", self.base_url, self.index_uid);
        self.http.post(url).json(&json!({ "filter": filter })).send().await?.error_for_status()?;
        Ok(())
    }

    /// Build the AND-combined filter expression for a search request,
    /// rejecting non-integer `scan_ids` values up front (filter-injection
    /// defense, spec §4.6 / §8 scenario 3).
    pub fn build_filter(params: &LexicalSearchParams) -> Result<Option<String>, String> {
        let scan_ids = validate_scan_ids(&params.scan_ids).map_err(|e| format!("invalid scan_id filter value: {}", e.0))?;
        let clauses = [
            or_group("file_type", &params.file_types),
            int_in_group("scan_id", &scan_ids),
            params.project_path.as_deref().map(|p| starts_with_clause("file_path", p)),
        ];
        Ok(and_all(clauses))
    }

    pub async fn search(&self, query: &str, params: &LexicalSearchParams) -> anyhow::Result<LexicalSearchResult> {
        let filter = Self::build_filter(params).map_err(anyhow::Error::msg)?;
        let url = format!("{}/indexes/{}/search", self.base_url, self.index_uid);
        let body = json!({
            "q": query,
            "limit": params.limit,
            "offset": params.offset,
            "filter": filter,
            "attributesToHighlight": ["text_content", "file_name"],
            "highlightPreTag": "<mark>",
            "highlightPostTag": "</mark>",
            "attributesToCrop": ["text_content"],
            "cropLength": 200,
        });
        let resp: MeiliSearchResponse = self.http.post(url).json(&body).send().await?.error_for_status()?.json().await?;

        let hits = resp
            .hits
            .into_iter()
            .map(|hit| {
                let snippet = hit
                    .formatted
                    .as_ref()
                    .and_then(|f| f.get("text_content"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let highlights = if snippet.contains("<mark>") { vec![snippet.clone()] } else { Vec::new() };
                (hit, snippet, highlights)
            })
            .collect();

        Ok(LexicalSearchResult {
            hits,
            estimated_total_hits: resp.estimated_total_hits,
            processing_time_ms: resp.processing_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_injection_attempt_is_rejected() {
        let params = LexicalSearchParams {
            limit: 10,
            offset: 0,
            file_types: vec!["pdf\" OR scan_id = 999".to_string()],
            scan_ids: Vec::new(),
            project_path: None,
        };
        // file_types is string-valued and escaped rather than rejected; the
        // rejection applies to scan_ids specifically per spec §4.6.
        let built = LexicalClient::build_filter(&params).unwrap();
        assert!(built.unwrap().contains("\\\""));
    }

    #[test]
    fn non_integer_scan_id_is_rejected() {
        let params = LexicalSearchParams {
            limit: 10,
            offset: 0,
            file_types: Vec::new(),
            scan_ids: vec!["1".to_string(), "2\" OR 1=1".to_string()],
            project_path: None,
        };
        assert!(LexicalClient::build_filter(&params).is_err());
    }

    #[test]
    fn project_path_builds_starts_with_clause() {
        let params = LexicalSearchParams {
            limit: 10,
            offset: 0,
            file_types: Vec::new(),
            scan_ids: Vec::new(),
            project_path: Some("/evidence".to_string()),
        };
        let built = LexicalClient::build_filter(&params).unwrap().unwrap();
        assert!(built.contains("STARTS WITH"));
    }
}
