//! Embedding Client (C5 §4.4), grounded on
//! `original_source/backend/app/services/embeddings.py`: Gemini-shaped
//! `embedContent` calls with a task type, batched with per-item failure
//! isolation.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

impl TaskType {
    fn as_str(self) -> &'static str {
        match self {
            TaskType::RetrievalDocument => "retrieval_document",
            TaskType::RetrievalQuery => "retrieval_query",
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    task_type: &'a str,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    config: Arc<Config>,
    model: &'static str,
}

impl EmbeddingClient {
    pub fn new(http: reqwest::Client, config: Arc<Config>) -> Self {
        Self { http, config, model: "gemini-embedding-001" }
    }

    pub fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    async fn embed_one(&self, text: &str, task_type: TaskType) -> anyhow::Result<Vec<f32>> {
        if !self.config.embeddings_configured() {
            anyhow::bail!("embedding credential not configured");
        }
        let url = format!(
            "{}/v1beta/models/{}:embedContent?key={}",
            self.config.embedding_base_url, self.model, self.config.gemini_api_key
        );
        let body = EmbedRequest {
            model: self.model,
            content: EmbedContent { parts: vec![EmbedPart { text }] },
            task_type: task_type.as_str(),
        };
        let resp = self.http.post(url).json(&body).send().await?.error_for_status()?;
        let parsed: EmbedResponse = resp.json().await?;
        Ok(parsed.embedding.values)
    }

    pub async fn embed_document(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_one(text, TaskType::RetrievalDocument).await
    }

    pub async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_one(text, TaskType::RetrievalQuery).await
    }

    /// Embed a batch with per-item failure isolation: a failing item becomes
    /// a zero vector at its original index rather than aborting the batch
    /// (spec §4.4).
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let dim = self.dimension();
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            match self.embed_document(text).await {
                Ok(v) => out.push(v),
                Err(e) => {
                    tracing::warn!(error = %e, "embedding item failed, using zero vector");
                    out.push(vec![0.0; dim]);
                }
            }
        }
        out
    }

    pub fn chunk(&self, text: &str) -> Vec<archon_core::chunking::Chunk> {
        archon_core::chunking::chunk(text, self.config.chunk_size_tokens, self.config.chunk_overlap_tokens)
    }
}
