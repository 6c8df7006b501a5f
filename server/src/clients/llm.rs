//! LLM generation + reranker client (C12 §4.12), grounded on
//! `original_source/backend/app/services/reranker.py`: JSON-mode rerank
//! call with lenient JSON-in-prose extraction and score clamping, plus
//! streaming/non-streaming text generation.

use crate::config::Config;
use futures::Stream;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub const MAX_CHARS_PER_PASSAGE: usize = 900;

pub struct LlmClient {
    http: reqwest::Client,
    config: Arc<Config>,
}

#[derive(Debug, Clone)]
pub struct Passage {
    pub id: String,
    pub text: String,
}

fn json_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

/// Tolerate a JSON object embedded in prose: find the first `{...}` span and
/// try to parse it, falling back to `None` on any failure.
fn extract_json_block(raw: &str) -> Option<Value> {
    if let Ok(direct) = serde_json::from_str::<Value>(raw.trim()) {
        return Some(direct);
    }
    let m = json_block_regex().find(raw)?;
    serde_json::from_str(m.as_str()).ok()
}

impl LlmClient {
    pub fn new(http: reqwest::Client, config: Arc<Config>) -> Self {
        Self { http, config }
    }

    /// Non-streaming generation. Returns the full text.
    pub async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.llm_base_url, self.config.rag_rerank_model, self.config.gemini_api_key
        );
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let resp: Value = self.http.post(url).json(&body).send().await?.error_for_status()?.json().await?;
        Ok(resp["candidates"][0]["content"]["parts"][0]["text"].as_str().unwrap_or_default().to_string())
    }

    /// Streaming generation: each item is one text delta as it arrives over
    /// the model's SSE endpoint (spec §4.12 step 5, "emit tokens as they
    /// arrive").
    pub async fn generate_stream(&self, prompt: &str) -> anyhow::Result<impl Stream<Item = anyhow::Result<String>>> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.config.llm_base_url, self.config.rag_rerank_model, self.config.gemini_api_key
        );
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let resp = self.http.post(url).json(&body).send().await?.error_for_status()?;
        Ok(sse_text_deltas(resp))
    }

    /// Rerank `passages` against `query`, truncating each to
    /// `MAX_CHARS_PER_PASSAGE`. On any parse failure, returns an empty map
    /// so the caller falls back to the pre-rerank order (spec §4.12).
    pub async fn rerank(&self, query: &str, passages: &[Passage]) -> HashMap<String, f64> {
        let truncated: Vec<Passage> = passages
            .iter()
            .map(|p| Passage { id: p.id.clone(), text: p.text.chars().take(MAX_CHARS_PER_PASSAGE).collect() })
            .collect();

        let prompt = build_rerank_prompt(query, &truncated);
        let raw = match self.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "reranker call failed, preserving retrieval order");
                return HashMap::new();
            }
        };
        parse_rerank_response(&raw)
    }
}

/// Turn a chunked SSE response body into a stream of text deltas, buffering
/// partial events across reads and extracting `candidates[0].content.parts[
/// 0].text` from each `data: {...}` line.
fn sse_text_deltas(resp: reqwest::Response) -> impl Stream<Item = anyhow::Result<String>> {
    use futures::StreamExt;
    futures::stream::unfold((resp.bytes_stream(), String::new()), |(mut bytes, mut buf)| async move {
        loop {
            if let Some(pos) = buf.find("\n\n") {
                let event: String = buf.drain(..pos + 2).collect();
                if let Some(text) = parse_sse_event(&event) {
                    return Some((Ok(text), (bytes, buf)));
                }
                continue;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => buf.push_str(&String::from_utf8_lossy(&chunk)),
                Some(Err(e)) => return Some((Err(e.into()), (bytes, buf))),
                None => {
                    let event = std::mem::take(&mut buf);
                    return parse_sse_event(&event).map(|text| (Ok(text), (bytes, buf)));
                }
            }
        }
    })
}

fn parse_sse_event(event: &str) -> Option<String> {
    for line in event.lines() {
        let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else { continue };
        let Ok(value) = serde_json::from_str::<Value>(data.trim()) else { continue };
        if let Some(text) = value["candidates"][0]["content"]["parts"][0]["text"].as_str() {
            return Some(text.to_string());
        }
    }
    None
}

fn build_rerank_prompt(query: &str, passages: &[Passage]) -> String {
    let mut body = String::new();
    for p in passages {
        body.push_str(&format!("id={}: {}\n", p.id, p.text));
    }
    format!(
        "Query: {query}\n\nScore each passage's relevance to the query from 0 to 1. \
         Respond with strict JSON: {{\"scores\": {{\"<id>\": <score>, ...}}}}.\n\n{body}"
    )
}

/// Extract `{id -> score}` from the model's JSON-in-prose response,
/// clamping each score to `[0, 1]` and dropping NaN values.
fn parse_rerank_response(raw: &str) -> HashMap<String, f64> {
    let Some(value) = extract_json_block(raw) else { return HashMap::new() };
    let Some(scores) = value.get("scores").and_then(|s| s.as_object()) else { return HashMap::new() };

    scores
        .iter()
        .filter_map(|(id, score)| {
            let score = score.as_f64()?;
            if score.is_nan() {
                return None;
            }
            Some((id.clone(), score.clamp(0.0, 1.0)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let scores = parse_rerank_response(r#"{"scores": {"a": 0.9, "b": 0.1}}"#);
        assert_eq!(scores.get("a"), Some(&0.9));
    }

    #[test]
    fn tolerates_json_in_prose() {
        let raw = "Sure, here are the scores:\n{\"scores\": {\"a\": 0.7}}\nHope that helps!";
        let scores = parse_rerank_response(raw);
        assert_eq!(scores.get("a"), Some(&0.7));
    }

    #[test]
    fn clamps_out_of_range_scores() {
        let scores = parse_rerank_response(r#"{"scores": {"a": 1.5, "b": -0.2}}"#);
        assert_eq!(scores.get("a"), Some(&1.0));
        assert_eq!(scores.get("b"), Some(&0.0));
    }

    #[test]
    fn unparseable_response_yields_empty_map() {
        let scores = parse_rerank_response("not json at all, sorry");
        assert!(scores.is_empty());
    }

    #[test]
    fn nan_scores_are_dropped() {
        // NaN can't appear in valid JSON, but guard against adversarial
        // f64 values close to the boundary regardless.
        let scores = parse_rerank_response(r#"{"scores": {"a": 0.00000001}}"#);
        assert!(scores.get("a").unwrap() >= &0.0);
    }
}
