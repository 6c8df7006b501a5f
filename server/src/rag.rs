//! RAG Chat Engine + Reranker (C12 §4.12), grounded on
//! `original_source/backend/app/services/ai_chat.py`: per-session history,
//! MMR-diversified context retrieval, optional LLM reranking, a two-locale
//! system prompt table, and streaming/non-streaming generation.

use crate::clients::llm::Passage;
use crate::clients::vector::VectorSearchOptions;
use crate::state::AppState;
use archon_core::chat_session::DEFAULT_SESSION_ID;
use archon_core::model::ChatRole;
use futures::Stream;
use serde::Serialize;

const MAX_HISTORY_TURNS: usize = 10;
const CONTEXT_SNIPPET_CHARS: usize = 500;
const MMR_LAMBDA: f64 = 0.68;
const MMR_CANDIDATE_MULTIPLIER: usize = 18;
const MMR_MIN_SCORE: f64 = 0.25;

const SYSTEM_PROMPT_FR: &str = "Tu es un assistant d'investigation numérique expert. Tu aides les enquêteurs à analyser des documents et à trouver des informations pertinentes.\n\nRègles importantes:\n1. Base TOUJOURS tes réponses sur les documents fournis comme contexte\n2. Si tu n'as pas assez d'informations dans le contexte, dis-le clairement\n3. Cite les documents sources quand tu mentionnes des informations spécifiques\n4. Sois précis et factuel, évite les spéculations\n5. Réponds en français\n6. Si on te demande de résumer, sois concis mais complet\n7. Si les documents fournis sont insuffisants, réponds EXACTEMENT: \"Je n'ai pas trouvé cette information dans les documents.\"\n\nFormat de citation: [Document: nom_du_fichier]";

const SYSTEM_PROMPT_EN: &str = "You are an expert digital investigation assistant. You help investigators analyze documents and find relevant information.\n\nImportant rules:\n1. ALWAYS base your answers on the documents provided as context\n2. If you don't have enough information in the context, say so clearly\n3. Cite source documents when you mention specific information\n4. Be precise and factual, avoid speculation\n5. Answer in English\n6. If asked to summarize, be concise but comprehensive\n7. If the provided documents are insufficient, answer EXACTLY: \"I could not find this information in the documents.\"\n\nCitation format: [Document: file_name]";

const NO_CONTEXT_FR: &str = "Je n'ai pas trouvé cette information dans les documents.";
const NO_CONTEXT_EN: &str = "I could not find this information in the documents.";

/// Unknown/unset locale falls back to French, matching the source service's
/// default; `locale: "en"` selects the English prompt.
fn system_prompt(locale: &str) -> &'static str {
    if locale == "en" {
        SYSTEM_PROMPT_EN
    } else {
        SYSTEM_PROMPT_FR
    }
}

fn no_context_response(locale: &str) -> &'static str {
    if locale == "en" {
        NO_CONTEXT_EN
    } else {
        NO_CONTEXT_FR
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatContext {
    pub document_id: String,
    pub file_name: String,
    pub snippet: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    pub use_rag: bool,
    pub context_limit: usize,
    pub include_history: bool,
    pub locale: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub contexts: Vec<ChatContext>,
    pub message_count: usize,
    pub rag_enabled: bool,
}

struct Assembled {
    prompt: String,
    contexts: Vec<ChatContext>,
    short_circuit: Option<String>,
}

/// Steps 1-4 of spec §4.12: append the user message, optionally retrieve
/// and rerank context, and assemble the final prompt. Shared by the
/// streaming and non-streaming entry points.
async fn assemble(state: &AppState, req: &ChatRequest) -> anyhow::Result<Assembled> {
    let now = std::time::Instant::now();
    let history_snapshot = {
        let mut sessions = state.chat_sessions.lock().expect("chat session mutex poisoned");
        let session = sessions.get_or_create(&req.session_id, now);
        session.push(ChatRole::User, req.message.clone());
        if req.include_history {
            session.last_turns(MAX_HISTORY_TURNS).to_vec()
        } else {
            Vec::new()
        }
    };

    let contexts = if req.use_rag {
        retrieve_context(state, &req.message, req.context_limit).await
    } else {
        Vec::new()
    };

    if req.use_rag && contexts.is_empty() {
        return Ok(Assembled { prompt: String::new(), contexts, short_circuit: Some(no_context_response(&req.locale).to_string()) });
    }

    let mut prompt = String::new();
    prompt.push_str(system_prompt(&req.locale));
    prompt.push_str("\n\n");

    if !history_snapshot.is_empty() {
        prompt.push_str(if req.locale == "en" { "CONVERSATION HISTORY:\n" } else { "HISTORIQUE DE CONVERSATION:\n" });
        for msg in history_snapshot.iter().rev().skip(1).rev() {
            let label = match msg.role {
                ChatRole::User => {
                    if req.locale == "en" {
                        "User"
                    } else {
                        "Utilisateur"
                    }
                }
                ChatRole::Assistant => "Assistant",
            };
            let truncated: String = msg.content.chars().take(CONTEXT_SNIPPET_CHARS).collect();
            prompt.push_str(&format!("{label}: {truncated}\n"));
        }
        prompt.push('\n');
    }

    if req.use_rag {
        prompt.push_str(if req.locale == "en" { "REFERENCE DOCUMENTS:\n" } else { "DOCUMENTS DE RÉFÉRENCE:\n" });
        for (i, ctx) in contexts.iter().enumerate() {
            prompt.push_str(&format!("\n--- Document {}: {} (relevance: {:.2}) ---\n", i + 1, ctx.file_name, ctx.relevance_score));
            prompt.push_str(&ctx.snippet);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str(&req.message);

    Ok(Assembled { prompt, contexts, short_circuit: None })
}

/// C5.embed_query -> C6.search with MMR diversification, then an optional
/// rerank pass, truncated to `top_k_out` (spec §4.12 steps 2-3).
async fn retrieve_context(state: &AppState, query: &str, context_limit: usize) -> Vec<ChatContext> {
    if !state.config.embeddings_configured() {
        return Vec::new();
    }

    let rerank_enabled = state.config.rag_rerank_enabled;
    let retrieval_limit = if rerank_enabled { context_limit.max(state.config.rag_rerank_top_n) } else { context_limit };

    let query_vector = match state.embedding.embed_query(query).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed, returning no context");
            return Vec::new();
        }
    };

    let opts = VectorSearchOptions {
        k: retrieval_limit,
        use_mmr: true,
        lambda: MMR_LAMBDA,
        candidate_multiplier: Some(MMR_CANDIDATE_MULTIPLIER),
        min_score: Some(MMR_MIN_SCORE),
        ..Default::default()
    };
    let hits = match state.vector.search(&query_vector, &opts).await {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!(error = %e, "context retrieval failed, returning no context");
            return Vec::new();
        }
    };

    let mut contexts: Vec<ChatContext> = hits
        .into_iter()
        .map(|h| ChatContext {
            document_id: h.document_id,
            file_name: h.file_name,
            snippet: h.chunk_text,
            relevance_score: h.score,
        })
        .collect();

    if rerank_enabled && contexts.len() >= 2 {
        let passages: Vec<Passage> =
            contexts.iter().map(|c| Passage { id: c.document_id.clone(), text: format!("{}\n{}", c.file_name, c.snippet) }).collect();
        let scores = state.llm.rerank(query, &passages).await;
        if !scores.is_empty() {
            // Missing ids keep their pre-rerank rank order (stable sort on
            // the existing position when no score is present).
            let mut indexed: Vec<(usize, ChatContext)> = contexts.into_iter().enumerate().collect();
            indexed.sort_by(|(ia, a), (ib, b)| {
                let sa = scores.get(&a.document_id).copied();
                let sb = scores.get(&b.document_id).copied();
                match (sa, sb) {
                    (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => ia.cmp(ib),
                }
            });
            contexts = indexed
                .into_iter()
                .map(|(_, mut c)| {
                    if let Some(&score) = scores.get(&c.document_id) {
                        c.relevance_score = score;
                    }
                    c
                })
                .collect();
        }
        let top_k_out = context_limit.min(state.config.rag_rerank_top_k_out.max(1));
        contexts.truncate(top_k_out);
    } else {
        contexts.truncate(context_limit);
    }

    for ctx in &mut contexts {
        if ctx.snippet.chars().count() > CONTEXT_SNIPPET_CHARS {
            ctx.snippet = ctx.snippet.chars().take(CONTEXT_SNIPPET_CHARS).collect::<String>() + "...";
        }
    }

    contexts
}

/// Non-streaming path: generate the full response text, append it to the
/// session, and return it alongside the context list (spec §4.12 step 5).
pub async fn chat(state: &AppState, req: ChatRequest) -> anyhow::Result<ChatResponse> {
    let assembled = assemble(state, &req).await?;
    let (response, message_count) = if let Some(fixed) = assembled.short_circuit {
        let count = append_assistant_reply(state, &req.session_id, &fixed);
        (fixed, count)
    } else {
        let text = state.llm.generate(&assembled.prompt).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "generation failed");
            no_context_response(&req.locale).to_string()
        });
        let count = append_assistant_reply(state, &req.session_id, &text);
        (text, count)
    };

    Ok(ChatResponse { response, contexts: assembled.contexts, message_count, rag_enabled: req.use_rag })
}

/// Streaming path: yields `ChatStreamEvent::Token` deltas as they arrive,
/// then one final `ChatStreamEvent::Done` carrying the context list, after
/// appending the accumulated text to the session.
pub enum ChatStreamEvent {
    Token(String),
    Done { contexts: Vec<ChatContext>, message_count: usize },
}

pub async fn chat_stream(state: AppState, req: ChatRequest) -> anyhow::Result<impl Stream<Item = ChatStreamEvent>> {
    let assembled = assemble(&state, &req).await?;

    if let Some(fixed) = assembled.short_circuit {
        let message_count = append_assistant_reply(&state, &req.session_id, &fixed);
        let events =
            vec![ChatStreamEvent::Token(fixed), ChatStreamEvent::Done { contexts: assembled.contexts, message_count }];
        return Ok(futures::stream::iter(events).left_stream());
    }

    let token_stream = state.llm.generate_stream(&assembled.prompt).await?;
    let session_id = req.session_id.clone();
    let accumulated = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
    let accumulated_for_tail = accumulated.clone();

    use futures::StreamExt;
    let mapped = token_stream.filter_map({
        let accumulated = accumulated.clone();
        move |item| {
            let accumulated = accumulated.clone();
            async move {
                match item {
                    Ok(text) => {
                        accumulated.lock().expect("accumulated text mutex poisoned").push_str(&text);
                        Some(ChatStreamEvent::Token(text))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "streamed generation chunk failed");
                        None
                    }
                }
            }
        }
    });

    let tail = futures::stream::once(async move {
        let full_text = accumulated_for_tail.lock().expect("accumulated text mutex poisoned").clone();
        let message_count = append_assistant_reply(&state, &session_id, &full_text);
        ChatStreamEvent::Done { contexts: assembled.contexts, message_count }
    });

    Ok(mapped.chain(tail).right_stream())
}

fn append_assistant_reply(state: &AppState, session_id: &str, text: &str) -> usize {
    let mut sessions = state.chat_sessions.lock().expect("chat session mutex poisoned");
    let session = sessions.get_or_create(session_id, std::time::Instant::now());
    session.push(ChatRole::Assistant, text.to_string());
    session.messages.len()
}

pub fn session_id_or_default(header_value: Option<&str>) -> String {
    header_value.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SESSION_ID).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_locale_falls_back_to_french() {
        assert_eq!(system_prompt("de"), SYSTEM_PROMPT_FR);
        assert_eq!(system_prompt("en"), SYSTEM_PROMPT_EN);
    }

    #[test]
    fn session_header_defaults_when_absent() {
        assert_eq!(session_id_or_default(None), DEFAULT_SESSION_ID);
        assert_eq!(session_id_or_default(Some("")), DEFAULT_SESSION_ID);
        assert_eq!(session_id_or_default(Some("abc")), "abc");
    }

    #[test]
    fn no_context_response_matches_locale() {
        assert_eq!(no_context_response("en"), NO_CONTEXT_EN);
        assert_eq!(no_context_response("fr"), NO_CONTEXT_FR);
    }
}
