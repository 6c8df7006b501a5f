//! Axum application state: generalizes the teacher's `AppContext` (in the
//! deleted `server/src/types.rs`) from a single `Arc<RwLock<ServerState>>`
//! plus a JSON cache into the full set of shared collaborators an ingestion
//! + retrieval service needs.

use crate::clients::{embedding::EmbeddingClient, lexical::LexicalClient, llm::LlmClient, vector::VectorClient};
use crate::config::Config;
use crate::extract::ExtractorRegistry;
use crate::metrics::Metrics;
use crate::progress::ProgressBus;
use archon_core::chat_session::ChatSessionCache;
use archon_core::ratelimit::SlidingWindow;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: PgPool,
    pub lexical: Arc<LexicalClient>,
    pub vector: Arc<VectorClient>,
    pub embedding: Arc<EmbeddingClient>,
    pub llm: Arc<LlmClient>,
    pub progress: Arc<ProgressBus>,
    /// Chat sessions, guarded by one mutex held only for insert/lookup/
    /// eviction (spec §5), never across generation.
    pub chat_sessions: Arc<Mutex<ChatSessionCache>>,
    /// In-process rate-limiter fallback, keyed by client id then by limiter
    /// name (so "chat" and "document_ai" don't share a budget).
    pub rate_limit_fallback: Arc<DashMap<(String, String), SlidingWindow>>,
    pub redis: Option<redis::aio::ConnectionManager>,
    pub started_at: std::time::Instant,
    pub extractors: Arc<ExtractorRegistry>,
    /// Cancellation token per running scan — the one "task_handle" a scan
    /// owns while `running` (data model §3). `POST /scan/{id}/cancel`
    /// triggers it; the orchestrator observes it between files (spec §5).
    pub scan_tasks: Arc<DashMap<i64, CancellationToken>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .connect(&config.database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&db).await?;

        let redis = match redis::Client::open(config.broker_url.clone()) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(mgr) => Some(mgr),
                Err(e) => {
                    tracing::warn!(error = %e, "broker unreachable at startup, falling back to in-process state");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "invalid broker url, falling back to in-process state");
                None
            }
        };

        let http = reqwest::Client::builder().build()?;
        let config = Arc::new(config);

        Ok(AppState {
            lexical: Arc::new(LexicalClient::new(http.clone(), config.lexical_engine_url.clone())),
            vector: Arc::new(VectorClient::new(http.clone(), config.vector_engine_url.clone(), config.embedding_dimension)),
            embedding: Arc::new(EmbeddingClient::new(http.clone(), config.clone())),
            llm: Arc::new(LlmClient::new(http, config.clone())),
            progress: Arc::new(ProgressBus::new()),
            chat_sessions: Arc::new(Mutex::new(ChatSessionCache::new(config.chat_session_ttl(), config.chat_session_max))),
            rate_limit_fallback: Arc::new(DashMap::new()),
            redis,
            started_at: std::time::Instant::now(),
            extractors: Arc::new(ExtractorRegistry::new()),
            scan_tasks: Arc::new(DashMap::new()),
            metrics: Arc::new(Metrics::new()),
            config,
            db,
        })
    }
}
