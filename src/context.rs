//! Composition root.
//!
//! Owns the process-wide handles: the Postgres pool, the graph driver, the
//! LLM client, and the lazily initialized shared embedding model. Built once
//! at startup, passed explicitly, closed on shutdown.

use std::sync::Arc;
use tracing::{info, warn};

use graph::GraphProjector;
use llm::{HttpLlmClient, LlmClient};
use semantic::{EmbeddingModel, HashEmbedder, HttpEmbedder, SharedEmbedder};
use sqlx::PgPool;

use crate::{PipelineConfig, PipelineError};

pub struct AppContext {
    pub config: PipelineConfig,
    pub pool: PgPool,
    pub graph: Option<Arc<neo4rs::Graph>>,
    pub llm: Arc<dyn LlmClient>,
    embedder: SharedEmbedder,
}

impl AppContext {
    /// Initialize every external handle from configuration.
    pub async fn init(config: PipelineConfig) -> Result<Self, PipelineError> {
        let pool = store::connect(&config.store.database_url, config.store.max_connections).await?;

        let graph = match &config.graph {
            Some(graph_config) => Some(GraphProjector::connect(graph_config).await?),
            None => {
                warn!("graph store not configured; projection and constraints disabled");
                None
            }
        };

        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::from_config(&config.llm)?);

        info!(
            database = %config.store.database_url,
            graph_configured = graph.is_some(),
            llm_model = %config.llm.model,
            "pipeline context initialized"
        );

        Ok(Self {
            config,
            pool,
            graph,
            llm,
            embedder: SharedEmbedder::new(),
        })
    }

    /// The process-wide embedding model, initialized on first use. With an
    /// endpoint configured this is the HTTP backend; otherwise the
    /// deterministic stub (offline runs and tests).
    pub fn embedder(&self) -> Arc<dyn EmbeddingModel> {
        self.embedder.get_or_init(|| {
            match HttpEmbedder::from_config(&self.config.semantic) {
                Ok(http) => {
                    info!(model = %self.config.semantic.model_name, "embedding backend: http");
                    Arc::new(http)
                }
                Err(_) => {
                    warn!("no embedding endpoint configured, using deterministic stub");
                    Arc::new(HashEmbedder::from_config(&self.config.semantic))
                }
            }
        })
    }

    /// Close long-lived drivers.
    pub async fn shutdown(self) {
        self.pool.close().await;
        info!("pipeline context shut down");
    }
}
