//! Workspace umbrella crate for docgraph.
//!
//! docgraph is a document-understanding pipeline for insurance artifacts:
//! section extraction, entity canonicalization, relationship synthesis,
//! vector + graph indexing, and a GraphRAG query layer over the result. The
//! `docgraph` crate re-exports the member crates so applications can drive
//! the pipeline through a single dependency, and provides the composition
//! root ([`AppContext`]), configuration ([`PipelineConfig`]), and the
//! [`Pipeline`] facade that wires stage logic into the orchestrator.
//!
//! ## Quick start
//!
//! ```ignore
//! use docgraph::{AppContext, Pipeline, PipelineConfig};
//! use retrieval::GraphRagRequest;
//!
//! # async fn demo() -> Result<(), docgraph::PipelineError> {
//! let config = PipelineConfig::load()?;
//! let ctx = std::sync::Arc::new(AppContext::init(config).await?);
//! let pipeline = Pipeline::new(ctx);
//!
//! let workflow = pipeline.create_workflow("submission-42", &[document_id]).await?;
//! let status = pipeline.run_workflow(workflow.id).await?;
//!
//! let response = pipeline
//!     .query(workflow.id, GraphRagRequest::new("Who is the carrier?"))
//!     .await?;
//! println!("{}", response.answer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Failures from any layer converge on [`PipelineError`]; callers can match
//! the originating subsystem without depending on the member crates.

pub mod config;
pub mod context;
pub mod stages;

pub use config::{OrchestrationConfig, PipelineConfig, RetrievalConfig, StoreConfig};
pub use context::AppContext;
pub use stages::DefaultStageRunner;

pub use cite;
pub use domain;
pub use enrich;
pub use extract;
pub use graph;
pub use indexing;
pub use llm;
pub use retrieval;
pub use semantic;
pub use store;
pub use workflow;

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use domain::{Workflow, WorkflowStatus};
use retrieval::{
    GraphExpansionService, GraphRagRequest, GraphRagResponse, GraphRagService,
    ResponseGenerationService, VectorRetrievalService,
};
use workflow::{
    CompensationRunner, EventSubscription, OrchestratorConfig, WorkflowOrchestrator,
};

/// Errors produced by the pipeline facade.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Llm(#[from] llm::LlmError),
    #[error(transparent)]
    Semantic(#[from] semantic::SemanticError),
    #[error(transparent)]
    Graph(#[from] graph::GraphError),
    #[error(transparent)]
    Workflow(#[from] workflow::WorkflowError),
    #[error(transparent)]
    Retrieval(#[from] retrieval::RetrievalError),
}

/// Install the structured logging subscriber. `RUST_LOG` controls the
/// filter; the default keeps the pipeline at `info`.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// High-level facade over the whole pipeline.
pub struct Pipeline {
    ctx: Arc<AppContext>,
}

impl Pipeline {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Create a workflow over the given documents and seed its stage rows.
    pub async fn create_workflow(
        &self,
        name: &str,
        document_ids: &[Uuid],
    ) -> Result<Workflow, PipelineError> {
        let repo = store::WorkflowRepository::new(self.ctx.pool.clone());
        let workflow = repo.create(name, None, None).await?;
        for document_id in document_ids {
            repo.add_document(workflow.id, *document_id).await?;
        }
        repo.ensure_stage_runs(workflow.id, document_ids).await?;
        info!(workflow_id = %workflow.id, documents = document_ids.len(), "workflow created");
        Ok(workflow)
    }

    /// Run all stages of a workflow. Compensation unwinds the workflow's
    /// contributions when it fails outright.
    pub async fn run_workflow(&self, workflow_id: Uuid) -> Result<WorkflowStatus, PipelineError> {
        self.run_workflow_with_cancel(workflow_id, CancellationToken::new())
            .await
    }

    pub async fn run_workflow_with_cancel(
        &self,
        workflow_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<WorkflowStatus, PipelineError> {
        let runner = Arc::new(self.stage_runner().await?);
        let orchestrator = WorkflowOrchestrator::new(
            store::WorkflowRepository::new(self.ctx.pool.clone()),
            OrchestratorConfig {
                stage_timeout: self.ctx.config.orchestration.stage_timeout(),
                max_retries: self.ctx.config.orchestration.max_retries,
                ..Default::default()
            },
        );

        let status = orchestrator
            .run_workflow(workflow_id, runner, cancel)
            .await?;

        if status == WorkflowStatus::Failed {
            let pool = &self.ctx.pool;
            let compensation = CompensationRunner::new(
                store::WorkflowScopeRepository::new(pool.clone()),
                store::CanonicalEntityRepository::new(pool.clone()),
                store::EntityRelationshipRepository::new(pool.clone()),
            );
            compensation.compensate_workflow(workflow_id).await?;
        }
        Ok(status)
    }

    /// Subscribe to the workflow's polled event stream.
    pub fn subscribe_events(&self, workflow_id: Uuid) -> EventSubscription {
        EventSubscription::new(
            store::WorkflowRepository::new(self.ctx.pool.clone()),
            workflow_id,
            self.ctx.config.orchestration.poll_interval(),
        )
    }

    /// Answer a natural-language question over the workflow's knowledge
    /// base.
    pub async fn query(
        &self,
        workflow_id: Uuid,
        mut request: GraphRagRequest,
    ) -> Result<GraphRagResponse, PipelineError> {
        if request.max_context_tokens == 0 {
            request.max_context_tokens = self.ctx.config.retrieval.max_context_tokens;
        }
        let service = self.graphrag_service();
        Ok(service.query(workflow_id, request).await?)
    }

    fn graphrag_service(&self) -> GraphRagService {
        let pool = &self.ctx.pool;
        let vector = VectorRetrievalService::new(
            store::VectorEmbeddingRepository::new(pool.clone()),
            store::SectionExtractionRepository::new(pool.clone()),
            store::DocumentRepository::new(pool.clone()),
            self.ctx.embedder(),
        );
        let expansion = GraphExpansionService::new(
            store::CanonicalEntityRepository::new(pool.clone()),
            store::EntityRelationshipRepository::new(pool.clone()),
        );
        let respond = ResponseGenerationService::new(
            Arc::clone(&self.ctx.llm),
            store::CitationRepository::new(pool.clone()),
        );
        GraphRagService::new(vector, expansion, respond)
    }

    /// Build the default stage runner over the context's handles.
    async fn stage_runner(&self) -> Result<DefaultStageRunner, PipelineError> {
        let pool = &self.ctx.pool;
        let embedder = self.ctx.embedder();

        let resolver = || {
            enrich::EntityResolver::new(
                store::CanonicalEntityRepository::new(pool.clone()),
                store::EntityMentionRepository::new(pool.clone()),
                store::EntityEvidenceRepository::new(pool.clone()),
                store::WorkflowScopeRepository::new(pool.clone()),
                store::DocumentChunkRepository::new(pool.clone()),
            )
        };

        let projector = match &self.ctx.graph {
            Some(driver) => {
                let projector = graph::GraphProjector::new(
                    Arc::clone(driver),
                    store::CanonicalEntityRepository::new(pool.clone()),
                    store::EntityRelationshipRepository::new(pool.clone()),
                    store::GraphSyncStateRepository::new(pool.clone()),
                );
                projector.ensure_constraints().await?;
                Some(projector)
            }
            None => None,
        };

        Ok(DefaultStageRunner {
            document_repo: store::DocumentRepository::new(pool.clone()),
            page_repo: store::DocumentPageRepository::new(pool.clone()),
            chunk_repo: store::DocumentChunkRepository::new(pool.clone()),
            extractor: extract::SectionBatchExtractor::new(
                Arc::clone(&self.ctx.llm),
                store::SectionExtractionRepository::new(pool.clone()),
                self.ctx.config.llm.model.clone(),
            ),
            aggregator: enrich::EntityAggregator::new(
                store::EntityMentionRepository::new(pool.clone()),
                store::SectionExtractionRepository::new(pool.clone()),
            ),
            resolver: resolver(),
            relationship_extractor: enrich::RelationshipExtractor::new(
                Arc::clone(&self.ctx.llm),
                store::CanonicalEntityRepository::new(pool.clone()),
                store::EntityMentionRepository::new(pool.clone()),
                store::DocumentChunkRepository::new(pool.clone()),
                store::DocumentTableRepository::new(pool.clone()),
                store::EntityRelationshipRepository::new(pool.clone()),
                store::WorkflowScopeRepository::new(pool.clone()),
                resolver(),
            ),
            embeddings: indexing::GenerateEmbeddingsService::new(
                store::VectorEmbeddingRepository::new(pool.clone()),
                store::SectionExtractionRepository::new(pool.clone()),
                Arc::clone(&embedder),
            ),
            chunk_embeddings: indexing::ChunkEmbeddingService::new(
                store::DocumentChunkRepository::new(pool.clone()),
                store::VectorEmbeddingRepository::new(pool.clone()),
                store::EmbeddingSyncStateRepository::new(pool.clone()),
                Arc::clone(&embedder),
            ),
            projector,
            citation_mapper: cite::CitationMapper::new(
                store::OcrWordRepository::new(pool.clone()),
                store::DocumentPageRepository::new(pool.clone()),
                store::CitationRepository::new(pool.clone()),
                store::VectorEmbeddingRepository::new(pool.clone()),
                embedder,
            ),
            relationship_repo: store::EntityRelationshipRepository::new(pool.clone()),
            canonical_repo: store::CanonicalEntityRepository::new(pool.clone()),
        })
    }
}
