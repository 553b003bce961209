//! The Neo4j graph projector.

use neo4rs::{query, Graph, Query};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use domain::{sanitize_relationship_type, EntityType, SyncStatus};
use store::{
    CanonicalEntityRepository, EntityRelationshipRepository, GraphSyncStateRepository,
};

use crate::properties::{map_entity_properties, node_label};
use crate::{GraphConfig, GraphError};

/// Projection counters for one workflow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionStats {
    pub entities_created: usize,
    pub relationships_created: usize,
    pub errors: usize,
}

pub struct GraphProjector {
    graph: Arc<Graph>,
    canonical_repo: CanonicalEntityRepository,
    relationship_repo: EntityRelationshipRepository,
    sync_repo: GraphSyncStateRepository,
}

impl GraphProjector {
    pub fn new(
        graph: Arc<Graph>,
        canonical_repo: CanonicalEntityRepository,
        relationship_repo: EntityRelationshipRepository,
        sync_repo: GraphSyncStateRepository,
    ) -> Self {
        Self {
            graph,
            canonical_repo,
            relationship_repo,
            sync_repo,
        }
    }

    /// Connect the Neo4j driver from configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Arc<Graph>, GraphError> {
        let addr = config.bolt_addr()?;
        info!(addr = %addr, "connecting to graph store");
        let graph = Graph::new(&addr, &config.user, &config.password)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        Ok(Arc::new(graph))
    }

    /// Ensure per-label uniqueness constraints on `(id, workflow_id)`.
    pub async fn ensure_constraints(&self) -> Result<(), GraphError> {
        const LABELS: [&str; 11] = [
            "Policy",
            "Organization",
            "Coverage",
            "Exclusion",
            "Condition",
            "Endorsement",
            "Location",
            "Claim",
            "Definition",
            "Vehicle",
            "Driver",
        ];
        for label in LABELS {
            let statement = format!(
                "CREATE CONSTRAINT {}_identity IF NOT EXISTS \
                 FOR (n:{label}) \
                 REQUIRE (n.id, n.workflow_id) IS UNIQUE",
                label.to_lowercase()
            );
            self.graph
                .run(query(&statement))
                .await
                .map_err(|e| GraphError::Query(e.to_string()))?;
        }
        info!("graph schema ensured (uniqueness constraints created)");
        Ok(())
    }

    /// Project a workflow's canonical entities and relationships.
    ///
    /// Idempotent: nodes and edges MERGE on their identity keys, so a re-run
    /// yields the same node/edge set.
    pub async fn project_workflow(&self, workflow_id: Uuid) -> Result<ProjectionStats, GraphError> {
        info!(%workflow_id, "starting knowledge graph projection");
        let mut stats = ProjectionStats::default();

        let entities = self.canonical_repo.get_by_workflow(workflow_id).await?;
        let mut key_by_id: HashMap<Uuid, (String, EntityType)> = HashMap::new();

        for entity in &entities {
            key_by_id.insert(
                entity.id,
                (entity.canonical_key.clone(), entity.entity_type.clone()),
            );
            match self.merge_entity_node(entity, workflow_id).await {
                Ok(()) => {
                    stats.entities_created += 1;
                    self.sync_repo
                        .upsert(
                            entity.id,
                            entity.entity_type.as_str(),
                            Some(&entity.canonical_key),
                            SyncStatus::Synced,
                            None,
                        )
                        .await?;
                }
                Err(err) => {
                    error!(entity_id = %entity.id, error = %err, "failed to project entity node");
                    stats.errors += 1;
                    self.sync_repo
                        .upsert(
                            entity.id,
                            entity.entity_type.as_str(),
                            None,
                            SyncStatus::Failed,
                            Some(&err.to_string()),
                        )
                        .await?;
                }
            }
        }

        let relationships = self.relationship_repo.get_by_workflow(workflow_id).await?;
        for relationship in &relationships {
            let source = key_by_id.get(&relationship.source_entity_id);
            let target = key_by_id.get(&relationship.target_entity_id);
            let (Some((source_key, _)), Some((target_key, _))) = (source, target) else {
                warn!(
                    relationship_id = %relationship.id,
                    "source or target entity not in workflow scope"
                );
                continue;
            };

            let result = self
                .merge_relationship_edge(
                    source_key,
                    target_key,
                    relationship.relationship_type.as_str(),
                    relationship.confidence,
                    &relationship.evidence(),
                    relationship.created_at.to_rfc3339(),
                    workflow_id,
                )
                .await;
            match result {
                Ok(()) => stats.relationships_created += 1,
                Err(err) => {
                    error!(relationship_id = %relationship.id, error = %err, "failed to project edge");
                    stats.errors += 1;
                }
            }
        }

        info!(
            %workflow_id,
            entities = stats.entities_created,
            relationships = stats.relationships_created,
            errors = stats.errors,
            "knowledge graph projection completed"
        );
        Ok(stats)
    }

    async fn merge_entity_node(
        &self,
        entity: &domain::CanonicalEntity,
        workflow_id: Uuid,
    ) -> Result<(), GraphError> {
        let label = node_label(&entity.entity_type);
        let props = map_entity_properties(entity);

        let mut set_clauses: Vec<String> = props
            .iter()
            .map(|(key, _)| format!("n.{key} = ${key}"))
            .collect();
        set_clauses.push("n.created_at = $created_at".to_string());

        let statement = format!(
            "MERGE (n:{label} {{id: $id, workflow_id: $workflow_id}})\nSET {}\nRETURN n",
            set_clauses.join(", ")
        );

        let mut q = query(&statement)
            .param("id", entity.canonical_key.clone())
            .param("workflow_id", workflow_id.to_string())
            .param("created_at", entity.created_at.to_rfc3339());
        for (key, value) in &props {
            q = bind_json_param(q, key, value);
        }

        self.graph
            .run(q)
            .await
            .map_err(|e| GraphError::Query(e.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn merge_relationship_edge(
        &self,
        source_key: &str,
        target_key: &str,
        relationship_type: &str,
        confidence: f64,
        evidence: &[JsonValue],
        created_at: String,
        workflow_id: Uuid,
    ) -> Result<(), GraphError> {
        let rel_type = sanitize_relationship_type(relationship_type);
        let statement = format!(
            "MATCH (s {{id: $source_key, workflow_id: $workflow_id}})\n\
             MATCH (t {{id: $target_key, workflow_id: $workflow_id}})\n\
             MERGE (s)-[r:{rel_type} {{workflow_id: $workflow_id}}]->(t)\n\
             SET r.confidence = $confidence,\n\
                 r.evidence = $evidence,\n\
                 r.source = $source,\n\
                 r.created_at = $created_at\n\
             RETURN r"
        );

        let evidence_strings: Vec<String> = evidence
            .iter()
            .map(|e| match e {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();

        let q = query(&statement)
            .param("source_key", source_key.to_string())
            .param("target_key", target_key.to_string())
            .param("workflow_id", workflow_id.to_string())
            .param("confidence", confidence)
            .param("evidence", evidence_strings)
            .param("source", "llm_extraction".to_string())
            .param("created_at", created_at);

        self.graph
            .run(q)
            .await
            .map_err(|e| GraphError::Query(e.to_string()))
    }
}

/// Bind one JSON property value with its natural bolt type; compound values
/// serialize to JSON strings.
fn bind_json_param(q: Query, key: &str, value: &JsonValue) -> Query {
    match value {
        JsonValue::String(s) => q.param(key, s.clone()),
        JsonValue::Bool(b) => q.param(key, *b),
        JsonValue::Number(n) if n.is_i64() => q.param(key, n.as_i64().unwrap_or_default()),
        JsonValue::Number(n) => q.param(key, n.as_f64().unwrap_or_default()),
        other => q.param(key, other.to_string()),
    }
}
