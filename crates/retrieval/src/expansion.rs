//! Stage 3: graph expansion over the relational relationship adjacency.
//!
//! Seeds the traversal with canonical entities tied to the top vector
//! results, then walks `entity_relationships` up to the plan's traversal
//! depth with a visited-set, pruning by intent-derived entity-type and
//! relationship-type allowlists. Failures here are non-fatal; the
//! orchestrator records fallback mode and proceeds vector-only.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use domain::{CanonicalEntity, EntityType, RelationshipType};
use store::{CanonicalEntityRepository, EntityRelationshipRepository};

use crate::plan::{QueryIntent, QueryPlan};
use crate::vector::VectorSearchResult;
use crate::RetrievalError;

/// Cap on seed entities taken from vector results.
const MAX_SEEDS: usize = 10;

/// Cap on expanded entities returned.
const MAX_GRAPH_RESULTS: usize = 30;

/// One graph expansion hit.
#[derive(Debug, Clone)]
pub struct GraphResult {
    pub entity: CanonicalEntity,
    /// Relationship types walked from the seed to this entity.
    pub relationship_chain: Vec<RelationshipType>,
    pub depth: u32,
}

/// Entity/relationship allowlists per intent; `None` allows everything
/// (AUDIT walks the full vocabulary).
pub fn relevance_allowlists(
    intent: QueryIntent,
) -> (Option<Vec<EntityType>>, Option<Vec<RelationshipType>>) {
    match intent {
        QueryIntent::Qa => (
            Some(vec![
                EntityType::Policy,
                EntityType::Organization,
                EntityType::Coverage,
                EntityType::Definition,
            ]),
            Some(vec![
                RelationshipType::IssuedBy,
                RelationshipType::HasInsured,
                RelationshipType::BrokeredBy,
                RelationshipType::HasCoverage,
                RelationshipType::DefinedIn,
            ]),
        ),
        QueryIntent::Analysis => (
            Some(vec![
                EntityType::Policy,
                EntityType::Organization,
                EntityType::Coverage,
                EntityType::Exclusion,
                EntityType::Condition,
                EntityType::Endorsement,
                EntityType::Location,
                EntityType::Claim,
                EntityType::Definition,
            ]),
            Some(vec![
                RelationshipType::IssuedBy,
                RelationshipType::HasInsured,
                RelationshipType::HasCoverage,
                RelationshipType::SubjectTo,
                RelationshipType::Excludes,
                RelationshipType::HasLocation,
                RelationshipType::HasClaim,
                RelationshipType::ModifiedBy,
                RelationshipType::DefinedIn,
            ]),
        ),
        QueryIntent::Audit | QueryIntent::General => (None, None),
    }
}

pub struct GraphExpansionService {
    canonical_repo: CanonicalEntityRepository,
    relationship_repo: EntityRelationshipRepository,
}

impl GraphExpansionService {
    pub fn new(
        canonical_repo: CanonicalEntityRepository,
        relationship_repo: EntityRelationshipRepository,
    ) -> Self {
        Self {
            canonical_repo,
            relationship_repo,
        }
    }

    pub async fn expand(
        &self,
        vector_results: &[VectorSearchResult],
        query_plan: &QueryPlan,
        workflow_id: Uuid,
    ) -> Result<Vec<GraphResult>, RetrievalError> {
        if query_plan.traversal_depth == 0 || vector_results.is_empty() {
            return Ok(Vec::new());
        }

        let workflow_entities = self.canonical_repo.get_by_workflow(workflow_id).await?;
        if workflow_entities.is_empty() {
            return Ok(Vec::new());
        }

        let seeds = seed_entities(vector_results, &workflow_entities, &query_plan.extracted_entities);
        if seeds.is_empty() {
            debug!("no seed entities matched vector results");
            return Ok(Vec::new());
        }

        let (entity_allow, rel_allow) = relevance_allowlists(query_plan.intent);
        let by_id: HashMap<Uuid, &CanonicalEntity> =
            workflow_entities.iter().map(|e| (e.id, e)).collect();

        let mut visited: HashSet<Uuid> = seeds.iter().map(|e| e.id).collect();
        let mut frontier: Vec<(Uuid, Vec<RelationshipType>)> =
            seeds.iter().map(|e| (e.id, Vec::new())).collect();
        let mut results: Vec<GraphResult> = Vec::new();

        for depth in 1..=query_plan.traversal_depth {
            if frontier.is_empty() || results.len() >= MAX_GRAPH_RESULTS {
                break;
            }
            let frontier_ids: Vec<Uuid> = frontier.iter().map(|(id, _)| *id).collect();
            let edges = self
                .relationship_repo
                .adjacency(workflow_id, &frontier_ids)
                .await?;

            let chains: HashMap<Uuid, Vec<RelationshipType>> = frontier.into_iter().collect();
            let mut next_frontier: Vec<(Uuid, Vec<RelationshipType>)> = Vec::new();

            for edge in edges {
                if let Some(allow) = &rel_allow {
                    if !allow.contains(&edge.relationship_type) {
                        continue;
                    }
                }
                for (from, to) in [
                    (edge.source_entity_id, edge.target_entity_id),
                    (edge.target_entity_id, edge.source_entity_id),
                ] {
                    let Some(chain) = chains.get(&from) else { continue };
                    if visited.contains(&to) {
                        continue;
                    }
                    let Some(entity) = by_id.get(&to) else { continue };
                    if let Some(allow) = &entity_allow {
                        if !allow.contains(&entity.entity_type) {
                            continue;
                        }
                    }
                    visited.insert(to);
                    let mut new_chain = chain.clone();
                    new_chain.push(edge.relationship_type);
                    results.push(GraphResult {
                        entity: (*entity).clone(),
                        relationship_chain: new_chain.clone(),
                        depth,
                    });
                    next_frontier.push((to, new_chain));
                    if results.len() >= MAX_GRAPH_RESULTS {
                        break;
                    }
                }
            }
            frontier = next_frontier;
        }

        info!(
            %workflow_id,
            seeds = visited.len() - results.len(),
            expanded = results.len(),
            depth = query_plan.traversal_depth,
            "graph expansion complete"
        );
        Ok(results)
    }
}

/// Seed selection: workflow entities whose normalized value appears in the
/// top vector results' content (or in the query's extracted entities).
fn seed_entities<'a>(
    vector_results: &[VectorSearchResult],
    workflow_entities: &'a [CanonicalEntity],
    extracted: &crate::plan::ExtractedQueryEntities,
) -> Vec<&'a CanonicalEntity> {
    let haystack: String = vector_results
        .iter()
        .take(MAX_SEEDS)
        .map(|r| r.content.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    let mut seeds = Vec::new();
    for entity in workflow_entities {
        if seeds.len() >= MAX_SEEDS {
            break;
        }
        let Some(value) = entity.normalized_value() else { continue };
        let value_lower = value.to_lowercase();
        if value_lower.len() < 3 {
            continue;
        }
        let in_results = haystack.contains(&value_lower);
        let in_query = extracted
            .policy_numbers
            .iter()
            .chain(extracted.organizations.iter())
            .chain(extracted.coverage_types.iter())
            .any(|q| q.to_lowercase() == value_lower);
        if in_results || in_query {
            seeds.push(entity);
        }
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qa_allowlists_are_tight() {
        let (entities, rels) = relevance_allowlists(QueryIntent::Qa);
        let entities = entities.unwrap();
        let rels = rels.unwrap();
        assert!(entities.contains(&EntityType::Policy));
        assert!(!entities.contains(&EntityType::Claim));
        assert!(rels.contains(&RelationshipType::IssuedBy));
        assert!(!rels.contains(&RelationshipType::HasClaim));
    }

    #[test]
    fn audit_allows_everything() {
        let (entities, rels) = relevance_allowlists(QueryIntent::Audit);
        assert!(entities.is_none());
        assert!(rels.is_none());
    }
}
