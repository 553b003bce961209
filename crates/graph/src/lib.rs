//! Workflow-scoped Neo4j projection.
//!
//! Each canonical entity type maps to a node label; nodes MERGE on
//! `(label, id: canonical_key, workflow_id)` and edges MERGE on
//! `(source, target, type, workflow_id)`, so re-running a projection is a
//! no-op. Properties come from a fixed, type-keyed mapping of the entity's
//! attributes with nulls removed.

pub mod projector;
pub mod properties;

pub use projector::{GraphProjector, ProjectionStats};
pub use properties::{map_entity_properties, node_label};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Graph store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Bolt endpoint, e.g. `bolt://localhost:7687`.
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl GraphConfig {
    /// Resolve `host:port` from the configured URI.
    pub fn bolt_addr(&self) -> Result<String, GraphError> {
        let trimmed = self
            .uri
            .strip_prefix("bolt://")
            .or_else(|| self.uri.strip_prefix("neo4j://"))
            .unwrap_or(&self.uri);
        if trimmed.is_empty() {
            return Err(GraphError::InvalidConfig("uri must not be empty".into()));
        }
        if trimmed.contains(':') {
            Ok(trimmed.to_string())
        } else {
            Ok(format!("{trimmed}:7687"))
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid graph config: {0}")]
    InvalidConfig(String),
    #[error("graph connection failure: {0}")]
    Connection(String),
    #[error("graph query failure: {0}")]
    Query(String),
    #[error(transparent)]
    Store(#[from] store::StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bolt_addr_parses_uri_forms() {
        let cfg = |uri: &str| GraphConfig {
            uri: uri.into(),
            user: "neo4j".into(),
            password: "secret".into(),
        };
        assert_eq!(cfg("bolt://localhost:7687").bolt_addr().unwrap(), "localhost:7687");
        assert_eq!(cfg("neo4j://graph.internal").bolt_addr().unwrap(), "graph.internal:7687");
        assert_eq!(cfg("10.0.0.5:7687").bolt_addr().unwrap(), "10.0.0.5:7687");
        assert!(cfg("bolt://").bolt_addr().is_err());
    }
}
