use thiserror::Error;

use crate::graph::EntityType;

/// Lookup and parse failures of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("entity {entity_type}:{id} not found")]
    EntityNotFound { entity_type: EntityType, id: String },

    #[error("unknown entity type '{0}'")]
    UnknownEntityType(String),

    #[error("unknown relation type '{0}'")]
    UnknownRelationType(String),

    #[error("unknown direction '{0}', expected outgoing, incoming or both")]
    UnknownDirection(String),
}
