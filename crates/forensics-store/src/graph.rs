//! Typed entity/relationship graph.
//!
//! Generalizes the address-only store to entities keyed by `(type, id)`:
//! tokens, transactions, blocks, contracts and ENS domains next to plain
//! addresses. Relationships are directed and typed, each with its own
//! property bag. Queries are exact-match lookups over stored properties.
//!
//! Exports carry entities and relationships only; a graph rebuilt from an
//! export answers every query the same way as the original.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::GraphError;
use crate::types::Properties;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Address,
    Token,
    Transaction,
    Block,
    Contract,
    #[serde(rename = "ENSDomain")]
    EnsDomain,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        Self::Address,
        Self::Token,
        Self::Transaction,
        Self::Block,
        Self::Contract,
        Self::EnsDomain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Address => "Address",
            Self::Token => "Token",
            Self::Transaction => "Transaction",
            Self::Block => "Block",
            Self::Contract => "Contract",
            Self::EnsDomain => "ENSDomain",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GraphError::UnknownEntityType(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationType {
    Owns,
    Created,
    SentTo,
    ReceivedFrom,
    Deployed,
    Interacted,
    Contains,
}

impl RelationType {
    pub const ALL: [RelationType; 7] = [
        Self::Owns,
        Self::Created,
        Self::SentTo,
        Self::ReceivedFrom,
        Self::Deployed,
        Self::Interacted,
        Self::Contains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owns => "Owns",
            Self::Created => "Created",
            Self::SentTo => "SentTo",
            Self::ReceivedFrom => "ReceivedFrom",
            Self::Deployed => "Deployed",
            Self::Interacted => "Interacted",
            Self::Contains => "Contains",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GraphError::UnknownRelationType(s.to_string()))
    }
}

/// Which side of a relationship the queried entity sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl FromStr for Direction {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "outgoing" => Ok(Self::Outgoing),
            "incoming" => Ok(Self::Incoming),
            "both" => Ok(Self::Both),
            _ => Err(GraphError::UnknownDirection(s.to_string())),
        }
    }
}

/// `(type, id)` identity of a graph entity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// An entity with all of its properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub id: String,
    pub properties: Properties,
}

/// One relationship as seen from a queried entity.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelationshipView {
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub direction: Direction,
    pub from: EntityRef,
    pub to: EntityRef,
    pub properties: Properties,
}

/// Per-type counts of a graph.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphStatistics {
    pub name: String,
    pub total_entities: usize,
    pub total_relationships: usize,
    pub entity_types: BTreeMap<String, usize>,
    pub relationship_types: BTreeMap<String, usize>,
    pub last_updated: DateTime<Utc>,
}

type RelationshipKey = (EntityRef, RelationType, EntityRef);

#[derive(Clone, Debug)]
pub struct KnowledgeGraph {
    name: String,
    entities: BTreeMap<EntityRef, Properties>,
    relationships: BTreeMap<RelationshipKey, Properties>,
    last_updated: DateTime<Utc>,
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new("blockchain_data")
    }
}

impl KnowledgeGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: BTreeMap::new(),
            relationships: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.entities.contains_key(entity)
    }

    /// Create the entity or merge `properties` into the existing one.
    pub fn add_entity(&mut self, entity_type: EntityType, id: &str, properties: Properties) -> bool {
        self.entities
            .entry(EntityRef::new(entity_type, id))
            .or_default()
            .extend(properties);
        self.touch();
        true
    }

    /// Create the relationship or merge `properties` into the existing one.
    ///
    /// Missing endpoints are created with no properties.
    pub fn add_relationship(
        &mut self,
        from: EntityRef,
        relation_type: RelationType,
        to: EntityRef,
        properties: Properties,
    ) -> bool {
        self.entities.entry(from.clone()).or_default();
        self.entities.entry(to.clone()).or_default();
        self.relationships
            .entry((from, relation_type, to))
            .or_default()
            .extend(properties);
        self.touch();
        true
    }

    /// # Errors
    /// Returns [`GraphError::EntityNotFound`] if no such entity exists.
    pub fn query_entity(&self, entity_type: EntityType, id: &str) -> Result<EntityRecord, GraphError> {
        let key = EntityRef::new(entity_type, id);
        let properties = self
            .entities
            .get(&key)
            .ok_or_else(|| GraphError::EntityNotFound {
                entity_type,
                id: id.to_string(),
            })?;
        Ok(EntityRecord {
            entity_type,
            id: id.to_string(),
            properties: properties.clone(),
        })
    }

    /// Relationships touching `(entity_type, id)`; outgoing ones first when `Both`.
    pub fn query_relationships(
        &self,
        entity_type: EntityType,
        id: &str,
        direction: Direction,
    ) -> Vec<RelationshipView> {
        let entity = EntityRef::new(entity_type, id);
        let mut results = Vec::new();

        if matches!(direction, Direction::Outgoing | Direction::Both) {
            results.extend(
                self.relationships
                    .iter()
                    .filter(|((from, _, _), _)| *from == entity)
                    .map(|(key, props)| view(key, props, Direction::Outgoing)),
            );
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            results.extend(
                self.relationships
                    .iter()
                    .filter(|((_, _, to), _)| *to == entity)
                    .map(|(key, props)| view(key, props, Direction::Incoming)),
            );
        }

        results
    }

    /// Entities of `entity_type` (any type if `None`) whose properties contain
    /// every filter key with an equal value. A missing property never matches.
    pub fn search_entities(
        &self,
        entity_type: Option<EntityType>,
        filters: &Properties,
    ) -> Vec<EntityRecord> {
        self.entities
            .iter()
            .filter(|(key, _)| entity_type.map_or(true, |t| key.entity_type == t))
            .filter(|(_, props)| {
                filters
                    .iter()
                    .all(|(name, expected)| props.get(name) == Some(expected))
            })
            .map(|(key, props)| EntityRecord {
                entity_type: key.entity_type,
                id: key.id.clone(),
                properties: props.clone(),
            })
            .collect()
    }

    pub fn get_graph_statistics(&self) -> GraphStatistics {
        let mut entity_types = BTreeMap::new();
        for key in self.entities.keys() {
            *entity_types
                .entry(key.entity_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        let mut relationship_types = BTreeMap::new();
        for (_, relation_type, _) in self.relationships.keys() {
            *relationship_types
                .entry(relation_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        GraphStatistics {
            name: self.name.clone(),
            total_entities: self.entities.len(),
            total_relationships: self.relationships.len(),
            entity_types,
            relationship_types,
            last_updated: self.last_updated,
        }
    }

    /// Serialize the graph as `{metadata, entities, relationships}`.
    ///
    /// # Errors
    /// Returns error if a property value cannot be serialized.
    pub fn export_to_json(&self) -> Result<String> {
        let entities: Vec<EntityRecord> = self
            .entities
            .iter()
            .map(|(key, props)| EntityRecord {
                entity_type: key.entity_type,
                id: key.id.clone(),
                properties: props.clone(),
            })
            .collect();

        let relationships: Vec<ExportedRelationship<'_>> = self
            .relationships
            .iter()
            .map(|((from, relation_type, to), props)| ExportedRelationship {
                from,
                relation_type: *relation_type,
                to,
                properties: props,
            })
            .collect();

        let export = GraphExport {
            metadata: ExportMetadata {
                name: &self.name,
                exported_at: Utc::now(),
                entities_count: entities.len(),
                relationships_count: relationships.len(),
            },
            entities,
            relationships,
        };

        serde_json::to_string_pretty(&export).wrap_err("failed to serialize knowledge graph")
    }

    /// Merge an export into this graph, returning how many entries were applied.
    ///
    /// Entries with unknown types or empty ids are skipped with a warning.
    ///
    /// # Errors
    /// Returns error if `json` is not a valid export document.
    pub fn try_import_json(&mut self, json: &str) -> Result<usize> {
        let export: RawExport =
            serde_json::from_str(json).wrap_err("failed to decode knowledge graph export")?;
        let mut applied = 0;

        for raw in export.entities {
            match raw.endpoint.resolve() {
                Some(entity) => {
                    self.add_entity(entity.entity_type, &entity.id, raw.properties);
                    applied += 1;
                }
                None => warn!(entity = ?raw.endpoint, "skipping malformed entity in import"),
            }
        }

        for raw in export.relationships {
            let from = raw.from.as_ref().and_then(RawEndpoint::resolve);
            let to = raw.to.as_ref().and_then(RawEndpoint::resolve);
            let relation_type = raw
                .relation_type
                .as_deref()
                .and_then(|t| t.parse::<RelationType>().ok());

            match (from, relation_type, to) {
                (Some(from), Some(relation_type), Some(to)) => {
                    self.add_relationship(from, relation_type, to, raw.properties);
                    applied += 1;
                }
                _ => warn!(
                    relation_type = ?raw.relation_type,
                    "skipping malformed relationship in import"
                ),
            }
        }

        Ok(applied)
    }

    /// Boolean wrapper over [`Self::try_import_json`]; logs and returns `false` on error.
    pub fn import_from_json(&mut self, json: &str) -> bool {
        match self.try_import_json(json) {
            Ok(_) => true,
            Err(e) => {
                error!("failed to import knowledge graph: {e:#}");
                false
            }
        }
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

fn view(key: &RelationshipKey, props: &Properties, direction: Direction) -> RelationshipView {
    let (from, relation_type, to) = key;
    RelationshipView {
        relation_type: *relation_type,
        direction,
        from: from.clone(),
        to: to.clone(),
        properties: props.clone(),
    }
}

#[derive(Serialize)]
struct GraphExport<'a> {
    metadata: ExportMetadata<'a>,
    entities: Vec<EntityRecord>,
    relationships: Vec<ExportedRelationship<'a>>,
}

#[derive(Serialize)]
struct ExportMetadata<'a> {
    name: &'a str,
    exported_at: DateTime<Utc>,
    entities_count: usize,
    relationships_count: usize,
}

#[derive(Serialize)]
struct ExportedRelationship<'a> {
    from: &'a EntityRef,
    #[serde(rename = "type")]
    relation_type: RelationType,
    to: &'a EntityRef,
    properties: &'a Properties,
}

#[derive(Deserialize)]
struct RawExport {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEndpoint {
    #[serde(rename = "type", default)]
    entity_type: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl RawEndpoint {
    fn resolve(&self) -> Option<EntityRef> {
        let entity_type = self.entity_type.as_deref()?.parse::<EntityType>().ok()?;
        let id = self.id.as_deref().filter(|id| !id.is_empty())?;
        Some(EntityRef::new(entity_type, id))
    }
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(flatten)]
    endpoint: RawEndpoint,
    #[serde(default)]
    properties: Properties,
}

#[derive(Deserialize)]
struct RawRelationship {
    #[serde(default)]
    from: Option<RawEndpoint>,
    #[serde(rename = "type", default)]
    relation_type: Option<String>,
    #[serde(default)]
    to: Option<RawEndpoint>,
    #[serde(default)]
    properties: Properties,
}
