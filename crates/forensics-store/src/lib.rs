//! forensics-store crate
//!
//! Owns the investigation state: transactions, address entities, flagged
//! patterns and relations, plus JSON snapshots of all of it. The typed
//! [`KnowledgeGraph`] generalizes entities beyond plain addresses.

pub mod error;
pub mod graph;
pub mod profile;
pub mod quantity;
pub mod snapshot;
pub mod store;
pub mod types;

pub use error::GraphError;
pub use graph::{
    Direction, EntityRecord, EntityRef, EntityType, GraphStatistics, KnowledgeGraph,
    RelationType, RelationshipView,
};
pub use profile::{AddressProfile, SimilarAddress, TxDirection};
pub use quantity::{format_eth, parse_quantity, LARGE_TRANSFER_THRESHOLD, WEI_PER_ETHER};
pub use store::{KnowledgeStore, StoreStats};
pub use types::{Entity, EntityKind, Pattern, Properties, Relation, Transaction};
