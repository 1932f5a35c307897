//! In-memory knowledge store for one investigation session.
//!
//! Holds four maps: raw transactions keyed by hash, address entities derived
//! from transaction endpoints, patterns flagged at insertion time, and typed
//! relations between addresses. All maps are ordered, so every scan over
//! the store visits records in the same order from run to run.
//!
//! The store is a plain owned value with no interior locking. Callers that
//! share one across threads must serialize access themselves.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::quantity::LARGE_TRANSFER_THRESHOLD;
use crate::types::{Entity, Pattern, Properties, Relation, Transaction};

/// Relation key: `(from, type, to)`.
pub(crate) type RelationKey = (String, String, String);

const RESERVED_ENTITY_KEYS: [&str; 2] = ["type", "transactions"];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct KnowledgeStore {
    pub(crate) transactions: BTreeMap<String, Transaction>,
    pub(crate) entities: BTreeMap<String, Entity>,
    pub(crate) patterns: BTreeMap<String, Pattern>,
    pub(crate) relations: BTreeMap<RelationKey, Relation>,
}

/// Record counts, one per top-level map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub transactions: usize,
    pub entities: usize,
    pub patterns: usize,
    pub relations: usize,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction under `hash`.
    ///
    /// Returns `false` without touching anything if the hash is already
    /// stored. Otherwise links both endpoints to their entity records and
    /// records the per-transaction flags (large transfer, contract creation).
    pub fn add_transaction(&mut self, hash: &str, tx: Transaction) -> bool {
        if self.transactions.contains_key(hash) {
            debug!(tx_hash = hash, "transaction already present");
            return false;
        }

        self.link_endpoints(hash, &tx);
        self.flag_transaction(hash, &tx);
        self.transactions.insert(hash.to_string(), tx);
        true
    }

    /// Merge `properties` into the entity at `address`, creating it if needed.
    ///
    /// `type` and `transactions` are structural and cannot be overwritten
    /// through the property bag; such keys are dropped.
    pub fn add_entity(&mut self, address: &str, properties: Properties) -> bool {
        let entity = self.entities.entry(address.to_string()).or_default();
        for (key, value) in properties {
            if RESERVED_ENTITY_KEYS.contains(&key.as_str()) {
                warn!(address, key = %key, "ignoring reserved entity property");
                continue;
            }
            entity.properties.insert(key, value);
        }
        true
    }

    /// Merge `properties` into the `(from, relation_type, to)` relation.
    ///
    /// Both endpoints get an entity record if they do not have one yet.
    pub fn add_relation(
        &mut self,
        from: &str,
        to: &str,
        relation_type: &str,
        properties: Properties,
    ) -> bool {
        self.entities.entry(from.to_string()).or_default();
        self.entities.entry(to.to_string()).or_default();

        let key = (
            from.to_string(),
            relation_type.to_string(),
            to.to_string(),
        );
        let relation = self.relations.entry(key).or_insert_with(|| Relation {
            entity1: from.to_string(),
            entity2: to.to_string(),
            relation_type: relation_type.to_string(),
            data: Properties::new(),
        });
        relation.data.extend(properties);
        true
    }

    pub fn get_transaction(&self, hash: &str) -> Option<&Transaction> {
        self.transactions.get(hash)
    }

    pub fn get_entity(&self, address: &str) -> Option<&Entity> {
        self.entities.get(address)
    }

    /// Look up a stored pattern by its `type:tx_hash` key.
    pub fn get_pattern(&self, key: &str) -> Option<&Pattern> {
        self.patterns.get(key)
    }

    /// Every relation with `address` at either end.
    pub fn get_relations(&self, address: &str) -> Vec<&Relation> {
        self.relations
            .values()
            .filter(|relation| relation.involves(address))
            .collect()
    }

    /// Stored patterns attributed to `address`.
    pub fn patterns_for(&self, address: &str) -> Vec<&Pattern> {
        self.patterns
            .values()
            .filter(|pattern| pattern.involves(address))
            .collect()
    }

    pub fn transactions(&self) -> impl Iterator<Item = (&str, &Transaction)> {
        self.transactions.iter().map(|(hash, tx)| (hash.as_str(), tx))
    }

    pub fn entities(&self) -> impl Iterator<Item = (&str, &Entity)> {
        self.entities
            .iter()
            .map(|(address, entity)| (address.as_str(), entity))
    }

    pub fn patterns(&self) -> impl Iterator<Item = (&str, &Pattern)> {
        self.patterns.iter().map(|(key, pattern)| (key.as_str(), pattern))
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    /// Total number of records across transactions, entities, patterns and relations.
    pub fn len(&self) -> usize {
        self.transactions.len() + self.entities.len() + self.patterns.len() + self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            transactions: self.transactions.len(),
            entities: self.entities.len(),
            patterns: self.patterns.len(),
            relations: self.relations.len(),
        }
    }

    /// Drop every record in all four maps.
    pub fn clear(&mut self) {
        self.transactions.clear();
        self.entities.clear();
        self.patterns.clear();
        self.relations.clear();
    }

    fn link_endpoints(&mut self, hash: &str, tx: &Transaction) {
        match tx.sender() {
            Some(from) => self.append_transaction(from, hash),
            None => warn!(tx_hash = hash, "transaction has no sender, skipping entity link"),
        }
        // A missing recipient is a contract creation, not malformed input.
        if let Some(to) = tx.receiver() {
            self.append_transaction(to, hash);
        }
    }

    fn append_transaction(&mut self, address: &str, hash: &str) {
        self.entities
            .entry(address.to_string())
            .or_default()
            .transactions
            .push(hash.to_string());
    }

    fn flag_transaction(&mut self, hash: &str, tx: &Transaction) {
        if let Some(pattern) = check_large_transfer(hash, tx) {
            debug!(tx_hash = hash, value = %tx.value, "large transfer flagged");
            self.patterns.insert(format!("{}:{hash}", pattern.as_str()), pattern);
        }
        if let Some(pattern) = check_contract_creation(hash, tx) {
            debug!(tx_hash = hash, "contract creation flagged");
            self.patterns.insert(format!("{}:{hash}", pattern.as_str()), pattern);
        }
    }
}

/// Flag a transfer strictly above 100 ether.
fn check_large_transfer(hash: &str, tx: &Transaction) -> Option<Pattern> {
    if tx.value <= LARGE_TRANSFER_THRESHOLD {
        return None;
    }
    Some(Pattern::LargeTransfer {
        tx_hash: hash.to_string(),
        from_address: tx.sender().map(str::to_string),
        value: tx.value,
        threshold: LARGE_TRANSFER_THRESHOLD,
        timestamp: tx.timestamp,
    })
}

/// Flag a transaction with no recipient that carries init code.
fn check_contract_creation(hash: &str, tx: &Transaction) -> Option<Pattern> {
    if tx.receiver().is_some() || !tx.has_payload() {
        return None;
    }
    Some(Pattern::ContractCreation {
        tx_hash: hash.to_string(),
        creator: tx.sender().map(str::to_string),
        timestamp: tx.timestamp,
    })
}
