//! Blockchain-flavoured helpers on top of [`KnowledgeGraph`].

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::error::GraphError;
use crate::graph::{Direction, EntityRef, EntityType, KnowledgeGraph, RelationType};
use crate::types::Properties;

/// Maximum number of results from [`KnowledgeGraph::search_similar_addresses`].
pub const SIMILAR_ADDRESS_LIMIT: usize = 10;

/// Side of a transaction an address is linked on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxDirection {
    Sent,
    Received,
}

impl TxDirection {
    fn relation(self) -> RelationType {
        match self {
            Self::Sent => RelationType::SentTo,
            Self::Received => RelationType::ReceivedFrom,
        }
    }
}

impl FromStr for TxDirection {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sent" => Ok(Self::Sent),
            "received" => Ok(Self::Received),
            _ => Err(GraphError::UnknownDirection(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TokenHolding {
    pub address: String,
    pub amount: Value,
    pub details: Properties,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkedTransaction {
    pub hash: String,
    pub value: Value,
    pub details: Properties,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeployedContract {
    pub address: String,
    pub details: Properties,
}

/// Everything the graph knows about one address, grouped by relationship kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AddressProfile {
    pub address: String,
    pub properties: Properties,
    pub tokens: Vec<TokenHolding>,
    pub sent_transactions: Vec<LinkedTransaction>,
    pub received_transactions: Vec<LinkedTransaction>,
    pub deployed_contracts: Vec<DeployedContract>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimilarAddress {
    pub address: String,
    pub similarity_score: usize,
    pub common_sent: usize,
    pub common_received: usize,
}

fn single(key: &str, value: Value) -> Properties {
    let mut props = Properties::new();
    props.insert(key.to_string(), value);
    props
}

impl KnowledgeGraph {
    pub fn add_address(&mut self, address: &str, properties: Properties) -> bool {
        self.add_entity(EntityType::Address, address, properties)
    }

    pub fn add_token(&mut self, token_address: &str, properties: Properties) -> bool {
        self.add_entity(EntityType::Token, token_address, properties)
    }

    pub fn add_transaction(&mut self, tx_hash: &str, properties: Properties) -> bool {
        self.add_entity(EntityType::Transaction, tx_hash, properties)
    }

    pub fn add_contract(&mut self, contract_address: &str, properties: Properties) -> bool {
        self.add_entity(EntityType::Contract, contract_address, properties)
    }

    pub fn add_ens_domain(&mut self, domain: &str, properties: Properties) -> bool {
        self.add_entity(EntityType::EnsDomain, domain, properties)
    }

    /// `Address -[relation]-> Token` carrying the balance as `amount`.
    pub fn link_address_to_token(
        &mut self,
        address: &str,
        token_address: &str,
        amount: impl Into<Value>,
        relation: RelationType,
    ) -> bool {
        self.add_relationship(
            EntityRef::new(EntityType::Address, address),
            relation,
            EntityRef::new(EntityType::Token, token_address),
            single("amount", amount.into()),
        )
    }

    /// `Address -[SentTo|ReceivedFrom]-> Transaction` carrying `value`.
    pub fn link_address_to_transaction(
        &mut self,
        address: &str,
        tx_hash: &str,
        direction: TxDirection,
        value: impl Into<Value>,
    ) -> bool {
        self.add_relationship(
            EntityRef::new(EntityType::Address, address),
            direction.relation(),
            EntityRef::new(EntityType::Transaction, tx_hash),
            single("value", value.into()),
        )
    }

    /// Record a transfer: the transaction entity plus both address links.
    pub fn link_addresses(
        &mut self,
        from_address: &str,
        to_address: &str,
        tx_hash: &str,
        value: impl Into<Value>,
    ) -> bool {
        let value = value.into();
        self.add_transaction(tx_hash, single("value", value.clone()));
        self.link_address_to_transaction(from_address, tx_hash, TxDirection::Sent, value.clone());
        self.link_address_to_transaction(to_address, tx_hash, TxDirection::Received, value);
        true
    }

    /// Outgoing relationships of `address` grouped into tokens, transfers and
    /// deployments. An unknown address yields an empty profile.
    pub fn get_address_relationships(&self, address: &str) -> AddressProfile {
        let details = |entity_type: EntityType, id: &str| {
            self.query_entity(entity_type, id)
                .map(|record| record.properties)
                .unwrap_or_default()
        };
        let prop = |props: &Properties, key: &str| props.get(key).cloned().unwrap_or(Value::from(0));

        let mut profile = AddressProfile {
            address: address.to_string(),
            properties: details(EntityType::Address, address),
            ..AddressProfile::default()
        };

        for rel in self.query_relationships(EntityType::Address, address, Direction::Outgoing) {
            let target = rel.to.id.clone();
            match rel.relation_type {
                RelationType::Owns => profile.tokens.push(TokenHolding {
                    amount: prop(&rel.properties, "amount"),
                    details: details(EntityType::Token, &target),
                    address: target,
                }),
                RelationType::SentTo => profile.sent_transactions.push(LinkedTransaction {
                    value: prop(&rel.properties, "value"),
                    details: details(EntityType::Transaction, &target),
                    hash: target,
                }),
                RelationType::ReceivedFrom => profile.received_transactions.push(LinkedTransaction {
                    value: prop(&rel.properties, "value"),
                    details: details(EntityType::Transaction, &target),
                    hash: target,
                }),
                RelationType::Deployed => profile.deployed_contracts.push(DeployedContract {
                    details: details(EntityType::Contract, &target),
                    address: target,
                }),
                _ => {}
            }
        }

        profile
    }

    /// Other addresses sharing transactions with `address` on the same side.
    ///
    /// Ranked by overlap count (ties by address), at most
    /// [`SIMILAR_ADDRESS_LIMIT`] results, zero-overlap addresses excluded.
    pub fn search_similar_addresses(&self, address: &str) -> Vec<SimilarAddress> {
        let (sent, received) = self.transaction_sides(address);
        if sent.is_empty() && received.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<SimilarAddress> = self
            .search_entities(Some(EntityType::Address), &Properties::new())
            .into_iter()
            .filter(|record| record.id != address)
            .filter_map(|record| {
                let (other_sent, other_received) = self.transaction_sides(&record.id);
                let common_sent = sent.intersection(&other_sent).count();
                let common_received = received.intersection(&other_received).count();
                let similarity_score = common_sent + common_received;
                (similarity_score > 0).then_some(SimilarAddress {
                    address: record.id,
                    similarity_score,
                    common_sent,
                    common_received,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity_score
                .cmp(&a.similarity_score)
                .then_with(|| a.address.cmp(&b.address))
        });
        results.truncate(SIMILAR_ADDRESS_LIMIT);
        results
    }

    /// Transaction ids an address sent and received.
    fn transaction_sides(&self, address: &str) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut sides: BTreeMap<RelationType, BTreeSet<String>> = BTreeMap::new();
        for rel in self.query_relationships(EntityType::Address, address, Direction::Outgoing) {
            if rel.to.entity_type == EntityType::Transaction {
                sides.entry(rel.relation_type).or_default().insert(rel.to.id);
            }
        }
        (
            sides.remove(&RelationType::SentTo).unwrap_or_default(),
            sides.remove(&RelationType::ReceivedFrom).unwrap_or_default(),
        )
    }
}
