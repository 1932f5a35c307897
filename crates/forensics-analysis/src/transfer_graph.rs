//! Address-level transfer graph built from the knowledge store.
//!
//! Nodes are addresses, edges are individual transactions. Parallel edges
//! are kept: several transactions between the same pair each get their own
//! edge, so every hash stays citable as evidence.
//!
//! Only transactions with both a sender and a recipient become edges.
//! Nodes and edges are added in store order (hash ascending), which makes
//! every traversal over the graph reproducible.

use std::collections::BTreeMap;

use alloy::primitives::U256;
use forensics_store::KnowledgeStore;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

/// Edge weight: one stored transaction between two addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEdge {
    pub tx_hash: String,
    pub value: U256,
    pub timestamp: u64,
}

/// Directed multigraph of every transfer in a store.
pub struct TransferGraph {
    /// The underlying petgraph directed graph.
    pub graph: DiGraph<String, TransferEdge>,
    /// Lookup from address to node index.
    pub addr_to_ix: BTreeMap<String, NodeIndex>,
}

impl TransferGraph {
    /// Build the graph from all stored transactions.
    ///
    /// Uses `add_edge` (not `update_edge`) to preserve parallel edges.
    pub fn from_store(store: &KnowledgeStore) -> Self {
        let mut graph = DiGraph::new();
        let mut addr_to_ix: BTreeMap<String, NodeIndex> = BTreeMap::new();

        for (hash, tx) in store.transactions() {
            let (Some(from), Some(to)) = (tx.sender(), tx.receiver()) else {
                continue;
            };

            let from_ix = *addr_to_ix
                .entry(from.to_string())
                .or_insert_with(|| graph.add_node(from.to_string()));
            let to_ix = *addr_to_ix
                .entry(to.to_string())
                .or_insert_with(|| graph.add_node(to.to_string()));

            graph.add_edge(
                from_ix,
                to_ix,
                TransferEdge {
                    tx_hash: hash.to_string(),
                    value: tx.value,
                    timestamp: tx.timestamp,
                },
            );
        }

        Self { graph, addr_to_ix }
    }

    pub fn node(&self, address: &str) -> Option<NodeIndex> {
        self.addr_to_ix.get(address).copied()
    }

    pub fn address(&self, ix: NodeIndex) -> &str {
        &self.graph[ix]
    }

    /// Addresses that sent at least one transfer, in address order.
    pub fn senders(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.addr_to_ix
            .values()
            .copied()
            .filter(|&ix| self.graph.edges(ix).next().is_some())
    }

    /// Distinct recipients of `ix`, in address order.
    pub fn successors(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        let mut targets: Vec<NodeIndex> = self.graph.neighbors(ix).collect();
        targets.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        targets.dedup();
        targets
    }

    /// Hashes of every transfer from `from` to `to`, in insertion order.
    pub fn edge_hashes(&self, from: NodeIndex, to: NodeIndex) -> Vec<&str> {
        let mut edges: Vec<(EdgeIndex, &str)> = self
            .graph
            .edges_connecting(from, to)
            .map(|e| (e.id(), e.weight().tx_hash.as_str()))
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, hash)| hash).collect()
    }

    /// `(received, sent)` value totals of `ix`, saturating at `U256::MAX`.
    pub fn flow_totals(&self, ix: NodeIndex) -> (U256, U256) {
        let mut inflow = U256::ZERO;
        let mut outflow = U256::ZERO;
        for edge in self.graph.edge_references() {
            if edge.target() == ix {
                inflow = inflow.saturating_add(edge.weight().value);
            }
            if edge.source() == ix {
                outflow = outflow.saturating_add(edge.weight().value);
            }
        }
        (inflow, outflow)
    }
}
