//! Depth-bounded fund-flow tracing.
//!
//! Follows outgoing transfers from a source address, most recent first.
//! Every address is explored at most once per query: a second path into an
//! already-entered address is recorded as complete at that hop but not
//! expanded again. This keeps the search finite on cyclic and fan-out
//! heavy graphs at the cost of not enumerating every possible path. The
//! walk keeps its own stack, so chain length is bounded by memory only.

use std::collections::{BTreeMap, BTreeSet};

use alloy::primitives::U256;
use forensics_store::quantity;
use forensics_store::{KnowledgeStore, Transaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of hops followed from the source.
pub const DEFAULT_TRACE_DEPTH: usize = 3;

/// One transfer along a traced path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowHop {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    #[serde(with = "quantity::wei")]
    pub value: U256,
    pub timestamp: u64,
}

pub type FlowPath = Vec<FlowHop>;

type Outgoing<'a> = BTreeMap<&'a str, Vec<(&'a str, &'a Transaction)>>;

/// Outgoing transfers per sender, each list ordered newest first.
///
/// The sort is stable over store (hash) order, so equal timestamps keep
/// ascending hash order.
fn outgoing_index(store: &KnowledgeStore) -> Outgoing<'_> {
    let mut index = Outgoing::new();
    for (hash, tx) in store.transactions() {
        if let Some(from) = tx.sender() {
            index.entry(from).or_default().push((hash, tx));
        }
    }
    for transfers in index.values_mut() {
        transfers.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));
    }
    index
}

/// An address being expanded: its outgoing transfers and the next one to follow.
struct Frame<'i, 'a> {
    address: &'a str,
    transfers: &'i [(&'a str, &'a Transaction)],
    next: usize,
    depth: usize,
}

struct Tracer<'i, 'a> {
    outgoing: &'i Outgoing<'a>,
    visited: BTreeSet<&'a str>,
    current: FlowPath,
    paths: Vec<FlowPath>,
}

impl<'i, 'a> Tracer<'i, 'a> {
    /// Mark `address` entered and return its frame, if it is to be expanded.
    fn enter(&mut self, address: &'a str, depth: usize) -> Option<Frame<'i, 'a>> {
        if depth == 0 || !self.visited.insert(address) {
            return None;
        }
        let outgoing: &'i Outgoing<'a> = self.outgoing;
        let transfers = outgoing.get(address)?;
        Some(Frame {
            address,
            transfers: transfers.as_slice(),
            next: 0,
            depth,
        })
    }

    /// Depth-first walk on an explicit stack; every frame above the root
    /// owns exactly one hop in `current`.
    fn trace(&mut self, source: &'a str, depth: usize) {
        let mut stack: Vec<Frame<'i, 'a>> = self.enter(source, depth).into_iter().collect();

        while let Some(frame) = stack.last_mut() {
            let Some(&(hash, tx)) = frame.transfers.get(frame.next) else {
                stack.pop();
                if !stack.is_empty() {
                    self.current.pop();
                }
                continue;
            };
            frame.next += 1;

            // Deployments have no destination to follow.
            let Some(to) = tx.receiver() else {
                continue;
            };
            let (from, depth) = (frame.address, frame.depth);

            self.current.push(FlowHop {
                tx_hash: hash.to_string(),
                from: from.to_string(),
                to: to.to_string(),
                value: tx.value,
                timestamp: tx.timestamp,
            });

            if depth == 1 || self.visited.contains(to) {
                self.paths.push(self.current.clone());
            }

            match self.enter(to, depth - 1) {
                Some(child) => stack.push(child),
                None => {
                    self.current.pop();
                }
            }
        }
    }
}

/// Trace fund flows leaving `source` for up to `depth` hops.
///
/// Returns one path per terminal reached: a hop at maximum depth, or a hop
/// into an address already entered during this query. An address with no
/// outgoing transfers, or `depth == 0`, yields no paths.
#[tracing::instrument(skip(store))]
pub fn query_fund_flow(store: &KnowledgeStore, source: &str, depth: usize) -> Vec<FlowPath> {
    let outgoing = outgoing_index(store);
    let mut tracer = Tracer {
        outgoing: &outgoing,
        visited: BTreeSet::new(),
        current: Vec::new(),
        paths: Vec::new(),
    };
    tracer.trace(source, depth);

    debug!(
        paths = tracer.paths.len(),
        addresses_visited = tracer.visited.len(),
        "fund flow traced"
    );
    tracer.paths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(store: &mut KnowledgeStore, hash: &str, from: &str, to: &str, ts: u64) {
        store.add_transaction(hash, Transaction::transfer(from, to, U256::from(1), ts));
    }

    fn hashes(path: &FlowPath) -> Vec<&str> {
        path.iter().map(|hop| hop.tx_hash.as_str()).collect()
    }

    #[test]
    fn no_outgoing_yields_no_paths() {
        let mut store = KnowledgeStore::new();
        mk(&mut store, "0x1", "A", "B", 10);
        assert!(query_fund_flow(&store, "B", 3).is_empty());
        assert!(query_fund_flow(&store, "Z", 3).is_empty());
    }

    #[test]
    fn zero_depth_yields_no_paths() {
        let mut store = KnowledgeStore::new();
        mk(&mut store, "0x1", "A", "B", 10);
        assert!(query_fund_flow(&store, "A", 0).is_empty());
    }

    #[test]
    fn depth_one_paths_are_single_hops_newest_first() {
        let mut store = KnowledgeStore::new();
        mk(&mut store, "0x1", "A", "B", 10);
        mk(&mut store, "0x2", "A", "C", 30);
        mk(&mut store, "0x3", "A", "D", 20);
        mk(&mut store, "0x4", "B", "E", 40);

        let paths = query_fund_flow(&store, "A", 1);
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.len() == 1));
        let order: Vec<&str> = paths.iter().map(|p| p[0].tx_hash.as_str()).collect();
        assert_eq!(order, vec!["0x2", "0x3", "0x1"]);
    }

    #[test]
    fn equal_timestamps_break_by_hash() {
        let mut store = KnowledgeStore::new();
        mk(&mut store, "0xb", "A", "C", 10);
        mk(&mut store, "0xa", "A", "B", 10);

        let paths = query_fund_flow(&store, "A", 1);
        assert_eq!(hashes(&paths[0]), vec!["0xa"]);
        assert_eq!(hashes(&paths[1]), vec!["0xb"]);
    }

    #[test]
    fn chain_records_path_at_depth_limit() {
        let mut store = KnowledgeStore::new();
        mk(&mut store, "0x1", "A", "B", 10);
        mk(&mut store, "0x2", "B", "C", 20);
        mk(&mut store, "0x3", "C", "D", 30);

        let paths = query_fund_flow(&store, "A", 2);
        assert_eq!(paths.len(), 1);
        assert_eq!(hashes(&paths[0]), vec!["0x1", "0x2"]);
        assert_eq!(paths[0][1].from, "B");
        assert_eq!(paths[0][1].to, "C");
    }

    #[test]
    fn short_chain_below_depth_records_nothing() {
        let mut store = KnowledgeStore::new();
        mk(&mut store, "0x1", "A", "B", 10);

        // B is a dead end before the depth limit and was never visited before.
        assert!(query_fund_flow(&store, "A", 3).is_empty());
    }

    #[test]
    fn cycle_closes_path_at_visited_address() {
        let mut store = KnowledgeStore::new();
        mk(&mut store, "0x1", "A", "B", 10);
        mk(&mut store, "0x2", "B", "C", 20);
        mk(&mut store, "0x3", "C", "A", 30);

        let paths = query_fund_flow(&store, "A", 10);
        assert_eq!(paths.len(), 1);
        assert_eq!(hashes(&paths[0]), vec!["0x1", "0x2", "0x3"]);
        assert_eq!(paths[0].last().map(|h| h.to.as_str()), Some("A"));
    }

    #[test]
    fn second_path_into_visited_address_recorded_once() {
        let mut store = KnowledgeStore::new();
        // A -> B -> D (newer) and A -> C -> D (older).
        mk(&mut store, "0x1", "A", "B", 50);
        mk(&mut store, "0x2", "A", "C", 40);
        mk(&mut store, "0x3", "B", "D", 30);
        mk(&mut store, "0x4", "C", "D", 20);
        mk(&mut store, "0x5", "D", "E", 10);

        let paths = query_fund_flow(&store, "A", 3);
        assert_eq!(paths.len(), 2);
        assert_eq!(hashes(&paths[0]), vec!["0x1", "0x3", "0x5"]);
        assert_eq!(hashes(&paths[1]), vec!["0x2", "0x4"]);
    }

    #[test]
    fn deployments_are_skipped() {
        let mut store = KnowledgeStore::new();
        store.add_transaction("0x1", Transaction::deployment("A", "0x6080", 99));
        mk(&mut store, "0x2", "A", "B", 10);

        let paths = query_fund_flow(&store, "A", 1);
        assert_eq!(paths.len(), 1);
        assert_eq!(hashes(&paths[0]), vec!["0x2"]);
    }

    #[test]
    fn long_chain_is_traced_without_recursion() {
        const HOPS: usize = 60_000;
        let mut store = KnowledgeStore::new();
        for i in 0..HOPS {
            mk(&mut store, &format!("0x{i:x}"), &format!("N{i}"), &format!("N{}", i + 1), i as u64);
        }

        let paths = query_fund_flow(&store, "N0", HOPS);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), HOPS);
        assert_eq!(paths[0][0].from, "N0");
        assert_eq!(paths[0][HOPS - 1].to, format!("N{HOPS}"));

        // One hop short of the end: the chain dead-ends before the limit.
        assert!(query_fund_flow(&store, "N0", HOPS + 1).is_empty());
    }

    #[test]
    fn hop_serializes_value_as_decimal() {
        let hop = FlowHop {
            tx_hash: "0x1".into(),
            from: "A".into(),
            to: "B".into(),
            value: U256::from(1_000u64),
            timestamp: 5,
        };
        let json = serde_json::to_value(&hop).unwrap();
        assert_eq!(json["value"], "1000");
        assert_eq!(json["timestamp"], 5);
    }
}
