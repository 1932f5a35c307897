//! Structural pattern detection over the full transaction set.
//!
//! Three independent passes:
//! 1. Splitting: one sender, many recipients, within one hour bucket
//! 2. Merging: many senders, one recipient, within one hour bucket
//! 3. Cyclic transfers: funds returning to an address through a chain
//!
//! Hour buckets are aligned to the epoch (`ts - ts % 3600`), not sliding.
//! Every pass is a full scan; nothing is cached between calls.

use std::collections::{BTreeMap, BTreeSet};

use forensics_store::{KnowledgeStore, Pattern};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::NodeIndex;
use petgraph::visit::{VisitMap, Visitable};
use tracing::{debug, info};

use crate::transfer_graph::TransferGraph;

/// Width of a grouping bucket in seconds.
pub const TIME_WINDOW_SECS: u64 = 3600;

/// Minimum transactions in one bucket for a splitting or merging finding.
pub const MIN_GROUP_TRANSACTIONS: usize = 5;

/// Minimum distinct counterparties in one bucket for a splitting or merging finding.
pub const MIN_DISTINCT_COUNTERPARTIES: usize = 3;

pub fn window_start(timestamp: u64) -> u64 {
    timestamp - timestamp % TIME_WINDOW_SECS
}

/// Transactions of one `(address, window)` bucket and the distinct
/// counterparties they touch.
#[derive(Default)]
struct Bucket<'a> {
    transactions: Vec<&'a str>,
    counterparties: BTreeSet<&'a str>,
}

impl Bucket<'_> {
    fn qualifies(&self) -> bool {
        self.transactions.len() >= MIN_GROUP_TRANSACTIONS
            && self.counterparties.len() >= MIN_DISTINCT_COUNTERPARTIES
    }

    fn hashes(&self) -> Vec<String> {
        self.transactions.iter().map(|h| h.to_string()).collect()
    }
}

/// Fan-out: a sender moving funds to many distinct recipients in one hour.
pub fn detect_splitting(store: &KnowledgeStore) -> Vec<Pattern> {
    let mut buckets: BTreeMap<(&str, u64), Bucket<'_>> = BTreeMap::new();
    for (hash, tx) in store.transactions() {
        let Some(from) = tx.sender() else { continue };
        let bucket = buckets.entry((from, window_start(tx.timestamp))).or_default();
        bucket.transactions.push(hash);
        bucket.counterparties.extend(tx.receiver());
    }

    buckets
        .into_iter()
        .filter(|(_, bucket)| bucket.qualifies())
        .map(|((from, window), bucket)| Pattern::FundSplitting {
            from_address: from.to_string(),
            window_start: window,
            recipient_count: bucket.counterparties.len(),
            transaction_count: bucket.transactions.len(),
            transactions: bucket.hashes(),
        })
        .collect()
}

/// Fan-in: a recipient collecting funds from many distinct senders in one hour.
pub fn detect_merging(store: &KnowledgeStore) -> Vec<Pattern> {
    let mut buckets: BTreeMap<(&str, u64), Bucket<'_>> = BTreeMap::new();
    for (hash, tx) in store.transactions() {
        let Some(to) = tx.receiver() else { continue };
        let bucket = buckets.entry((to, window_start(tx.timestamp))).or_default();
        bucket.transactions.push(hash);
        bucket.counterparties.extend(tx.sender());
    }

    buckets
        .into_iter()
        .filter(|(_, bucket)| bucket.qualifies())
        .map(|((to, window), bucket)| Pattern::FundMerging {
            to_address: to.to_string(),
            window_start: window,
            sender_count: bucket.counterparties.len(),
            transaction_count: bucket.transactions.len(),
            transactions: bucket.hashes(),
        })
        .collect()
}

/// Depth-first search from `start` for the first edge back into the current
/// path. Returns the cycle as the path suffix starting at the repeated node.
///
/// Successors are explored in address order. Nodes fully explored in this
/// search are not entered again.
fn find_cycle(graph: &TransferGraph, start: NodeIndex) -> Option<Vec<NodeIndex>> {
    let mut visited = graph.graph.visit_map();
    let mut on_path = graph.graph.visit_map();
    let mut path = vec![start];
    let mut frames = vec![(graph.successors(start), 0usize)];
    visited.visit(start);
    on_path.visit(start);

    while let Some((successors, next)) = frames.last_mut() {
        let Some(&neighbor) = successors.get(*next) else {
            frames.pop();
            if let Some(done) = path.pop() {
                on_path.set(done.index(), false);
            }
            continue;
        };
        *next += 1;

        if visited.visit(neighbor) {
            on_path.visit(neighbor);
            path.push(neighbor);
            frames.push((graph.successors(neighbor), 0));
        } else if on_path.is_visited(&neighbor) {
            let cycle_start = path.iter().position(|&ix| ix == neighbor)?;
            return Some(path.split_off(cycle_start));
        }
    }

    None
}

/// Rotation of `cycle` beginning at its smallest address, used to recognise
/// the same cycle found from different starting nodes.
fn canonical_rotation(graph: &TransferGraph, cycle: &[NodeIndex]) -> Vec<NodeIndex> {
    let pivot = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| graph.address(*a.1).cmp(graph.address(*b.1)))
        .map_or(0, |(i, _)| i);
    cycle[pivot..].iter().chain(&cycle[..pivot]).copied().collect()
}

/// Funds returning to their origin through a chain of transfers.
///
/// Searches from every sender in address order and keeps the first cycle
/// each search finds. A cycle reached from several starting nodes is
/// reported once, with its addresses in the order of the first discovery.
pub fn detect_cyclic_transfers(store: &KnowledgeStore) -> Vec<Pattern> {
    let graph = TransferGraph::from_store(store);
    if !is_cyclic_directed(&graph.graph) {
        return Vec::new();
    }

    let mut seen: BTreeSet<Vec<NodeIndex>> = BTreeSet::new();
    let mut findings = Vec::new();

    for start in graph.senders() {
        let Some(cycle) = find_cycle(&graph, start) else {
            continue;
        };
        if !seen.insert(canonical_rotation(&graph, &cycle)) {
            debug!(start = graph.address(start), "cycle already reported");
            continue;
        }

        let transactions = cycle
            .iter()
            .zip(cycle.iter().cycle().skip(1))
            .flat_map(|(&from, &to)| graph.edge_hashes(from, to))
            .map(str::to_string)
            .collect();

        findings.push(Pattern::CyclicTransfer {
            addresses: cycle.iter().map(|&ix| graph.address(ix).to_string()).collect(),
            transactions,
        });
    }

    findings
}

/// Run all three passes: splitting findings first, then merging, then cycles.
#[tracing::instrument(skip_all)]
pub fn detect_suspicious_patterns(store: &KnowledgeStore) -> Vec<Pattern> {
    let splitting = detect_splitting(store);
    let merging = detect_merging(store);
    let cyclic = detect_cyclic_transfers(store);

    info!(
        transactions = store.transaction_count(),
        splitting = splitting.len(),
        merging = merging.len(),
        cyclic = cyclic.len(),
        "pattern detection finished"
    );

    let mut findings = splitting;
    findings.extend(merging);
    findings.extend(cyclic);
    findings
}
