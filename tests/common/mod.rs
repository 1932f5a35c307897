//! Shared test helpers and utilities.
//!
//! Factory functions for addresses, hashes and transactions with sensible
//! defaults, plus a few canned stores used across test files.

#![allow(dead_code)]

use alloy::primitives::U256;
use forensics_store::{KnowledgeStore, Transaction, WEI_PER_ETHER};

/// Base timestamp, aligned to an hour bucket.
pub const T0: u64 = 1_708_603_200;

/// Deterministic 20-byte address for index `n`.
pub fn addr(n: u64) -> String {
    format!("0x{n:040x}")
}

/// Deterministic 32-byte transaction hash for index `n`.
pub fn tx_hash(n: u64) -> String {
    format!("0x{n:064x}")
}

/// Whole ether amount in wei.
pub fn eth(n: u64) -> U256 {
    U256::from(n) * WEI_PER_ETHER
}

/// A plain 1 ETH transfer.
pub fn transfer(from: &str, to: &str, timestamp: u64) -> Transaction {
    Transaction::transfer(from, to, eth(1), timestamp)
}

/// Insert a 1 ETH transfer under `hash`.
pub fn add(store: &mut KnowledgeStore, hash: &str, from: &str, to: &str, timestamp: u64) -> bool {
    store.add_transaction(hash, transfer(from, to, timestamp))
}

/// `S` sends to `B..F` within one hour: the canonical fan-out example.
pub fn fan_out_store() -> KnowledgeStore {
    let mut store = KnowledgeStore::new();
    for (i, to) in ["B", "C", "D", "E", "F"].iter().enumerate() {
        add(&mut store, &format!("h{}", i + 1), "S", to, T0 + 60 * i as u64);
    }
    store
}

/// `A -> B -> C -> A`, one transaction per edge.
pub fn triangle_store() -> KnowledgeStore {
    let mut store = KnowledgeStore::new();
    add(&mut store, "t1", "A", "B", T0);
    add(&mut store, "t2", "B", "C", T0 + 10);
    add(&mut store, "t3", "C", "A", T0 + 20);
    store
}
