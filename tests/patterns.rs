//! Integration tests for insertion-time flags and the detection passes.

mod common;

use alloy::primitives::U256;
use common::{add, addr, eth, fan_out_store, triangle_store, tx_hash, T0};
use forensics_analysis::{detect_merging, detect_splitting, detect_suspicious_patterns};
use forensics_store::{KnowledgeStore, Pattern, Transaction, LARGE_TRANSFER_THRESHOLD};

fn count_kind(findings: &[Pattern], kind: &str) -> usize {
    findings.iter().filter(|p| p.as_str() == kind).count()
}

/// The canonical fan-out scenario: values 1..=5 wei from S to B..F in one hour.
#[test]
fn fan_out_scenario_yields_exactly_one_splitting_finding() {
    let mut store = KnowledgeStore::new();
    for (i, to) in ["B", "C", "D", "E", "F"].iter().enumerate() {
        let tx = Transaction::transfer("S", to, U256::from(i as u64 + 1), T0 + 100 * i as u64);
        assert!(store.add_transaction(&format!("h{}", i + 1), tx));
    }

    let findings = detect_suspicious_patterns(&store);
    assert_eq!(count_kind(&findings, "fund_splitting"), 1);
    assert_eq!(count_kind(&findings, "fund_merging"), 0);
    assert_eq!(count_kind(&findings, "cyclic_transfer"), 0);

    let splitting = &findings[0];
    assert!(splitting.involves("S"));
    let mut hashes = splitting.transactions();
    hashes.sort_unstable();
    assert_eq!(hashes, vec!["h1", "h2", "h3", "h4", "h5"]);
}

#[test]
fn five_transfers_to_three_receivers_counts_both() {
    let mut store = KnowledgeStore::new();
    for (i, to) in ["B", "C", "D", "B", "C"].iter().enumerate() {
        add(&mut store, &tx_hash(i as u64), "S", to, T0 + i as u64);
    }

    let findings = detect_splitting(&store);
    assert_eq!(findings.len(), 1);
    match &findings[0] {
        Pattern::FundSplitting {
            from_address,
            recipient_count,
            transaction_count,
            window_start,
            ..
        } => {
            assert_eq!(from_address, "S");
            assert_eq!(*recipient_count, 3);
            assert_eq!(*transaction_count, 5);
            assert_eq!(*window_start, T0);
        }
        other => panic!("unexpected finding {other:?}"),
    }
}

#[test]
fn four_transfers_are_not_enough() {
    let mut store = KnowledgeStore::new();
    for (i, to) in ["B", "C", "D", "E"].iter().enumerate() {
        add(&mut store, &tx_hash(i as u64), "S", to, T0 + i as u64);
    }
    assert!(detect_suspicious_patterns(&store).is_empty());
}

#[test]
fn merging_mirrors_splitting() {
    let mut store = KnowledgeStore::new();
    for (i, from) in ["B", "C", "D", "B", "C"].iter().enumerate() {
        add(&mut store, &tx_hash(i as u64), from, "R", T0 + i as u64);
    }

    let findings = detect_merging(&store);
    assert_eq!(findings.len(), 1);
    assert!(matches!(
        &findings[0],
        Pattern::FundMerging { to_address, sender_count: 3, transaction_count: 5, .. }
            if to_address == "R"
    ));
    assert!(detect_splitting(&store).is_empty());

    let mut four = KnowledgeStore::new();
    for (i, from) in ["B", "C", "D", "E"].iter().enumerate() {
        add(&mut four, &tx_hash(i as u64), from, "R", T0 + i as u64);
    }
    assert!(detect_merging(&four).is_empty());
}

#[test]
fn separate_hours_are_separate_groups() {
    let mut store = fan_out_store();
    for (i, to) in ["G", "H", "I", "J", "K"].iter().enumerate() {
        add(&mut store, &format!("late{i}"), "S", to, T0 + 7200 + i as u64);
    }
    let findings = detect_splitting(&store);
    assert_eq!(findings.len(), 2);
    assert!(findings.iter().all(|f| f.transactions().len() == 5));
}

#[test]
fn triangle_yields_one_cycle_with_all_hashes() {
    let findings = detect_suspicious_patterns(&triangle_store());
    assert_eq!(findings.len(), 1);

    match &findings[0] {
        Pattern::CyclicTransfer { addresses, transactions } => {
            let mut nodes = addresses.clone();
            nodes.sort();
            assert_eq!(nodes, vec!["A", "B", "C"]);
            let mut hashes = transactions.clone();
            hashes.sort();
            assert_eq!(hashes, vec!["t1", "t2", "t3"]);
        }
        other => panic!("unexpected finding {other:?}"),
    }
}

#[test]
fn duplicate_insert_is_a_no_op() {
    let mut store = KnowledgeStore::new();
    let big = Transaction::transfer(&addr(1), &addr(2), eth(150), T0);
    assert!(store.add_transaction("0xabc", big.clone()));
    let before = store.clone();

    let mut altered = big;
    altered.to = Some(addr(3));
    assert!(!store.add_transaction("0xabc", altered));

    assert_eq!(store, before);
    assert_eq!(store.transaction_count(), 1);
    assert_eq!(store.get_entity(&addr(1)).map(|e| e.transactions.len()), Some(1));
    assert!(store.get_entity(&addr(3)).is_none());
    assert_eq!(store.pattern_count(), 1);
}

#[test]
fn large_transfer_flag_is_strictly_above_threshold() {
    let mut store = KnowledgeStore::new();
    let values = [
        ("at", LARGE_TRANSFER_THRESHOLD),
        ("above", LARGE_TRANSFER_THRESHOLD + U256::from(1)),
        ("below", LARGE_TRANSFER_THRESHOLD - U256::from(1)),
        ("huge", eth(1_000_000)),
    ];
    for (hash, value) in values {
        store.add_transaction(hash, Transaction::transfer(&addr(1), &addr(2), value, T0));
    }

    assert!(store.get_pattern("large_transfer:at").is_none());
    assert!(store.get_pattern("large_transfer:below").is_none());
    assert!(store.get_pattern("large_transfer:above").is_some());
    assert!(matches!(
        store.get_pattern("large_transfer:huge"),
        Some(Pattern::LargeTransfer { value, .. }) if *value == eth(1_000_000)
    ));
}

#[test]
fn contract_creation_attributed_to_sender() {
    let mut store = KnowledgeStore::new();
    store.add_transaction("0xd1", Transaction::deployment(&addr(7), "0x6080604052", T0));
    store.add_transaction("0xd2", Transaction::deployment(&addr(7), "0x", T0));

    assert!(store.get_pattern("contract_creation:0xd2").is_none());
    let patterns = store.patterns_for(&addr(7));
    assert_eq!(patterns.len(), 1);
    assert!(matches!(
        patterns[0],
        Pattern::ContractCreation { tx_hash, .. } if tx_hash == "0xd1"
    ));
}

#[test]
fn large_transfer_given_as_plain_integer_is_flagged() {
    let record = r#"{"from": "S", "to": "B", "value": 150000000000000000000, "timestamp": 1708603200}"#;
    let tx: Transaction = serde_json::from_str(record).unwrap();
    assert!(tx.value > LARGE_TRANSFER_THRESHOLD);

    let mut store = KnowledgeStore::new();
    assert!(store.add_transaction("0xbig", tx));
    match store.get_pattern("large_transfer:0xbig") {
        Some(Pattern::LargeTransfer { value, .. }) => {
            assert_eq!(*value, U256::from(150_000_000_000_000_000_000u128));
        }
        other => panic!("expected large transfer, got {other:?}"),
    }
}
