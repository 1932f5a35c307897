//! forensics-analysis crate
//!
//! Read-only analytics over a [`forensics_store::KnowledgeStore`]: the
//! address transfer graph, depth-bounded fund-flow tracing, and splitting,
//! merging and cyclic-transfer detection.

pub mod detector;
pub mod fund_flow;
pub mod transfer_graph;

pub use detector::{
    detect_cyclic_transfers, detect_merging, detect_splitting, detect_suspicious_patterns,
};
pub use fund_flow::{query_fund_flow, FlowHop, FlowPath, DEFAULT_TRACE_DEPTH};
pub use transfer_graph::TransferGraph;
