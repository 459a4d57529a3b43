//! schedlet-topology: Network-topology-aware node scoring
//!
//! This crate ranks candidate nodes by cluster-fabric distance to a
//! per-job leader node:
//! - Weighted fabric graph built from a cluster descriptor
//! - All-pairs shortest-path distance matrix
//! - Leader election and distance-based scoring
//! - Session plugin wiring, including the optional job-readiness gate

pub mod graph;
pub mod plugin;
pub mod scorer;

pub use graph::{FabricEdge, FabricNode, TopologyGraph};
pub use plugin::TopologyPlugin;
