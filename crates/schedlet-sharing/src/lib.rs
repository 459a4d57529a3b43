//! schedlet-sharing: Accelerator core-sharing device plugin
//!
//! This crate partitions the physical compute cores of a node's accelerator
//! cards across workload units:
//! - Per-node card inventory with snapshot support
//! - Bitmask bin-packing in shared and exclusive modes
//! - The device plugin state machine (filter, allocate, add, sub, release)

pub mod device;
pub mod planner;
pub mod plugin;

pub use device::{AccelCard, AccelCardSet};
pub use planner::{container_requests, plan_allocation, CoreRequest};
pub use plugin::AccelSharing;
