//! Workload-unit, task, job, and node models consumed by the plugins

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Node the unit's devices were assigned on.
pub const ASSIGNED_NODE_ANNOTATION: &str = "schedlet.io/assigned-node";
/// Assignment time, unix seconds as a decimal string.
pub const ASSIGNED_TIME_ANNOTATION: &str = "schedlet.io/assigned-time";
/// The assignment record, in the codec format.
pub const ASSIGNED_IDS_ANNOTATION: &str = "schedlet.io/assigned-ids";
/// Copy of the assignment record consumed by the node-side agent.
pub const IDS_TO_ALLOCATE_ANNOTATION: &str = "schedlet.io/ids-to-allocate";
/// Bind-phase marker, set to [`BIND_PHASE_ALLOCATING`] on allocate.
pub const BIND_PHASE_ANNOTATION: &str = "schedlet.io/bind-phase";
/// Bind time, unix seconds as a decimal string.
pub const BIND_TIME_ANNOTATION: &str = "schedlet.io/bind-time";

/// Bind-phase value written on successful allocation.
pub const BIND_PHASE_ALLOCATING: &str = "allocating";

/// Container resource name carrying the requested core count; also the
/// node capacity resource counting total cores.
pub const CORE_RESOURCE_NAME: &str = "accel.io/cores";
/// Node capacity resource counting physical accelerator cards.
pub const CARD_RESOURCE_NAME: &str = "accel.io/card";
/// Owner name used when taking the allocate-phase node lock.
pub const DEVICE_LOCK_NAME: &str = "accelcore";

/// A single container's resource-limit signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Resource limits by resource name.
    pub limits: HashMap<String, i64>,
}

impl ContainerSpec {
    /// Container with a single scalar limit.
    pub fn with_limit(name: &str, value: i64) -> Self {
        Self {
            limits: HashMap::from([(name.to_string(), value)]),
        }
    }
}

/// A schedulable workload unit and its persisted metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadUnit {
    pub name: String,
    pub namespace: String,
    pub uid: Uuid,
    /// Persisted string metadata, keyed by annotation name.
    pub annotations: HashMap<String, String>,
    pub containers: Vec<ContainerSpec>,
}

impl WorkloadUnit {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: Uuid::new_v4(),
            annotations: HashMap::new(),
            containers: Vec::new(),
        }
    }

    /// Whether any container carries a limit under `resource_name`.
    pub fn requests_resource(&self, resource_name: &str) -> bool {
        self.containers
            .iter()
            .any(|c| c.limits.contains_key(resource_name))
    }
}

/// One task of a job under scheduling.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: String,
    /// Identifier of the owning job.
    pub job: String,
    /// Bound node name; empty until the task is placed.
    pub node_name: String,
    pub unit: WorkloadUnit,
}

/// A job and its tasks.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub name: String,
    pub uid: Uuid,
    pub tasks: Vec<TaskInfo>,
}

/// Scalar capacity signals of a node, read-only.
#[derive(Debug, Clone, Default)]
pub struct NodeCapacity {
    pub scalar: HashMap<String, i64>,
}

/// Candidate node view handed to the scoring callbacks.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    pub capacity: NodeCapacity,
    /// Idle scalar resources by resource name.
    pub idle: HashMap<String, f64>,
}

impl NodeInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capacity: NodeCapacity::default(),
            idle: HashMap::new(),
        }
    }

    /// Node advertising accelerator capacity: `cards` physical cards
    /// totalling `cores` compute cores.
    pub fn with_accel_capacity(name: &str, cores: i64, cards: i64) -> Self {
        let mut node = Self::new(name);
        node.capacity
            .scalar
            .insert(CORE_RESOURCE_NAME.to_string(), cores);
        node.capacity
            .scalar
            .insert(CARD_RESOURCE_NAME.to_string(), cards);
        node
    }
}
