//! Scheduling-session callback contracts
//!
//! A session lives for one scheduling generation. Plugins register their
//! callbacks at open; the scheduler invokes them once per task/node-set
//! under evaluation, never concurrently against the same live inventory.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::{ConfigStore, MetadataStore, NodeLock};
use crate::error::SchedletResult;
use crate::unit::{JobInfo, NodeInfo, TaskInfo, WorkloadUnit};

/// Outcome of a device filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    Success,
    Unschedulable,
}

/// Per-node device state machine driven by the session.
pub trait Devices {
    /// Whether the unit carries a device request this plugin handles.
    fn has_device_request(&self, unit: &WorkloadUnit) -> bool;

    /// Predicate phase: can the unit's device demand fit this node right
    /// now? Must not mutate live inventory. The string carries the
    /// diagnostic reason on [`FilterStatus::Unschedulable`].
    fn filter_node(&self, unit: &WorkloadUnit) -> (FilterStatus, String);

    /// Commit phase: decide the assignment, persist it as unit metadata,
    /// then update live inventory.
    fn allocate(
        &mut self,
        metadata: &dyn MetadataStore,
        lock: &dyn NodeLock,
        unit: &WorkloadUnit,
    ) -> SchedletResult<()>;

    /// Replay a persisted assignment onto live inventory (unit added).
    fn add_resource(&mut self, unit: &WorkloadUnit);

    /// Reverse a persisted assignment on live inventory (unit removed).
    fn sub_resource(&mut self, unit: &WorkloadUnit);

    /// Unit teardown beyond what [`Devices::sub_resource`] already does.
    fn release(&self, unit: &WorkloadUnit) -> SchedletResult<()>;
}

/// Per-task node scores, higher preferred.
pub type BatchNodeOrderFn = Box<dyn Fn(&TaskInfo, &[NodeInfo]) -> HashMap<String, f64> + Send>;

/// Whether a job has everything it needs to run.
pub type JobReadyFn = Box<dyn Fn(&JobInfo) -> bool + Send>;

/// String-keyed plugin arguments with lenient typed lookups.
#[derive(Debug, Clone, Default)]
pub struct PluginArguments(HashMap<String, String>);

impl PluginArguments {
    pub fn new(arguments: HashMap<String, String>) -> Self {
        Self(arguments)
    }

    /// Integer argument; unparsable or absent values yield `default`.
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.0
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Boolean argument; unparsable or absent values yield `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.0
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for PluginArguments {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// One scheduling generation's callback registries.
pub struct Session {
    config_store: Arc<dyn ConfigStore>,
    node_order_fns: Vec<(String, BatchNodeOrderFn)>,
    job_ready_fns: Vec<(String, JobReadyFn)>,
}

impl Session {
    pub fn new(config_store: Arc<dyn ConfigStore>) -> Self {
        Self {
            config_store,
            node_order_fns: Vec::new(),
            job_ready_fns: Vec::new(),
        }
    }

    /// Handle plugins use to reach cluster config objects.
    pub fn config_store(&self) -> Arc<dyn ConfigStore> {
        Arc::clone(&self.config_store)
    }

    pub fn add_batch_node_order_fn(&mut self, plugin: &str, f: BatchNodeOrderFn) {
        self.node_order_fns.push((plugin.to_string(), f));
    }

    pub fn add_job_ready_fn(&mut self, plugin: &str, f: JobReadyFn) {
        self.job_ready_fns.push((plugin.to_string(), f));
    }

    /// Aggregate node scores for a task: per-node sum over all registered
    /// scoring functions.
    pub fn batch_node_order(&self, task: &TaskInfo, nodes: &[NodeInfo]) -> HashMap<String, f64> {
        let mut totals: HashMap<String, f64> = HashMap::new();
        for (_, f) in &self.node_order_fns {
            for (node, score) in f(task, nodes) {
                *totals.entry(node).or_insert(0.0) += score;
            }
        }
        totals
    }

    /// A job is ready only when every registered gate agrees.
    pub fn job_ready(&self, job: &JobInfo) -> bool {
        self.job_ready_fns.iter().all(|(_, f)| f(job))
    }
}

/// A named scheduler extension wired up per session generation.
pub trait Plugin {
    fn name(&self) -> &str;

    /// Register callbacks and build generation-scoped state.
    fn on_session_open(&mut self, session: &mut Session);

    /// Tear down at the end of the generation.
    fn on_session_close(&mut self, session: &mut Session);
}
