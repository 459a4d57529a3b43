//! Fabric topology graph and all-pairs shortest distances
//!
//! The graph is rebuilt once per session generation from the `topo.json`
//! descriptor; the distance matrix is derived data closed under
//! shortest-path composition.

use serde::{Deserialize, Serialize};
use tracing::debug;

use schedlet_core::{ConfigStore, JobInfo, SchedletError, SchedletResult};

/// Tier of a compute node at the fabric edge.
pub const TIER_COMPUTE: u8 = 0;
/// Tier of a leaf aggregation switch.
pub const TIER_LEAF: u8 = 1;
/// Tier of a spine core switch.
pub const TIER_SPINE: u8 = 2;

/// Distance assigned to pairs with no fabric path.
pub const UNREACHABLE: i64 = 10_000;

/// Config object holding the fabric descriptor.
pub const TOPO_CONFIG_NAME: &str = "nettopo";
/// Descriptor key inside [`TOPO_CONFIG_NAME`].
pub const TOPO_DESCRIPTOR_KEY: &str = "topo.json";
/// Key under which a job's realized task graph is cached.
pub const JOB_TOPO_KEY: &str = "nettopo.json";

/// Directed weighted link to another fabric node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricEdge {
    pub dest: String,
    pub weight: u32,
}

/// One node of the fabric: a compute host or a switching tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricNode {
    pub id: String,
    #[serde(rename = "type")]
    pub tier: u8,
    #[serde(default)]
    pub connect: Vec<FabricEdge>,
}

/// Weighted fabric graph with its derived distance matrix.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    nodes: Vec<FabricNode>,
    distance: Vec<Vec<i64>>,
}

impl TopologyGraph {
    /// Build the graph and close its distance matrix. Edges naming an
    /// unknown destination are dropped, not an error.
    pub fn from_descriptor(nodes: Vec<FabricNode>) -> Self {
        let mut graph = Self {
            nodes,
            distance: Vec::new(),
        };
        graph.initial_distance();
        graph.close();
        graph
    }

    /// Read the descriptor from the cluster and build.
    pub fn load(store: &dyn ConfigStore) -> SchedletResult<Self> {
        let raw = store
            .get(TOPO_CONFIG_NAME, TOPO_DESCRIPTOR_KEY)?
            .ok_or_else(|| {
                SchedletError::Config(format!(
                    "{TOPO_DESCRIPTOR_KEY} not found in {TOPO_CONFIG_NAME}"
                ))
            })?;
        let nodes: Vec<FabricNode> = serde_json::from_str(&raw)?;
        debug!(nodes = nodes.len(), "Fabric descriptor parsed");
        Ok(Self::from_descriptor(nodes))
    }

    fn initial_distance(&mut self) {
        let n = self.nodes.len();
        self.distance = vec![vec![UNREACHABLE; n]; n];
        for row in 0..n {
            self.distance[row][row] = 0;
            for edge in &self.nodes[row].connect {
                let Some(dst) = self.node_index(&edge.dest) else {
                    continue;
                };
                self.distance[row][dst] = i64::from(edge.weight);
            }
        }
    }

    /// Shortest-path closure: relax every (mid, left, right) triple,
    /// repeating until a full pass makes no reduction.
    fn close(&mut self) {
        let n = self.nodes.len();
        loop {
            let mut reduced = false;
            for mid in 0..n {
                for left in 0..n {
                    for right in 0..n {
                        let through = self.distance[left][mid] + self.distance[mid][right];
                        if through < self.distance[left][right] {
                            self.distance[left][right] = through;
                            reduced = true;
                        }
                    }
                }
            }
            if !reduced {
                break;
            }
        }
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == name)
    }

    /// Fabric distance between two named nodes. Unknown names resolve to
    /// the first node, matching the reference behavior; the empty graph
    /// measures every pair at zero.
    pub fn distance(&self, a: &str, b: &str) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let i = self.node_index(a).unwrap_or(0);
        let j = self.node_index(b).unwrap_or(0);
        self.distance[i][j] as f64
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[FabricNode] {
        &self.nodes
    }

    /// Realized task-to-task distance graph for a fully bound job: one
    /// compute-tier node per task, fully connected with the measured
    /// distances between the tasks' bound nodes.
    pub fn export_job_graph(&self, job: &JobInfo) -> Vec<FabricNode> {
        job.tasks
            .iter()
            .map(|task| FabricNode {
                id: task.name.clone(),
                tier: TIER_COMPUTE,
                connect: job
                    .tasks
                    .iter()
                    .map(|peer| FabricEdge {
                        dest: peer.name.clone(),
                        weight: self.distance(&task.node_name, &peer.node_name) as u32,
                    })
                    .collect(),
            })
            .collect()
    }
}
