//! Session plugin wiring for the topology scorer
//!
//! A fresh graph and leader cache are built at every session open, so a
//! new scheduling generation starts from clean state instead of repairing
//! the previous one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use schedlet_core::{
    JobInfo, NodeInfo, Plugin, PluginArguments, Session, TaskInfo, CARD_RESOURCE_NAME,
};

use crate::graph::{TopologyGraph, JOB_TOPO_KEY};
use crate::scorer::{self, DEFAULT_TOPOLOGY_WEIGHT};

/// Name the plugin registers under.
pub const PLUGIN_NAME: &str = "networktopology";

/// Topology-aware node scoring plugin.
pub struct TopologyPlugin {
    arguments: PluginArguments,
}

impl TopologyPlugin {
    pub fn new(arguments: PluginArguments) -> Self {
        Self { arguments }
    }
}

impl Plugin for TopologyPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn on_session_open(&mut self, session: &mut Session) {
        let weight = self.arguments.get_i64("weight", DEFAULT_TOPOLOGY_WEIGHT);
        let mount_topo = self.arguments.get_bool("mountTopo", false);
        let store = session.config_store();

        // One graph per session generation.
        let graph = match TopologyGraph::load(store.as_ref()) {
            Ok(graph) => {
                info!(nodes = graph.len(), "Fabric topology imported");
                Arc::new(graph)
            }
            Err(e) => {
                warn!(error = %e, "Fabric descriptor unavailable, scoring over empty graph");
                Arc::new(TopologyGraph::default())
            }
        };

        // Leaders live exactly as long as this generation.
        let leaders: Arc<Mutex<HashMap<String, String>>> = Arc::default();
        let order_graph = Arc::clone(&graph);
        session.add_batch_node_order_fn(
            PLUGIN_NAME,
            Box::new(move |task: &TaskInfo, nodes: &[NodeInfo]| {
                let mut leaders = leaders
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let leader = leaders
                    .entry(task.job.clone())
                    .or_insert_with(|| {
                        let pick = scorer::elect(nodes, &order_graph, CARD_RESOURCE_NAME);
                        info!(job = %task.job, leader = %pick, "Leader elected");
                        pick
                    })
                    .clone();
                drop(leaders);
                debug!(task = %task.name, leader = %leader, weight, "Scoring nodes");
                scorer::score_nodes(&leader, nodes, weight, &order_graph)
            }),
        );

        if mount_topo {
            let ready_graph = Arc::clone(&graph);
            session.add_job_ready_fn(
                PLUGIN_NAME,
                Box::new(move |job: &JobInfo| {
                    if job.tasks.iter().any(|t| t.node_name.is_empty()) {
                        return false;
                    }
                    let name = scorer::config_map_for_job(&job.name);
                    match store.get(&name, JOB_TOPO_KEY) {
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            let realized = ready_graph.export_job_graph(job);
                            match serde_json::to_string(&realized) {
                                Ok(encoded) => {
                                    if let Err(e) = store.put(&name, JOB_TOPO_KEY, &encoded) {
                                        warn!(job = %job.name, error = %e, "Job topology cache write failed");
                                    } else {
                                        info!(job = %job.name, config = %name, "Job topology cached");
                                    }
                                }
                                Err(e) => {
                                    warn!(job = %job.name, error = %e, "Job topology encode failed")
                                }
                            }
                        }
                        Err(e) => warn!(job = %job.name, error = %e, "Job topology cache read failed"),
                    }
                    true
                }),
            );
        }
    }

    fn on_session_close(&mut self, _session: &mut Session) {}
}
