//! Leader election and distance-based node scoring

use std::collections::HashMap;

use schedlet_core::NodeInfo;

use crate::graph::TopologyGraph;

/// Base score every candidate starts from.
pub const BASE_SCORE: f64 = 10_000.0;
/// Default multiplier applied to the leader distance.
pub const DEFAULT_TOPOLOGY_WEIGHT: i64 = 200;
/// Election sums at or above this sentinel never win.
const ELECTION_MAX: f64 = 2_000_000_000.0;

/// Length of the unique suffix a job identifier carries (`-` plus a
/// 36-character UUID).
const JOB_SUFFIX_LEN: usize = 37;

/// Elect the job leader: the candidate whose idle-weighted distance sum
/// over all candidates is smallest. The weight of every term is the
/// candidate's own idle count, not the peer's; this asymmetry mirrors the
/// reference behavior exactly. Returns an empty name when no candidate
/// beats the sentinel.
pub fn elect(nodes: &[NodeInfo], graph: &TopologyGraph, idle_resource: &str) -> String {
    let mut min = ELECTION_MAX;
    let mut pick = String::new();
    for candidate in nodes {
        let idle = candidate.idle.get(idle_resource).copied().unwrap_or(0.0);
        let sum: f64 = nodes
            .iter()
            .map(|peer| idle * graph.distance(&candidate.name, &peer.name))
            .sum();
        if sum < min {
            min = sum;
            pick = candidate.name.clone();
        }
    }
    pick
}

/// Score every candidate by fabric distance to the leader. Higher is
/// preferred; the value is not clamped and may go negative.
pub fn score_nodes(
    leader: &str,
    nodes: &[NodeInfo],
    weight: i64,
    graph: &TopologyGraph,
) -> HashMap<String, f64> {
    nodes
        .iter()
        .map(|n| {
            (
                n.name.clone(),
                BASE_SCORE - weight as f64 * graph.distance(leader, &n.name),
            )
        })
        .collect()
}

/// Config object caching a job's realized topology: the job name minus its
/// fixed-width unique suffix, plus `-cm`. The suffix convention lives only
/// here so it can be swapped if the identifier format changes.
pub fn config_map_for_job(job_name: &str) -> String {
    let stem = if job_name.len() > JOB_SUFFIX_LEN {
        &job_name[..job_name.len() - JOB_SUFFIX_LEN]
    } else {
        job_name
    };
    format!("{stem}-cm")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FabricEdge, FabricNode, TIER_COMPUTE};
    use schedlet_core::CARD_RESOURCE_NAME;

    fn line_graph() -> TopologyGraph {
        // a - b - c in a line, 5 per hop.
        let node = |id: &str, edges: &[(&str, u32)]| FabricNode {
            id: id.to_string(),
            tier: TIER_COMPUTE,
            connect: edges
                .iter()
                .map(|&(dest, weight)| FabricEdge {
                    dest: dest.to_string(),
                    weight,
                })
                .collect(),
        };
        TopologyGraph::from_descriptor(vec![
            node("a", &[("b", 5)]),
            node("b", &[("a", 5), ("c", 5)]),
            node("c", &[("b", 5)]),
        ])
    }

    fn candidate(name: &str, idle_cards: f64) -> NodeInfo {
        let mut node = NodeInfo::new(name);
        node.idle.insert(CARD_RESOURCE_NAME.to_string(), idle_cards);
        node
    }

    #[test]
    fn test_elect_prefers_central_node() {
        let graph = line_graph();
        let nodes = vec![
            candidate("a", 2.0),
            candidate("b", 2.0),
            candidate("c", 2.0),
        ];
        // Equal idle weight: b has the smallest aggregate distance.
        assert_eq!(elect(&nodes, &graph, CARD_RESOURCE_NAME), "b");
    }

    #[test]
    fn test_elect_weighting_is_own_idle_count() {
        let graph = line_graph();
        // a: 1 idle * (0 + 5 + 10) = 15; b: 4 idle * (5 + 0 + 5) = 40.
        // The candidate's own idle count scales its whole sum, so the
        // fringe node with less idle capacity wins over the central one.
        let nodes = vec![candidate("a", 1.0), candidate("b", 4.0), candidate("c", 4.0)];
        assert_eq!(elect(&nodes, &graph, CARD_RESOURCE_NAME), "a");
    }

    #[test]
    fn test_elect_zero_idle_short_circuits() {
        let graph = line_graph();
        // Zero idle weight zeroes the sum regardless of distances; first
        // such candidate wins.
        let nodes = vec![candidate("a", 3.0), candidate("c", 0.0)];
        assert_eq!(elect(&nodes, &graph, CARD_RESOURCE_NAME), "c");
    }

    #[test]
    fn test_elect_empty_candidates() {
        let graph = line_graph();
        assert_eq!(elect(&[], &graph, CARD_RESOURCE_NAME), "");
    }

    #[test]
    fn test_score_formula() {
        let graph = line_graph();
        let nodes = vec![candidate("a", 1.0), candidate("b", 1.0), candidate("c", 1.0)];
        let scores = score_nodes("a", &nodes, 200, &graph);

        assert_eq!(scores["a"], 10_000.0);
        assert_eq!(scores["b"], 10_000.0 - 200.0 * 5.0);
        assert_eq!(scores["c"], 10_000.0 - 200.0 * 10.0);
    }

    #[test]
    fn test_score_can_go_negative() {
        let graph = TopologyGraph::from_descriptor(vec![
            FabricNode {
                id: "a".to_string(),
                tier: TIER_COMPUTE,
                connect: Vec::new(),
            },
            FabricNode {
                id: "b".to_string(),
                tier: TIER_COMPUTE,
                connect: Vec::new(),
            },
        ]);
        let scores = score_nodes("a", &[candidate("b", 1.0)], 200, &graph);
        // Unreachable pair: 10000 - 200 * 10000, far below zero, unclamped.
        assert_eq!(scores["b"], 10_000.0 - 200.0 * 10_000.0);
    }

    #[test]
    fn test_config_map_for_job_strips_suffix() {
        let job = "train-resnet-7f3a2b1c-9d4e-4f5a-8b6c-0d1e2f3a4b5c";
        assert_eq!(config_map_for_job(job), "train-resnet-cm");
    }

    #[test]
    fn test_config_map_for_short_name() {
        assert_eq!(config_map_for_job("tiny"), "tiny-cm");
    }
}
