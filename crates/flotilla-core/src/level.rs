//! Kahn-style topological leveling of the package graph.
//!
//! Levels group nodes by longest-path depth from the leaves so that the
//! executor can run a whole level in parallel: for every edge `A → B`
//! (A depends on B), `level(B) < level(A)`.

use std::collections::HashMap;

use crate::error::{EcosystemError, EcosystemResult};
use crate::graph::DagNode;

/// The leveled execution plan.
#[derive(Debug, Clone)]
pub struct LeveledGraph {
    /// Every node, keyed by name, with `level` assigned.
    pub nodes: HashMap<String, DagNode>,
    /// Node names grouped by level; index = level. Order within a level is
    /// not significant — the executor treats a level as an unordered set.
    pub levels: Vec<Vec<String>>,
    /// Nodes with no in-graph dependents.
    pub roots: Vec<String>,
    /// Nodes with no in-graph dependencies.
    pub leaves: Vec<String>,
}

impl LeveledGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Assign levels via Kahn's algorithm with per-wave tracking.
///
/// Fails with [`EcosystemError::CycleDetected`] naming every node that
/// still has positive residual in-degree when the frontier empties.
pub fn build_leveled_graph(mut nodes: HashMap<String, DagNode>) -> EcosystemResult<LeveledGraph> {
    // In-degree within the graph = count of intra-graph dependencies.
    let mut in_degree: HashMap<String, usize> = nodes
        .iter()
        .map(|(name, node)| (name.clone(), node.dependencies.len()))
        .collect();

    // Reverse index: dependency → dependents.
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    for node in nodes.values() {
        for dep in &node.dependencies {
            dependents
                .entry(dep.clone())
                .or_default()
                .push(node.name.clone());
        }
    }

    let mut frontier: Vec<String> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(name, _)| name.clone())
        .collect();
    frontier.sort_unstable();

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut emitted = 0usize;

    while !frontier.is_empty() {
        let level = levels.len();
        let mut next: Vec<String> = Vec::new();

        for name in &frontier {
            if let Some(node) = nodes.get_mut(name) {
                node.level = level;
            }
            emitted += 1;
            for dependent in dependents.get(name).into_iter().flatten() {
                let deg = in_degree
                    .get_mut(dependent)
                    .expect("dependent is a graph member");
                *deg -= 1;
                if *deg == 0 {
                    next.push(dependent.clone());
                }
            }
        }

        next.sort_unstable();
        levels.push(std::mem::take(&mut frontier));
        frontier = next;
    }

    if emitted < nodes.len() {
        let mut stuck: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(name, _)| name)
            .collect();
        stuck.sort_unstable();
        return Err(EcosystemError::CycleDetected { nodes: stuck });
    }

    let mut roots: Vec<String> = nodes
        .keys()
        .filter(|name| !dependents.contains_key(*name))
        .cloned()
        .collect();
    roots.sort_unstable();

    let mut leaves: Vec<String> = nodes
        .values()
        .filter(|node| node.dependencies.is_empty())
        .map(|node| node.name.clone())
        .collect();
    leaves.sort_unstable();

    Ok(LeveledGraph {
        nodes,
        levels,
        roots,
        leaves,
    })
}
