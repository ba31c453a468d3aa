//! Dependency graph construction over scanned package descriptors.
//!
//! Edges are ecosystem-internal only: a declared dependency that is not
//! itself part of the scanned set is silently dropped at build time — it is
//! out-of-ecosystem and not orchestrated.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::EcosystemConfig;
use crate::error::{EcosystemError, EcosystemResult};
use crate::gitref::GitRef;
use crate::scanner::PackageDescriptor;

/// A graph vertex built from one package descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    pub name: String,
    pub repo_path: PathBuf,
    /// Resolved from the remote URL, or synthesized canonically.
    pub git_ref: String,
    pub required_branch: String,
    /// Only names that also appear in the graph.
    pub dependencies: Vec<String>,
    /// Assigned by the leveler; 0 = no intra-graph deps.
    pub level: usize,
}

/// Build the `name → DagNode` mapping from a scanned descriptor set.
pub fn build_nodes(
    descriptors: &[PackageDescriptor],
    config: &EcosystemConfig,
) -> HashMap<String, DagNode> {
    let names: HashSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();

    descriptors
        .iter()
        .map(|desc| {
            let branch = desc
                .current_branch
                .clone()
                .unwrap_or_else(|| config.primary_branch.clone());

            let git_ref = desc
                .git_remote
                .as_deref()
                .and_then(|url| GitRef::from_remote_url(url, &config.host, &branch))
                .map(|r| r.raw)
                .unwrap_or_else(|| {
                    GitRef::canonical(&config.host, &config.owner, &desc.name, &branch)
                });

            let dependencies = desc
                .internal_deps
                .iter()
                .filter(|d| names.contains(d.as_str()))
                .cloned()
                .collect();

            let node = DagNode {
                name: desc.name.clone(),
                repo_path: desc.repo_path.clone(),
                git_ref,
                required_branch: branch,
                dependencies,
                level: 0,
            };
            (desc.name.clone(), node)
        })
        .collect()
}

/// Restrict the graph to `name` and everything it transitively depends on
/// (DFS forward over `dependencies` edges).
pub fn filter_from_root(
    nodes: &HashMap<String, DagNode>,
    name: &str,
) -> EcosystemResult<HashMap<String, DagNode>> {
    if !nodes.contains_key(name) {
        return Err(EcosystemError::PackageNotScanned {
            name: name.to_string(),
        });
    }

    let mut reachable = HashMap::new();
    let mut stack = vec![name.to_string()];
    while let Some(current) = stack.pop() {
        if reachable.contains_key(&current) {
            continue;
        }
        if let Some(node) = nodes.get(&current) {
            stack.extend(node.dependencies.iter().cloned());
            reachable.insert(current, node.clone());
        }
    }
    Ok(reachable)
}

/// Transitive dependencies of `name` (everything it is built on).
pub fn ancestors_of(
    nodes: &HashMap<String, DagNode>,
    name: &str,
) -> EcosystemResult<HashSet<String>> {
    let scoped = filter_from_root(nodes, name)?;
    Ok(scoped.into_keys().filter(|n| n != name).collect())
}

/// Transitive dependents of `name` (everything built on it). Uses a
/// reverse-edge index computed on demand.
pub fn descendants_of(
    nodes: &HashMap<String, DagNode>,
    name: &str,
) -> EcosystemResult<HashSet<String>> {
    if !nodes.contains_key(name) {
        return Err(EcosystemError::PackageNotScanned {
            name: name.to_string(),
        });
    }

    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes.values() {
        for dep in &node.dependencies {
            dependents.entry(dep.as_str()).or_default().push(&node.name);
        }
    }

    let mut visited = HashSet::new();
    let mut stack = vec![name];
    while let Some(current) = stack.pop() {
        if let Some(children) = dependents.get(current) {
            for child in children {
                if visited.insert(child.to_string()) {
                    stack.push(child);
                }
            }
        }
    }
    Ok(visited)
}
