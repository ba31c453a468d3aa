//! Leveled parallel execution of a per-node processor.
//!
//! Levels run in ascending order with a barrier between them; within a
//! level a semaphore bounds how many processors are in flight. Fail-fast
//! stops *starting* nodes — processors already running complete normally so
//! no partial filesystem state is left behind, and every node that never
//! started settles with a synthetic skipped result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::graph::DagNode;
use crate::level::LeveledGraph;

/// Observation callback for node lifecycle events. Cannot alter the
/// schedule.
pub type NodeCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Executor tuning knobs.
#[derive(Clone)]
pub struct ExecutorOptions {
    /// Maximum processors in flight within one level.
    pub concurrency: usize,
    /// Stop starting new nodes after the first failure.
    pub fail_fast: bool,
    pub on_node_start: Option<NodeCallback<DagNode>>,
    pub on_node_complete: Option<NodeCallback<NodeResult>>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fail_fast: true,
            on_node_start: None,
            on_node_complete: None,
        }
    }
}

/// Settled outcome of one node's processor.
#[derive(Debug, Clone, Serialize)]
pub struct NodeResult {
    pub node: String,
    pub success: bool,
    /// True when the node was never started (fail-fast).
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub duration_ms: u64,
    pub logs: Vec<String>,
}

impl NodeResult {
    fn skipped(node: String) -> Self {
        Self {
            node,
            success: false,
            skipped: true,
            error: Some("skipped: an earlier node failed".to_string()),
            output: None,
            duration_ms: 0,
            logs: vec!["skipped before start".to_string()],
        }
    }
}

/// Aggregate outcome of a graph run.
#[derive(Debug, Clone, Serialize)]
pub struct GraphResult {
    /// True iff every node's result succeeded.
    pub success: bool,
    /// Exactly one entry per node of the input graph.
    pub results: HashMap<String, NodeResult>,
    pub total_duration_ms: u64,
}

/// Run `processor` across the leveled plan.
///
/// Ordering guarantees: for any edge `A → B`, B's processor settles before
/// A's starts (given fail-fast; without it A may start after B has failed —
/// documented continue-on-error behavior). The result map covers every node.
#[instrument(skip_all, fields(nodes = graph.node_count(), levels = graph.levels.len()))]
pub async fn execute_graph<F, Fut>(
    graph: &LeveledGraph,
    options: ExecutorOptions,
    processor: F,
) -> GraphResult
where
    F: Fn(DagNode) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    let started = Instant::now();
    let processor = Arc::new(processor);
    let (fail_tx, _fail_rx) = tokio::sync::watch::channel(false);
    let fail_flag = Arc::new(fail_tx);
    let mut results: HashMap<String, NodeResult> = HashMap::new();

    for (level, level_nodes) in graph.levels.iter().enumerate() {
        debug!(level, width = level_nodes.len(), "starting level");
        let sem = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let mut handles = Vec::with_capacity(level_nodes.len());

        for name in level_nodes {
            let node = graph.nodes[name].clone();
            let processor = Arc::clone(&processor);
            let sem = Arc::clone(&sem);
            let fail_flag = Arc::clone(&fail_flag);
            let fail_rx = fail_flag.subscribe();
            let fail_fast = options.fail_fast;
            let on_start = options.on_node_start.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();

                // Fail-fast gate: checked only before start, never mid-run.
                if fail_fast && *fail_rx.borrow() {
                    return NodeResult::skipped(node.name);
                }

                if let Some(cb) = &on_start {
                    cb(&node);
                }

                let node_name = node.name.clone();
                let node_started = Instant::now();
                match processor(node).await {
                    Ok(output) => NodeResult {
                        node: node_name,
                        success: true,
                        skipped: false,
                        error: None,
                        output: Some(output),
                        duration_ms: node_started.elapsed().as_millis() as u64,
                        logs: Vec::new(),
                    },
                    Err(error) => {
                        if fail_fast {
                            let _ = fail_flag.send(true);
                        }
                        NodeResult {
                            node: node_name,
                            success: false,
                            skipped: false,
                            error: Some(error.clone()),
                            output: None,
                            duration_ms: node_started.elapsed().as_millis() as u64,
                            logs: vec![error],
                        }
                    }
                }
            });
            handles.push((name.clone(), handle));
        }

        // Level barrier: the next level starts only after every processor
        // in this one has settled.
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(node = %name, "processor task panicked: {e}");
                    if options.fail_fast {
                        let _ = fail_flag.send(true);
                    }
                    NodeResult {
                        node: name.clone(),
                        success: false,
                        skipped: false,
                        error: Some(format!("processor panicked: {e}")),
                        output: None,
                        duration_ms: 0,
                        logs: Vec::new(),
                    }
                }
            };
            if let Some(cb) = &options.on_node_complete {
                cb(&result);
            }
            results.insert(name, result);
        }
    }

    let success = results.values().all(|r| r.success);

    GraphResult {
        success,
        results,
        total_duration_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::build_leveled_graph;
    use std::collections::HashMap as Map;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn node(name: &str, deps: &[&str]) -> (String, DagNode) {
        (
            name.to_string(),
            DagNode {
                name: name.to_string(),
                repo_path: PathBuf::from(format!("/eco/{name}")),
                git_ref: format!("github:flotilla/{name}#main"),
                required_branch: "main".to_string(),
                dependencies: deps.iter().map(|d| d.to_string()).collect(),
                level: 0,
            },
        )
    }

    fn flat_graph(names: &[&str]) -> LeveledGraph {
        let nodes: Map<_, _> = names.iter().map(|n| node(n, &[])).collect();
        build_leveled_graph(nodes).unwrap()
    }

    #[tokio::test]
    async fn test_all_nodes_in_one_level_run_despite_failure() {
        // All three were submitted before the failure settles, so all run.
        // The barrier makes "already started" deterministic.
        let graph = flat_graph(&["a", "b", "c"]);
        let options = ExecutorOptions {
            concurrency: 3,
            ..ExecutorOptions::default()
        };
        let barrier = Arc::new(tokio::sync::Barrier::new(3));

        let result = execute_graph(&graph, options, move |node| {
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                if node.name == "b" {
                    Err("boom".to_string())
                } else {
                    Ok(serde_json::json!({"node": node.name}))
                }
            }
        })
        .await;

        assert!(!result.success);
        assert_eq!(result.results.len(), 3);
        assert!(result.results["a"].success);
        assert!(!result.results["b"].success);
        assert!(result.results["c"].success);
        assert!(!result.results["c"].skipped);
    }

    #[tokio::test]
    async fn test_fail_fast_skips_later_levels() {
        // a ← b ← c chain; b fails, c must never start.
        let nodes: Map<_, _> = [node("a", &[]), node("b", &["a"]), node("c", &["b"])]
            .into_iter()
            .collect();
        let graph = build_leveled_graph(nodes).unwrap();

        let result = execute_graph(&graph, ExecutorOptions::default(), |node| async move {
            if node.name == "b" {
                Err("boom".to_string())
            } else {
                Ok(Value::Null)
            }
        })
        .await;

        assert!(!result.success);
        assert!(result.results["a"].success);
        assert!(!result.results["b"].success && !result.results["b"].skipped);
        assert!(result.results["c"].skipped);
        assert_eq!(result.results.len(), 3);
    }

    #[tokio::test]
    async fn test_continue_on_error_runs_everything() {
        let nodes: Map<_, _> = [node("a", &[]), node("b", &["a"]), node("c", &["b"])]
            .into_iter()
            .collect();
        let graph = build_leveled_graph(nodes).unwrap();
        let options = ExecutorOptions {
            fail_fast: false,
            ..ExecutorOptions::default()
        };

        let result = execute_graph(&graph, options, |node| async move {
            if node.name == "a" {
                Err("boom".to_string())
            } else {
                Ok(Value::Null)
            }
        })
        .await;

        assert!(!result.success);
        assert!(!result.results["a"].success);
        assert!(result.results["b"].success);
        assert!(result.results["c"].success);
        assert!(result.results.values().all(|r| !r.skipped));
    }

    #[tokio::test]
    async fn test_concurrency_bound_is_respected() {
        let graph = flat_graph(&["a", "b", "c", "d", "e", "f"]);
        let options = ExecutorOptions {
            concurrency: 2,
            ..ExecutorOptions::default()
        };

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let in_flight_c = Arc::clone(&in_flight);
        let peak_c = Arc::clone(&peak);

        let result = execute_graph(&graph, options, move |_node| {
            let in_flight = Arc::clone(&in_flight_c);
            let peak = Arc::clone(&peak_c);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        })
        .await;

        assert!(result.success);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_dependency_settles_before_dependent_starts() {
        let nodes: Map<_, _> = [node("dep", &[]), node("top", &["dep"])]
            .into_iter()
            .collect();
        let graph = build_leveled_graph(nodes).unwrap();

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_c = Arc::clone(&order);

        execute_graph(&graph, ExecutorOptions::default(), move |node| {
            let order = Arc::clone(&order_c);
            async move {
                order.lock().unwrap().push(format!("start {}", node.name));
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                order.lock().unwrap().push(format!("end {}", node.name));
                Ok(Value::Null)
            }
        })
        .await;

        let order = order.lock().unwrap().clone();
        assert_eq!(
            order,
            vec!["start dep", "end dep", "start top", "end top"]
        );
    }

    #[tokio::test]
    async fn test_callbacks_observe_lifecycle() {
        let graph = flat_graph(&["a", "b"]);
        let started = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let started_c = Arc::clone(&started);
        let completed_c = Arc::clone(&completed);

        let options = ExecutorOptions {
            on_node_start: Some(Arc::new(move |_: &DagNode| {
                started_c.fetch_add(1, Ordering::SeqCst);
            })),
            on_node_complete: Some(Arc::new(move |_: &NodeResult| {
                completed_c.fetch_add(1, Ordering::SeqCst);
            })),
            ..ExecutorOptions::default()
        };

        let result =
            execute_graph(&graph, options, |_| async { Ok(Value::Null) }).await;

        assert!(result.success);
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_graph_succeeds() {
        let graph = build_leveled_graph(Map::new()).unwrap();
        let result =
            execute_graph(&graph, ExecutorOptions::default(), |_| async { Ok(Value::Null) })
                .await;
        assert!(result.success);
        assert!(result.results.is_empty());
    }
}
