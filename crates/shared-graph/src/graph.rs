//! Graph storage, cycle detection, and the parallel traversal scheduler.

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::future::Future;

/// One node: an opaque value plus the ids it provides and consumes.
#[derive(Debug, Clone)]
pub struct DependencyNode<T> {
    pub value: T,
    pub provides: Vec<String>,
    pub consumes: Vec<String>,
}

/// Directed dependency graph over values of type `T`.
#[derive(Debug, Default)]
pub struct DependencyGraph<T> {
    nodes: Vec<DependencyNode<T>>,
}

impl<T> DependencyGraph<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a node providing and consuming the given ids.
    pub fn insert(&mut self, value: T, provides: Vec<String>, consumes: Vec<String>) {
        self.nodes.push(DependencyNode {
            value,
            provides,
            consumes,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// For every node, the indices of the nodes it depends on: each
    /// provider of each id it consumes. Self-edges are dropped; unknown
    /// ids have no providers and so impose no ordering.
    fn dependency_edges(&self) -> Vec<Vec<usize>> {
        let mut providers: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            for id in &node.provides {
                providers.entry(id.as_str()).or_default().push(idx);
            }
        }

        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                let mut seen = HashSet::new();
                let mut deps = Vec::new();
                for id in &node.consumes {
                    if let Some(list) = providers.get(id.as_str()) {
                        for &provider in list {
                            if provider != idx && seen.insert(provider) {
                                deps.push(provider);
                            }
                        }
                    }
                }
                deps
            })
            .collect()
    }

    /// Detect a dependency cycle.
    ///
    /// Returns the node sequence `n0 -> n1 -> … -> n0` (the first node is
    /// repeated at the end) when a cycle exists, `None` otherwise.
    #[must_use]
    pub fn detect_cycle(&self) -> Option<Vec<&T>> {
        const UNVISITED: u8 = 0;

        let edges = self.dependency_edges();
        let mut state = vec![UNVISITED; self.nodes.len()];
        let mut stack = Vec::new();

        for start in 0..self.nodes.len() {
            if state[start] == UNVISITED {
                if let Some(cycle) = self.cycle_from(start, &edges, &mut state, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn cycle_from<'a>(
        &'a self,
        node: usize,
        edges: &[Vec<usize>],
        state: &mut Vec<u8>,
        stack: &mut Vec<usize>,
    ) -> Option<Vec<&'a T>> {
        const UNVISITED: u8 = 0;
        const ON_STACK: u8 = 1;
        const DONE: u8 = 2;

        state[node] = ON_STACK;
        stack.push(node);

        for &next in &edges[node] {
            if state[next] == ON_STACK {
                let pos = stack.iter().position(|&n| n == next)?;
                let mut path: Vec<&T> =
                    stack[pos..].iter().map(|&i| &self.nodes[i].value).collect();
                path.push(&self.nodes[next].value);
                return Some(path);
            }
            if state[next] == UNVISITED {
                if let Some(cycle) = self.cycle_from(next, edges, state, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        state[node] = DONE;
        None
    }

    /// Visit every node exactly once, in parallel where the dependency
    /// order allows it.
    ///
    /// A node is scheduled as soon as all of its providers have completed;
    /// all currently-ready nodes run concurrently. If a visit fails, no
    /// further nodes are scheduled, in-flight visits run to completion,
    /// and the first error is returned.
    ///
    /// The graph must be acyclic; run [`DependencyGraph::detect_cycle`]
    /// first. Nodes trapped in a cycle are silently left unvisited.
    pub async fn parallel_topological_traversal<F, Fut, E>(&self, visit: F) -> Result<(), E>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let edges = self.dependency_edges();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        let mut pending: Vec<usize> = vec![0; self.nodes.len()];
        for (idx, deps) in edges.iter().enumerate() {
            pending[idx] = deps.len();
            for &dep in deps {
                dependents[dep].push(idx);
            }
        }

        let schedule =
            |idx: usize| visit(self.nodes[idx].value.clone()).map(move |result| (idx, result));

        let mut in_flight = FuturesUnordered::new();
        for idx in 0..self.nodes.len() {
            if pending[idx] == 0 {
                in_flight.push(schedule(idx));
            }
        }

        let mut failure: Option<E> = None;
        while let Some((idx, result)) = in_flight.next().await {
            match result {
                Err(error) => {
                    // First error wins; draining the stream lets the
                    // already-scheduled visits finish.
                    failure.get_or_insert(error);
                }
                Ok(()) if failure.is_none() => {
                    for &dependent in &dependents[idx] {
                        pending[dependent] -= 1;
                        if pending[dependent] == 0 {
                            in_flight.push(schedule(dependent));
                        }
                    }
                }
                Ok(()) => {}
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_detect_cycle_reports_path() {
        let mut graph = DependencyGraph::new();
        graph.insert("m1", ids(&["x"]), ids(&["y"]));
        graph.insert("m2", ids(&["y"]), ids(&["x"]));

        let cycle = graph.detect_cycle().map(|path| {
            path.iter().map(|v| (*v).to_string()).collect::<Vec<_>>()
        });

        let cycle = cycle.as_deref();
        let forward = ["m1".to_string(), "m2".to_string(), "m1".to_string()];
        let backward = ["m2".to_string(), "m1".to_string(), "m2".to_string()];
        assert!(
            cycle == Some(&forward[..]) || cycle == Some(&backward[..]),
            "unexpected cycle: {cycle:?}"
        );
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let mut graph = DependencyGraph::new();
        graph.insert("a", ids(&["x"]), Vec::new());
        graph.insert("b", Vec::new(), ids(&["x"]));
        graph.insert("c", Vec::new(), ids(&["unknown"]));

        assert!(graph.detect_cycle().is_none());
    }

    #[test]
    fn test_self_provided_id_is_not_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.insert("a", ids(&["x"]), ids(&["x"]));

        assert!(graph.detect_cycle().is_none());
    }

    #[tokio::test]
    async fn test_providers_complete_before_consumers() {
        let mut graph = DependencyGraph::new();
        graph.insert("provider", ids(&["x"]), Vec::new());
        graph.insert("consumer", Vec::new(), ids(&["x"]));
        graph.insert("late", Vec::new(), ids(&["x", "y"]));
        graph.insert("other-provider", ids(&["y"]), Vec::new());

        let order = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&order);
        graph
            .parallel_topological_traversal(move |name: &str| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().push(name.to_string());
                    Ok::<(), ()>(())
                }
            })
            .await
            .unwrap();

        let order = order.lock();
        let position =
            |name: &str| order.iter().position(|n| n == name).unwrap_or(usize::MAX);
        assert_eq!(order.len(), 4);
        assert!(position("provider") < position("consumer"));
        assert!(position("provider") < position("late"));
        assert!(position("other-provider") < position("late"));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_externally_satisfied() {
        let mut graph = DependencyGraph::new();
        graph.insert("solo", Vec::new(), ids(&["nobody.provides.this"]));

        let visited = Arc::new(Mutex::new(0_usize));
        let counter = Arc::clone(&visited);
        graph
            .parallel_topological_traversal(move |_: &str| {
                let counter = Arc::clone(&counter);
                async move {
                    *counter.lock() += 1;
                    Ok::<(), ()>(())
                }
            })
            .await
            .unwrap();

        assert_eq!(*visited.lock(), 1);
    }

    #[tokio::test]
    async fn test_independent_nodes_run_concurrently() {
        let mut graph = DependencyGraph::new();
        graph.insert("a", Vec::new(), Vec::new());
        graph.insert("b", Vec::new(), Vec::new());

        // Both visits must be in flight at once for the barrier to clear.
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let gate = Arc::clone(&barrier);
        let traversal = graph.parallel_topological_traversal(move |_: &str| {
            let gate = Arc::clone(&gate);
            async move {
                gate.wait().await;
                Ok::<(), ()>(())
            }
        });

        tokio::time::timeout(Duration::from_secs(5), traversal)
            .await
            .expect("independent nodes were serialized")
            .unwrap();
    }

    #[tokio::test]
    async fn test_failure_stops_scheduling_but_drains_in_flight() {
        let mut graph = DependencyGraph::new();
        graph.insert("failing", ids(&["x"]), Vec::new());
        graph.insert("dependent", Vec::new(), ids(&["x"]));
        graph.insert("slow-sibling", Vec::new(), Vec::new());

        let visited = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&visited);
        let result = graph
            .parallel_topological_traversal(move |name: &str| {
                let recorder = Arc::clone(&recorder);
                async move {
                    if name == "failing" {
                        return Err("boom");
                    }
                    if name == "slow-sibling" {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    recorder.lock().push(name.to_string());
                    Ok(())
                }
            })
            .await;

        assert_eq!(result, Err("boom"));
        let visited = visited.lock();
        // The sibling scheduled alongside the failure finishes; the
        // dependent of the failed node is never scheduled.
        assert!(visited.contains(&"slow-sibling".to_string()));
        assert!(!visited.contains(&"dependent".to_string()));
    }
}
