//! Dependency graph of a registry
//!
//! Nodes are the registry's packages, identified by their registration index.
//! Edges point from a dependency to the package that depends on it, so a
//! topological order of the graph is a valid build order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;

use crate::error::{Error, Result};
use crate::registry::Registry;

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<usize, ()>,
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Builds and validates the graph of `registry`.
    ///
    /// Fails with [`Error::UnknownDependency`] when a package depends on a
    /// name that is not registered, and with [`Error::CycleDetected`] when the
    /// dependencies form a cycle, including a package depending on itself.
    pub fn build(registry: &Registry) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(registry.len(), 0);
        for index in 0..registry.len() {
            graph.add_node(index);
        }

        for (index, package) in registry.iter().enumerate() {
            for dependency in package.dependencies() {
                let dep_index = registry
                    .index_of(dependency)
                    .ok_or_else(|| Error::UnknownDependency {
                        package: package.name().to_string(),
                        dependency: dependency.clone(),
                    })?;
                if dep_index == index {
                    return Err(Error::CycleDetected {
                        cycle: format!("{} -> {}", package.name(), package.name()),
                    });
                }
                graph.add_edge(NodeIndex::new(dep_index), NodeIndex::new(index), ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(Error::CycleDetected {
                cycle: describe_cycle(&graph, cycle.node_id(), registry),
            });
        }

        let order = stable_order(&graph);
        Ok(Self { graph, order })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Registry indices in build order. Among packages whose dependencies
    /// are all built, registration order wins.
    pub fn topological_order(&self) -> &[usize] {
        &self.order
    }

    /// Direct dependencies of the package at `index`.
    pub fn dependencies(&self, index: usize) -> Vec<usize> {
        self.neighbors(index, Direction::Incoming)
    }

    /// Packages depending directly on the package at `index`.
    pub fn dependents(&self, index: usize) -> Vec<usize> {
        self.neighbors(index, Direction::Outgoing)
    }

    /// Every package that depends on the package at `index`, directly or not.
    pub fn transitive_dependents(&self, index: usize) -> Vec<usize> {
        let start = NodeIndex::new(index);
        let mut bfs = Bfs::new(&self.graph, start);
        let mut found = Vec::new();
        while let Some(node) = bfs.next(&self.graph) {
            if node != start {
                found.push(node.index());
            }
        }
        found.sort_unstable();
        found
    }

    fn neighbors(&self, index: usize, direction: Direction) -> Vec<usize> {
        let mut found: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(index), direction)
            .map(NodeIndex::index)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }
}

/// Kahn's algorithm with the registration index as tie breaker.
fn stable_order(graph: &DiGraph<usize, ()>) -> Vec<usize> {
    let mut remaining: Vec<usize> = graph
        .node_indices()
        .map(|node| graph.neighbors_directed(node, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(index, _)| Reverse(index))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for dependent in graph.neighbors_directed(NodeIndex::new(index), Direction::Outgoing) {
            let count = &mut remaining[dependent.index()];
            *count -= 1;
            if *count == 0 {
                ready.push(Reverse(dependent.index()));
            }
        }
    }
    order
}

/// Renders one cycle through `start` as `a -> b -> a`, where each arrow reads
/// "depends on".
fn describe_cycle(graph: &DiGraph<usize, ()>, start: NodeIndex, registry: &Registry) -> String {
    let component = tarjan_scc(graph)
        .into_iter()
        .find(|component| component.contains(&start))
        .unwrap_or_else(|| vec![start]);

    // Breadth-first walk along "depends on" edges, back to the start node
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    let mut closing = None;
    'search: while let Some(node) = queue.pop_front() {
        for dependency in graph.neighbors_directed(node, Direction::Incoming) {
            if !component.contains(&dependency) {
                continue;
            }
            if dependency == start {
                closing = Some(node);
                break 'search;
            }
            if dependency != start && !parent.contains_key(&dependency) {
                parent.insert(dependency, node);
                queue.push_back(dependency);
            }
        }
    }

    let mut path = vec![start];
    if let Some(mut node) = closing {
        let mut reversed = vec![node];
        while let Some(&previous) = parent.get(&node) {
            reversed.push(previous);
            node = previous;
        }
        // reversed ends with the start node
        reversed.pop();
        reversed.reverse();
        path.extend(reversed);
    }
    path.push(start);

    path.iter()
        .map(|node| registry.by_index(graph[*node]).name())
        .collect::<Vec<_>>()
        .join(" -> ")
}
