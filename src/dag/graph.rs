// src/dag/graph.rs

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, ScandagError};
use crate::task::TaskNode;

/// Internal node structure: the task plus its immediate neighbours.
#[derive(Debug, Clone)]
struct GraphNode {
    node: Arc<TaskNode>,
    /// Direct dependencies: nodes that must finish before this one runs.
    deps: Vec<String>,
    /// Direct dependents: nodes that read this one's output.
    dependents: Vec<String>,
}

/// De-duplicated node graph keyed by node identity, with a
/// dependency-first execution order.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: HashMap<String, GraphNode>,
    order: Vec<String>,
    root: String,
}

impl TaskGraph {
    /// Collect every node reachable from `root`.
    ///
    /// Nodes with the same identity are interchangeable and collapse into
    /// one entry, so a node reachable through several dependents appears
    /// (and runs) once.
    pub fn from_root(root: &Arc<TaskNode>) -> Result<Self> {
        let mut nodes: HashMap<String, GraphNode> = HashMap::new();
        let mut stack = vec![root.clone()];

        while let Some(node) = stack.pop() {
            if nodes.contains_key(node.id()) {
                continue;
            }
            let mut deps: Vec<String> = Vec::new();
            for up in node.requires() {
                if !deps.iter().any(|d| d == up.id()) {
                    deps.push(up.id().to_string());
                }
                stack.push(up.clone());
            }
            nodes.insert(
                node.id().to_string(),
                GraphNode {
                    node,
                    deps,
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents based on deps.
        let ids: Vec<String> = nodes.keys().cloned().collect();
        for id in &ids {
            let deps = nodes.get(id).map(|n| n.deps.clone()).unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(id.clone());
                }
            }
        }

        let order = topological_order(&nodes)?;
        Ok(Self {
            nodes,
            order,
            root: root.id().to_string(),
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Arc<TaskNode>> {
        self.nodes.get(id).map(|n| &n.node)
    }

    /// Node ids, dependencies strictly before dependents.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Nodes in execution order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<TaskNode>> {
        self.order.iter().filter_map(|id| self.node(id))
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}

fn topological_order(nodes: &HashMap<String, GraphNode>) -> Result<Vec<String>> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    let mut ids: Vec<&str> = nodes.keys().map(String::as_str).collect();
    ids.sort_unstable();
    for &id in &ids {
        graph.add_node(id);
    }
    for &id in &ids {
        if let Some(node) = nodes.get(id) {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), id, ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(ScandagError::DagCycle(format!(
            "cycle detected in task graph involving node '{}'",
            cycle.node_id()
        ))),
    }
}
