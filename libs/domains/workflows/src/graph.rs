//! Static workflow graph descriptors.
//!
//! Graphs are declared as nodes + edges and compiled once at registration
//! into topological ranks; the engine schedules ranks without any further
//! graph work per execution.

use crate::error::WorkflowError;
use crate::state::WorkflowState;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One node's behavior.
///
/// Nodes receive the state by value and return the (possibly modified)
/// state. Business failures are recorded with `state.fail(...)`; returning
/// `Err` is reserved for infrastructure faults.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn run(&self, state: WorkflowState) -> Result<WorkflowState, WorkflowError>;
}

/// A named node with its handler.
pub struct NodeDef {
    pub name: String,
    pub handler: Arc<dyn NodeHandler>,
}

impl NodeDef {
    pub fn new(name: impl Into<String>, handler: Arc<dyn NodeHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
}

impl EdgeDef {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// An immutable workflow definition, compiled into execution ranks.
pub struct WorkflowDefinition {
    pub name: String,
    pub entry: String,
    nodes: HashMap<String, Arc<dyn NodeHandler>>,
    /// Topological ranks: nodes in one rank have no edges between them and
    /// may run concurrently.
    ranks: Vec<Vec<String>>,
}

impl WorkflowDefinition {
    /// Build and validate a workflow graph.
    ///
    /// Rejects unknown edge endpoints, unknown entry nodes, cycles, and
    /// nodes unreachable from the entry.
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<NodeDef>,
        edges: Vec<EdgeDef>,
        entry: impl Into<String>,
    ) -> Result<Self, WorkflowError> {
        let name = name.into();
        let entry = entry.into();

        let mut handlers: HashMap<String, Arc<dyn NodeHandler>> = HashMap::new();
        for node in nodes {
            if handlers.insert(node.name.clone(), node.handler).is_some() {
                return Err(WorkflowError::InvalidGraph {
                    workflow: name,
                    details: format!("duplicate node '{}'", node.name),
                });
            }
        }

        if !handlers.contains_key(&entry) {
            return Err(WorkflowError::InvalidGraph {
                workflow: name,
                details: format!("entry node '{}' not defined", entry),
            });
        }

        for edge in &edges {
            for endpoint in [&edge.from, &edge.to] {
                if !handlers.contains_key(endpoint) {
                    return Err(WorkflowError::InvalidGraph {
                        workflow: name,
                        details: format!("edge references unknown node '{}'", endpoint),
                    });
                }
            }
        }

        let ranks = Self::resolve_ranks(&name, &handlers, &edges, &entry)?;

        Ok(Self {
            name,
            entry,
            nodes: handlers,
            ranks,
        })
    }

    /// Kahn's algorithm over the nodes reachable from the entry, keeping
    /// same-depth nodes grouped so the engine can run them concurrently.
    fn resolve_ranks(
        name: &str,
        handlers: &HashMap<String, Arc<dyn NodeHandler>>,
        edges: &[EdgeDef],
        entry: &str,
    ) -> Result<Vec<Vec<String>>, WorkflowError> {
        // Restrict to nodes reachable from the entry
        let mut reachable: HashSet<String> = HashSet::new();
        let mut frontier = vec![entry.to_string()];
        while let Some(node) = frontier.pop() {
            if reachable.insert(node.clone()) {
                for edge in edges.iter().filter(|e| e.from == node) {
                    frontier.push(edge.to.clone());
                }
            }
        }

        if reachable.len() != handlers.len() {
            let orphan = handlers
                .keys()
                .find(|n| !reachable.contains(*n))
                .cloned()
                .unwrap_or_default();
            return Err(WorkflowError::InvalidGraph {
                workflow: name.to_string(),
                details: format!("node '{}' unreachable from entry", orphan),
            });
        }

        let mut in_degree: HashMap<&str, usize> =
            reachable.iter().map(|n| (n.as_str(), 0)).collect();
        for edge in edges {
            *in_degree.get_mut(edge.to.as_str()).expect("validated") += 1;
        }

        let mut ranks: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| n.to_string())
            .collect();
        current.sort();

        let mut resolved = 0;
        while !current.is_empty() {
            resolved += current.len();
            let mut next: Vec<String> = Vec::new();
            for node in &current {
                for edge in edges.iter().filter(|e| &e.from == node) {
                    let degree = in_degree.get_mut(edge.to.as_str()).expect("validated");
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(edge.to.clone());
                    }
                }
            }
            next.sort();
            ranks.push(std::mem::replace(&mut current, next));
        }

        if resolved != reachable.len() {
            return Err(WorkflowError::InvalidGraph {
                workflow: name.to_string(),
                details: "cycle detected".to_string(),
            });
        }

        Ok(ranks)
    }

    /// The compiled execution order.
    pub fn ranks(&self) -> &[Vec<String>] {
        &self.ranks
    }

    /// Handler for a node (names come from `ranks`, so lookups always hit).
    pub fn handler(&self, node: &str) -> Option<Arc<dyn NodeHandler>> {
        self.nodes.get(node).cloned()
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl NodeHandler for Noop {
        async fn run(&self, state: WorkflowState) -> Result<WorkflowState, WorkflowError> {
            Ok(state)
        }
    }

    fn node(name: &str) -> NodeDef {
        NodeDef::new(name, Arc::new(Noop))
    }

    #[test]
    fn test_linear_graph_ranks() {
        let workflow = WorkflowDefinition::new(
            "linear",
            vec![node("a"), node("b"), node("c")],
            vec![EdgeDef::new("a", "b"), EdgeDef::new("b", "c")],
            "a",
        )
        .unwrap();

        assert_eq!(workflow.ranks(), &[vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn test_diamond_graph_groups_siblings() {
        let workflow = WorkflowDefinition::new(
            "diamond",
            vec![node("a"), node("b"), node("c"), node("d")],
            vec![
                EdgeDef::new("a", "b"),
                EdgeDef::new("a", "c"),
                EdgeDef::new("b", "d"),
                EdgeDef::new("c", "d"),
            ],
            "a",
        )
        .unwrap();

        assert_eq!(
            workflow.ranks(),
            &[vec!["a"], vec!["b", "c"], vec!["d"]]
        );
    }

    #[test]
    fn test_single_node_graph() {
        let workflow = WorkflowDefinition::new("single", vec![node("only")], vec![], "only").unwrap();
        assert_eq!(workflow.ranks(), &[vec!["only"]]);
        assert_eq!(workflow.len(), 1);
    }

    #[test]
    fn test_cycle_rejected() {
        let result = WorkflowDefinition::new(
            "cyclic",
            vec![node("a"), node("b")],
            vec![EdgeDef::new("a", "b"), EdgeDef::new("b", "a")],
            "a",
        );

        let err = result.err().unwrap();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_unknown_edge_rejected() {
        let result = WorkflowDefinition::new(
            "bad",
            vec![node("a")],
            vec![EdgeDef::new("a", "ghost")],
            "a",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_entry_rejected() {
        let result = WorkflowDefinition::new("bad", vec![node("a")], vec![], "ghost");
        assert!(result.is_err());
    }

    #[test]
    fn test_unreachable_node_rejected() {
        let result = WorkflowDefinition::new(
            "bad",
            vec![node("a"), node("island")],
            vec![],
            "a",
        );
        let err = result.err().unwrap();
        assert!(err.to_string().contains("unreachable"));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let result = WorkflowDefinition::new("bad", vec![node("a"), node("a")], vec![], "a");
        assert!(result.is_err());
    }
}
