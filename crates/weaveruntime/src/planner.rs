use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use weavecore::{Edge, GraphNode, NodeId};

/// Order in which one run dispatches its nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Selected node ids, in workflow node order.
    pub selected_nodes: Vec<NodeId>,
    /// Selected sources of edges into each selected node.
    pub dependencies: HashMap<NodeId, Vec<NodeId>>,
    pub execution_order: Vec<NodeId>,
}

impl ExecutionPlan {
    pub fn is_selected(&self, node_id: &str) -> bool {
        self.selected_nodes.iter().any(|id| id == node_id)
    }

    /// Selected nodes the order could not place, i.e. nodes caught in a cycle.
    pub fn unreachable(&self) -> Vec<&NodeId> {
        let ordered: HashSet<&NodeId> = self.execution_order.iter().collect();
        self.selected_nodes
            .iter()
            .filter(|id| !ordered.contains(id))
            .collect()
    }
}

/// Kahn's algorithm over the selected subgraph.
///
/// Edges with an endpoint outside the selection are dropped. Zero in-degree
/// nodes are queued in node order and ties resolve FIFO, so the same input
/// always yields the same order. Nodes on a cycle never reach in-degree zero
/// and are left out of `execution_order`.
pub fn create_execution_plan(
    nodes: &[GraphNode],
    edges: &[Edge],
    selected: Option<&[NodeId]>,
) -> ExecutionPlan {
    let selected_nodes: Vec<NodeId> = match selected {
        Some(ids) => nodes
            .iter()
            .filter(|n| ids.contains(&n.id))
            .map(|n| n.id.clone())
            .collect(),
        None => nodes.iter().map(|n| n.id.clone()).collect(),
    };
    let in_selection: HashSet<&str> = selected_nodes.iter().map(String::as_str).collect();

    let filtered: Vec<&Edge> = edges
        .iter()
        .filter(|e| in_selection.contains(e.source.as_str()) && in_selection.contains(e.target.as_str()))
        .collect();

    let mut dependencies: HashMap<NodeId, Vec<NodeId>> = selected_nodes
        .iter()
        .map(|id| (id.clone(), Vec::new()))
        .collect();
    let mut in_degree: HashMap<&str, usize> = selected_nodes.iter().map(|id| (id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in &filtered {
        if let Some(deps) = dependencies.get_mut(&edge.target) {
            deps.push(edge.source.clone());
        }
        if let Some(degree) = in_degree.get_mut(edge.target.as_str()) {
            *degree += 1;
        }
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    let mut queue: VecDeque<&str> = selected_nodes
        .iter()
        .map(String::as_str)
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();
    let mut execution_order = Vec::with_capacity(selected_nodes.len());

    while let Some(current) = queue.pop_front() {
        execution_order.push(current.to_string());
        for &next in adjacency.get(current).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    tracing::debug!(
        selected = selected_nodes.len(),
        ordered = execution_order.len(),
        "execution plan: {:?}",
        execution_order
    );

    ExecutionPlan {
        selected_nodes,
        dependencies,
        execution_order,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(ids: &[&str]) -> Vec<GraphNode> {
        ids.iter().map(|id| GraphNode::text(*id, "")).collect()
    }

    fn ids(ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn position(order: &[NodeId], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn roots_keep_node_order() {
        let plan = create_execution_plan(&nodes(&["c", "a", "b"]), &[], None);
        assert_eq!(plan.execution_order, ids(&["c", "a", "b"]));
    }

    #[test]
    fn every_edge_is_respected() {
        let nodes = nodes(&["d", "c", "b", "a"]);
        let edges = vec![
            Edge::new("a", "b"),
            Edge::new("a", "c"),
            Edge::new("b", "d"),
            Edge::new("c", "d"),
        ];
        let plan = create_execution_plan(&nodes, &edges, None);
        assert_eq!(plan.execution_order.len(), 4);
        for edge in &edges {
            assert!(position(&plan.execution_order, &edge.source) < position(&plan.execution_order, &edge.target));
        }
        assert_eq!(plan.dependencies["d"], ids(&["b", "c"]));
    }

    #[test]
    fn ordering_is_deterministic() {
        let nodes = nodes(&["a", "b", "c", "d", "e"]);
        let edges = vec![Edge::new("a", "c"), Edge::new("b", "c"), Edge::new("c", "e")];
        let first = create_execution_plan(&nodes, &edges, None);
        for _ in 0..10 {
            assert_eq!(create_execution_plan(&nodes, &edges, None).execution_order, first.execution_order);
        }
        assert_eq!(first.execution_order, ids(&["a", "b", "d", "c", "e"]));
    }

    #[test]
    fn partial_selection_drops_boundary_edges() {
        let nodes = nodes(&["y", "x", "z"]);
        let edges = vec![Edge::new("y", "x"), Edge::new("x", "z")];
        let selection = ids(&["x", "z"]);
        let plan = create_execution_plan(&nodes, &edges, Some(&selection));
        assert_eq!(plan.selected_nodes, ids(&["x", "z"]));
        assert!(plan.dependencies["x"].is_empty());
        assert_eq!(plan.dependencies["z"], ids(&["x"]));
        assert_eq!(plan.execution_order, ids(&["x", "z"]));
        assert!(!plan.is_selected("y"));
    }

    #[test]
    fn unknown_selection_ids_are_ignored() {
        let selection = ids(&["ghost", "a"]);
        let plan = create_execution_plan(&nodes(&["a", "b"]), &[], Some(&selection));
        assert_eq!(plan.execution_order, ids(&["a"]));
    }

    #[test]
    fn cycle_members_are_left_out() {
        let nodes = nodes(&["a", "b", "c"]);
        let edges = vec![Edge::new("b", "c"), Edge::new("c", "b")];
        let plan = create_execution_plan(&nodes, &edges, None);
        assert_eq!(plan.execution_order, ids(&["a"]));
        assert_eq!(plan.unreachable(), vec!["b", "c"]);
    }
}
