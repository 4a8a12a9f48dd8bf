//! Design-time checks run when an edge is drawn or a workflow is loaded.

use crate::catalog::NodeCatalog;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{depth_first_search, Control, DfsEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use weavecore::{Edge, GraphNode, Workflow, WorkflowError};

/// Data type carried by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleType {
    Text,
    Image,
    Video,
    Number,
    Url,
}

impl HandleType {
    /// Input types an output of this type may feed.
    pub fn accepts(&self) -> &'static [HandleType] {
        use HandleType::*;
        match self {
            Text => &[Text, Number],
            Image => &[Image, Url],
            Video => &[Video, Url],
            Number => &[Number],
            Url => &[Url, Image, Video],
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(HandleType::Text),
            "image" => Some(HandleType::Image),
            "video" => Some(HandleType::Video),
            "number" => Some(HandleType::Number),
            "url" => Some(HandleType::Url),
            _ => None,
        }
    }
}

impl fmt::Display for HandleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleType::Text => "text",
            HandleType::Image => "image",
            HandleType::Video => "video",
            HandleType::Number => "number",
            HandleType::Url => "url",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionValidation {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectionValidation {
    fn ok() -> Self {
        Self {
            is_valid: true,
            message: None,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: Some(message.into()),
        }
    }
}

/// Whether an output of `source_type` may feed an input of `target_type`.
pub fn validate_connection(source_type: HandleType, target_type: HandleType) -> ConnectionValidation {
    if source_type.accepts().contains(&target_type) {
        ConnectionValidation::ok()
    } else {
        ConnectionValidation::rejected(format!(
            "Cannot connect {} output to {} input",
            source_type, target_type
        ))
    }
}

/// Same check over type names as they arrive from the editor; unknown source types never match.
pub fn validate_connection_names(source_type: &str, target_type: &str) -> ConnectionValidation {
    match (HandleType::parse(source_type), HandleType::parse(target_type)) {
        (Some(source), Some(target)) => validate_connection(source, target),
        _ => ConnectionValidation::rejected(format!(
            "Cannot connect {} output to {} input",
            source_type, target_type
        )),
    }
}

/// Whether adding `source -> target` to `edges` would close a cycle.
///
/// Depth-first search from `target` over the existing edges plus the proposed
/// one; reaching a node that is still on the active path means a cycle. Every
/// node is visited at most once.
pub fn would_create_cycle(
    nodes: &[GraphNode],
    edges: &[Edge],
    source: &str,
    target: &str,
) -> bool {
    if source == target {
        return true;
    }

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for node in nodes {
        graph.add_node(node.id.as_str());
    }
    for edge in edges {
        graph.add_edge(edge.source.as_str(), edge.target.as_str(), ());
    }
    graph.add_edge(source, target, ());

    depth_first_search(&graph, Some(target), |event| match event {
        DfsEvent::BackEdge(_, _) => Control::Break(()),
        _ => Control::Continue,
    })
    .break_value()
    .is_some()
}

/// Full design-time gate for a proposed edge: handle types, then cycles.
pub fn check_connection(
    catalog: &NodeCatalog,
    nodes: &[GraphNode],
    edges: &[Edge],
    proposed: &Edge,
) -> Result<(), WorkflowError> {
    let source = nodes
        .iter()
        .find(|n| n.id == proposed.source)
        .ok_or_else(|| WorkflowError::NodeNotFound(proposed.source.clone()))?;
    let target = nodes
        .iter()
        .find(|n| n.id == proposed.target)
        .ok_or_else(|| WorkflowError::NodeNotFound(proposed.target.clone()))?;

    let validation = validate_connection(
        catalog.output_type(source, &proposed.source_handle),
        catalog.input_type(target, &proposed.target_handle),
    );
    if !validation.is_valid {
        return Err(WorkflowError::InvalidConnection(
            validation.message.unwrap_or_default(),
        ));
    }

    if would_create_cycle(nodes, edges, &proposed.source, &proposed.target) {
        return Err(WorkflowError::InvalidConnection(
            "Cannot create circular dependencies".to_string(),
        ));
    }

    Ok(())
}

/// Adds an edge to a workflow only if it passes [`check_connection`].
pub fn connect_checked(
    catalog: &NodeCatalog,
    workflow: &mut Workflow,
    edge: Edge,
) -> Result<(), WorkflowError> {
    check_connection(catalog, &workflow.nodes, &workflow.edges, &edge)?;
    workflow.edges.push(edge);
    Ok(())
}

/// Whole-graph validation used when a workflow is loaded from a file or the API.
///
/// Returns every problem found rather than stopping at the first one.
pub fn validate_graph(catalog: &NodeCatalog, nodes: &[GraphNode], edges: &[Edge]) -> Vec<WorkflowError> {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            issues.push(WorkflowError::DuplicateNode(node.id.clone()));
        }
    }

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for node in nodes {
        graph.add_node(node.id.as_str());
    }

    for edge in edges {
        let source = nodes.iter().find(|n| n.id == edge.source);
        let target = nodes.iter().find(|n| n.id == edge.target);
        let (Some(source), Some(target)) = (source, target) else {
            for missing in [&edge.source, &edge.target] {
                if !seen.contains(missing.as_str()) {
                    issues.push(WorkflowError::NodeNotFound(missing.clone()));
                }
            }
            continue;
        };

        let validation = validate_connection(
            catalog.output_type(source, &edge.source_handle),
            catalog.input_type(target, &edge.target_handle),
        );
        if let Some(message) = validation.message {
            issues.push(WorkflowError::InvalidConnection(format!(
                "edge {}: {}",
                edge.id, message
            )));
        }
        graph.add_edge(edge.source.as_str(), edge.target.as_str(), ());
    }

    if toposort(&graph, None).is_err() {
        issues.push(WorkflowError::CyclicDependency);
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use weavecore::CropImageConfig;

    fn nodes(ids: &[&str]) -> Vec<GraphNode> {
        ids.iter().map(|id| GraphNode::text(*id, "")).collect()
    }

    #[test]
    fn compatibility_table() {
        use HandleType::*;
        assert!(validate_connection(Text, Number).is_valid);
        assert!(validate_connection(Image, Url).is_valid);
        assert!(validate_connection(Url, Video).is_valid);
        assert!(!validate_connection(Number, Text).is_valid);
        let rejected = validate_connection(Video, Image);
        assert!(!rejected.is_valid);
        assert_eq!(
            rejected.message.as_deref(),
            Some("Cannot connect video output to image input")
        );
    }

    #[test]
    fn unknown_source_type_is_invalid() {
        assert!(!validate_connection_names("audio", "text").is_valid);
        assert!(validate_connection_names("url", "image").is_valid);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        assert!(would_create_cycle(&nodes(&["a"]), &[], "a", "a"));
    }

    #[test]
    fn closing_a_chain_is_a_cycle() {
        let nodes = nodes(&["a", "b", "c"]);
        let edges = vec![Edge::new("a", "b"), Edge::new("b", "c")];
        assert!(would_create_cycle(&nodes, &edges, "c", "a"));
        assert!(!would_create_cycle(&nodes, &edges, "a", "c"));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let nodes = nodes(&["a", "b", "c", "d"]);
        let edges = vec![
            Edge::new("a", "b"),
            Edge::new("a", "c"),
            Edge::new("b", "d"),
            Edge::new("c", "d"),
        ];
        assert!(!would_create_cycle(&nodes, &edges, "a", "d"));
        assert!(would_create_cycle(&nodes, &edges, "d", "a"));
    }

    #[test]
    fn long_chain_terminates() {
        let ids: Vec<String> = (0..5000).map(|i| format!("n{i}")).collect();
        let nodes: Vec<GraphNode> = ids.iter().map(|id| GraphNode::text(id.clone(), "")).collect();
        let mut edges: Vec<Edge> = ids.windows(2).map(|w| Edge::new(w[0].clone(), w[1].clone())).collect();
        // dense fan-out on top of the chain
        for i in 0..4000 {
            edges.push(Edge::new(ids[i].clone(), ids[i + 1000].clone()));
        }
        assert!(would_create_cycle(&nodes, &edges, "n4999", "n0"));
        assert!(!would_create_cycle(&nodes, &edges, "n0", "n4999"));
    }

    #[test]
    fn check_connection_uses_handle_types() {
        let catalog = NodeCatalog::new();
        let nodes = vec![
            GraphNode::text("t", "10"),
            GraphNode::upload_video("v", "https://example.com/a.mp4"),
            GraphNode::crop_image("c", CropImageConfig::default()),
        ];
        let ok = Edge::new("t", "c").with_handles("output", "x_percent");
        assert!(check_connection(&catalog, &nodes, &[], &ok).is_ok());

        let bad = Edge::new("v", "c").with_handles("output", "image_url");
        assert!(matches!(
            check_connection(&catalog, &nodes, &[], &bad),
            Err(WorkflowError::InvalidConnection(_))
        ));
    }

    #[test]
    fn validate_graph_reports_all_issues() {
        let catalog = NodeCatalog::new();
        let nodes = nodes(&["a", "b"]);
        let edges = vec![
            Edge::new("a", "b"),
            Edge::new("b", "a"),
            Edge::new("a", "ghost"),
        ];
        let issues = validate_graph(&catalog, &nodes, &edges);
        assert!(issues.contains(&WorkflowError::CyclicDependency));
        assert!(issues.contains(&WorkflowError::NodeNotFound("ghost".into())));
    }
}
