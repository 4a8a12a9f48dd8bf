use std::collections::HashMap;
use weavecore::{Edge, GraphNode, NodeId, Record, Value};

/// Outputs produced so far in one run, keyed by node id.
///
/// Owned by the executor loop and passed from step to step; dropped when the
/// run finishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutputs(HashMap<NodeId, Record>);

impl NodeOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node_id: impl Into<NodeId>, outputs: Record) {
        self.0.insert(node_id.into(), outputs);
    }

    pub fn get(&self, node_id: &str) -> Option<&Record> {
        self.0.get(node_id)
    }
}

/// Value a source node contributes along an edge.
///
/// This run's output wins; otherwise the value last persisted on the node.
fn resolve_source_value(source: &GraphNode, outputs: Option<&NodeOutputs>) -> Value {
    outputs
        .and_then(|o| o.get(&source.id))
        .and_then(|record| record.get(source.kind.output_field()))
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| source.kind.persisted_output())
}

/// Inputs for `node_id`, keyed by target handle.
///
/// Edges are walked in array order. A second value arriving on a handle turns
/// the slot into `[first, second]`; later values append. Edges whose source
/// node is missing are ignored.
pub fn collect_node_inputs(
    node_id: &str,
    nodes: &[GraphNode],
    edges: &[Edge],
    outputs: Option<&NodeOutputs>,
) -> Record {
    let mut inputs = Record::new();
    if !nodes.iter().any(|n| n.id == node_id) {
        return inputs;
    }

    let mut arrivals: HashMap<&str, usize> = HashMap::new();
    for edge in edges.iter().filter(|e| e.target == node_id) {
        let Some(source) = nodes.iter().find(|n| n.id == edge.source) else {
            continue;
        };
        let value = resolve_source_value(source, outputs);
        let handle = edge.target_handle.as_str();

        let count = arrivals.entry(handle).or_insert(0);
        *count += 1;
        match *count {
            1 => {
                inputs.insert(handle.to_string(), value);
            }
            2 => {
                let first = inputs.remove(handle).unwrap_or(Value::Null);
                inputs.insert(handle.to_string(), Value::Array(vec![first, value]));
            }
            _ => {
                if let Some(Value::Array(items)) = inputs.get_mut(handle) {
                    items.push(value);
                }
            }
        }
    }

    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use weavecore::{record, LlmConfig, NodeKind};

    #[test]
    fn single_edge_lands_on_target_handle() {
        let nodes = vec![GraphNode::text("t", "hello"), GraphNode::llm("l")];
        let edges = vec![Edge::new("t", "l").with_handles("output", "user_message")];
        let inputs = collect_node_inputs("l", &nodes, &edges, None);
        assert_eq!(inputs, record([("user_message", Value::from("hello"))]));
    }

    #[test]
    fn default_target_handle_is_input() {
        let nodes = vec![GraphNode::text("t", "hi"), GraphNode::llm("l")];
        let inputs = collect_node_inputs("l", &nodes, &[Edge::new("t", "l")], None);
        assert_eq!(inputs.get("input"), Some(&Value::from("hi")));
    }

    #[test]
    fn fan_in_follows_edge_order() {
        let nodes = vec![
            GraphNode::upload_image("b", "https://img/b.png"),
            GraphNode::upload_image("a", "https://img/a.png"),
            GraphNode::upload_image("c", "https://img/c.png"),
            GraphNode::llm("l"),
        ];
        let edges = vec![
            Edge::new("a", "l").with_handles("output", "images"),
            Edge::new("b", "l").with_handles("output", "images"),
        ];
        let inputs = collect_node_inputs("l", &nodes, &edges, None);
        assert_eq!(
            inputs["images"],
            Value::Array(vec!["https://img/a.png".into(), "https://img/b.png".into()])
        );

        let mut three = edges.clone();
        three.push(Edge::new("c", "l").with_handles("output", "images"));
        let inputs = collect_node_inputs("l", &nodes, &three, None);
        assert_eq!(inputs["images"].as_array().map(<[Value]>::len), Some(3));
    }

    #[test]
    fn list_valued_first_arrival_is_still_wrapped() {
        let nodes = vec![
            GraphNode::new(
                "x",
                NodeKind::Other {
                    node_type: "custom".into(),
                    data: record([("output", Value::Array(vec!["p".into(), "q".into()]))]),
                },
            ),
            GraphNode::text("t", "r"),
            GraphNode::llm("l"),
        ];
        let edges = vec![
            Edge::new("x", "l").with_handles("output", "images"),
            Edge::new("t", "l").with_handles("output", "images"),
        ];
        let inputs = collect_node_inputs("l", &nodes, &edges, None);
        assert_eq!(
            inputs["images"],
            Value::Array(vec![Value::Array(vec!["p".into(), "q".into()]), "r".into()])
        );
    }

    #[test]
    fn run_outputs_win_over_persisted_data() {
        let llm = GraphNode::new(
            "up",
            NodeKind::Llm(LlmConfig {
                response: Some("stale".into()),
                ..Default::default()
            }),
        );
        let nodes = vec![llm, GraphNode::llm("down")];
        let edges = vec![Edge::new("up", "down").with_handles("output", "user_message")];

        let fallback = collect_node_inputs("down", &nodes, &edges, None);
        assert_eq!(fallback["user_message"], Value::from("stale"));

        let mut outputs = NodeOutputs::new();
        outputs.insert("up", record([("output", Value::from("fresh"))]));
        let fresh = collect_node_inputs("down", &nodes, &edges, Some(&outputs));
        assert_eq!(fresh["user_message"], Value::from("fresh"));
    }

    #[test]
    fn missing_source_or_target_yields_nothing() {
        let nodes = vec![GraphNode::llm("l")];
        let edges = vec![Edge::new("gone", "l")];
        assert!(collect_node_inputs("l", &nodes, &edges, None).is_empty());
        assert!(collect_node_inputs("nope", &nodes, &edges, None).is_empty());
    }
}
