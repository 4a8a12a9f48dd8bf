use crate::{events::EventEmitter, GraphNode, NodeError, NodeId, Record, RunId, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Executes one node given its resolved inputs.
///
/// Implementations switch over [`crate::NodeKind`]; the executor calls `run`
/// once per node, strictly in plan order.
#[async_trait]
pub trait NodeDispatcher: Send + Sync {
    async fn run(&self, node: &GraphNode, ctx: NodeContext) -> Result<NodeOutput, NodeError>;
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    pub run_id: RunId,

    pub node_id: NodeId,

    /// Values collected from incoming edges, keyed by target handle
    pub inputs: Record,

    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl NodeContext {
    pub fn new(run_id: RunId, node_id: impl Into<NodeId>, inputs: Record, events: EventEmitter) -> Self {
        Self {
            run_id,
            node_id: node_id.into(),
            inputs,
            events,
        }
    }

    /// Connected input, ignoring nulls.
    pub fn input(&self, handle: &str) -> Option<&Value> {
        self.inputs.get(handle).filter(|v| !v.is_null())
    }

    /// Get required input or return error
    pub fn require_input(&self, handle: &str) -> Result<&Value, NodeError> {
        self.input(handle)
            .ok_or_else(|| NodeError::MissingInput(handle.to_string()))
    }

    /// Connected input as non-empty text. A fan-in list yields its first text member.
    pub fn input_text(&self, handle: &str) -> Option<String> {
        match self.input(handle)? {
            Value::Array(items) => items.iter().find_map(|v| v.to_text()),
            other => other.to_text(),
        }
        .filter(|s| !s.trim().is_empty())
    }

    /// Connected input as a number, parsing numeric strings.
    pub fn input_number(&self, handle: &str) -> Option<f64> {
        match self.input(handle)? {
            Value::Array(items) => items.iter().find_map(Value::to_number),
            other => other.to_number(),
        }
    }
}

/// Output from node execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Output fields, e.g. `output` or `outputUrl`
    pub outputs: Record,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(field.into(), value.into());
        self
    }
}
