use crate::kinds::{
    CropImageConfig, ExtractFrameConfig, LlmConfig, NodeKind, NodeType, TextConfig,
    UploadImageConfig, UploadVideoConfig,
};
use crate::{Record, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type NodeId = String;

pub const DEFAULT_SOURCE_HANDLE: &str = "output";
pub const DEFAULT_TARGET_HANDLE: &str = "input";

/// Persisted workflow: a flat, acyclic graph plus editor state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default = "Uuid::new_v4")]
    pub id: WorkflowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            viewport: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_node(&mut self, node: GraphNode) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Appends an edge without design-time checks.
    pub fn connect(
        &mut self,
        source: impl Into<NodeId>,
        source_handle: impl Into<String>,
        target: impl Into<NodeId>,
        target_handle: impl Into<String>,
    ) -> &Edge {
        let edge = Edge::new(source, target).with_handles(source_handle, target_handle);
        let index = self.edges.len();
        self.edges.push(edge);
        &self.edges[index]
    }

    pub fn find_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Drops inline `data:` payloads from node data before the workflow is stored.
    pub fn sanitize(&mut self) {
        for node in &mut self.nodes {
            node.strip_inline_payloads();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

/// Node position in the visual editor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node of the workflow graph.
///
/// On the wire this is `{id, type, position?, data}`; `data` is parsed into the
/// typed configuration of [`NodeKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct GraphNode {
    pub id: NodeId,
    pub label: Option<String>,
    pub position: Option<Position>,
    pub kind: NodeKind,
}

impl GraphNode {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: None,
            position: None,
            kind,
        }
    }

    pub fn text(id: impl Into<NodeId>, text: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Text(TextConfig {
                text: Some(text.into()),
            }),
        )
    }

    pub fn upload_image(id: impl Into<NodeId>, url: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::UploadImage(UploadImageConfig {
                image_url: Some(url.into()),
                file_name: None,
            }),
        )
    }

    pub fn upload_video(id: impl Into<NodeId>, url: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::UploadVideo(UploadVideoConfig {
                video_url: Some(url.into()),
                file_name: None,
            }),
        )
    }

    pub fn llm(id: impl Into<NodeId>) -> Self {
        Self::new(id, NodeKind::Llm(LlmConfig::default()))
    }

    pub fn crop_image(id: impl Into<NodeId>, config: CropImageConfig) -> Self {
        Self::new(id, NodeKind::CropImage(config))
    }

    pub fn extract_frame(id: impl Into<NodeId>, timestamp: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::ExtractFrame(ExtractFrameConfig {
                timestamp: Some(timestamp.into()),
                ..Default::default()
            }),
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    fn strip_inline_payloads(&mut self) {
        fn strip(field: &mut Option<String>) {
            if field.as_deref().is_some_and(|s| s.starts_with("data:")) {
                *field = None;
            }
        }
        match &mut self.kind {
            NodeKind::UploadImage(c) => strip(&mut c.image_url),
            NodeKind::UploadVideo(c) => strip(&mut c.video_url),
            NodeKind::CropImage(c) => {
                strip(&mut c.image_url);
                strip(&mut c.output_url);
            }
            NodeKind::ExtractFrame(c) => {
                strip(&mut c.video_url);
                strip(&mut c.output_url);
            }
            NodeKind::Other { data, .. } => {
                for key in ["imageUrl", "videoUrl", "outputUrl"] {
                    if data
                        .get(key)
                        .and_then(Value::as_str)
                        .is_some_and(|s| s.starts_with("data:"))
                    {
                        data.remove(key);
                    }
                }
            }
            NodeKind::Text(_) | NodeKind::Llm(_) => {}
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: String,
    #[serde(rename = "type", default)]
    node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<Position>,
    #[serde(default)]
    data: serde_json::Map<String, serde_json::Value>,
}

impl TryFrom<RawNode> for GraphNode {
    type Error = String;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        if raw.id.is_empty() {
            return Err("node is missing an id".to_string());
        }
        let mut data = raw.data;
        let label = data
            .remove("label")
            .and_then(|v| v.as_str().map(str::to_string));
        let declared = data
            .remove("nodeType")
            .and_then(|v| v.as_str().map(str::to_string))
            .or(raw.node_type)
            .ok_or_else(|| format!("node '{}' is missing a type", raw.id))?;

        let config = serde_json::Value::Object(data.clone());
        let parse_err = |e: serde_json::Error| format!("node '{}': {}", raw.id, e);
        let kind = match NodeType::parse(&declared) {
            Some(NodeType::Text) => NodeKind::Text(serde_json::from_value(config).map_err(parse_err)?),
            Some(NodeType::UploadImage) => {
                NodeKind::UploadImage(serde_json::from_value(config).map_err(parse_err)?)
            }
            Some(NodeType::UploadVideo) => {
                NodeKind::UploadVideo(serde_json::from_value(config).map_err(parse_err)?)
            }
            Some(NodeType::Llm) => NodeKind::Llm(serde_json::from_value(config).map_err(parse_err)?),
            Some(NodeType::CropImage) => {
                NodeKind::CropImage(serde_json::from_value(config).map_err(parse_err)?)
            }
            Some(NodeType::ExtractFrame) => {
                NodeKind::ExtractFrame(serde_json::from_value(config).map_err(parse_err)?)
            }
            None => NodeKind::Other {
                node_type: declared,
                data: data.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            },
        };

        Ok(GraphNode {
            id: raw.id,
            label,
            position: raw.position,
            kind,
        })
    }
}

impl From<GraphNode> for RawNode {
    fn from(node: GraphNode) -> Self {
        let node_type = node.type_name().to_string();
        let config = match node.kind {
            NodeKind::Text(c) => serde_json::to_value(c),
            NodeKind::UploadImage(c) => serde_json::to_value(c),
            NodeKind::UploadVideo(c) => serde_json::to_value(c),
            NodeKind::Llm(c) => serde_json::to_value(c),
            NodeKind::CropImage(c) => serde_json::to_value(c),
            NodeKind::ExtractFrame(c) => serde_json::to_value(c),
            NodeKind::Other { data, .. } => Ok(serde_json::Value::from(Value::Object(data))),
        };
        let mut data = match config {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        data.insert("nodeType".into(), serde_json::Value::String(node_type.clone()));
        if let Some(label) = node.label {
            data.insert("label".into(), serde_json::Value::String(label));
        }
        RawNode {
            id: node.id,
            node_type: Some(node_type),
            position: node.position,
            data,
        }
    }
}

/// Directed data dependency: `target`'s `target_handle` receives `source`'s `source_handle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default = "default_source_handle", deserialize_with = "handle_or_default::source")]
    pub source_handle: String,
    #[serde(default = "default_target_handle", deserialize_with = "handle_or_default::target")]
    pub target_handle: String,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}-{}", source, target),
            source,
            target,
            source_handle: default_source_handle(),
            target_handle: default_target_handle(),
        }
    }

    pub fn with_handles(
        mut self,
        source_handle: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        self.source_handle = source_handle.into();
        self.target_handle = target_handle.into();
        self.id = format!(
            "{}-{}-{}-{}",
            self.source, self.source_handle, self.target, self.target_handle
        );
        self
    }
}

fn default_source_handle() -> String {
    DEFAULT_SOURCE_HANDLE.to_string()
}

fn default_target_handle() -> String {
    DEFAULT_TARGET_HANDLE.to_string()
}

// The editor writes `null` for handles it never named.
mod handle_or_default {
    use serde::{Deserialize, Deserializer};

    pub fn source<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(Option::<String>::deserialize(d)?.unwrap_or_else(super::default_source_handle))
    }

    pub fn target<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(Option::<String>::deserialize(d)?.unwrap_or_else(super::default_target_handle))
    }
}

/// Convenience for building a record literal in handlers and tests.
pub fn record<I, K, V>(entries: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
