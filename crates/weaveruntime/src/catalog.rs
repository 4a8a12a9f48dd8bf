use crate::validation::HandleType;
use serde::Serialize;
use weavecore::{GraphNode, NodeType, DEFAULT_SOURCE_HANDLE};

/// Metadata about a node type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    pub node_type: NodeType,
    pub label: &'static str,
    pub description: &'static str,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDefinition {
    pub id: &'static str,
    pub label: &'static str,
    pub handle_type: HandleType,
    pub required: bool,
}

impl PortDefinition {
    fn new(id: &'static str, label: &'static str, handle_type: HandleType) -> Self {
        Self {
            id,
            label,
            handle_type,
            required: false,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Static description of every node type the engine can run.
#[derive(Debug, Clone)]
pub struct NodeCatalog {
    descriptors: Vec<NodeDescriptor>,
}

impl NodeCatalog {
    pub fn new() -> Self {
        use HandleType::*;
        let output = |t| vec![PortDefinition::new(DEFAULT_SOURCE_HANDLE, "Output", t)];

        let descriptors = vec![
            NodeDescriptor {
                node_type: NodeType::Text,
                label: "Text",
                description: "Emits a literal text value",
                inputs: vec![],
                outputs: output(Text),
            },
            NodeDescriptor {
                node_type: NodeType::UploadImage,
                label: "Upload Image",
                description: "Emits the URL of an uploaded image",
                inputs: vec![],
                outputs: output(Image),
            },
            NodeDescriptor {
                node_type: NodeType::UploadVideo,
                label: "Upload Video",
                description: "Emits the URL of an uploaded video",
                inputs: vec![],
                outputs: output(Video),
            },
            NodeDescriptor {
                node_type: NodeType::Llm,
                label: "Run LLM",
                description: "Sends a prompt and up to two images to the completion service",
                inputs: vec![
                    PortDefinition::new("system_prompt", "System Prompt", Text),
                    PortDefinition::new("user_message", "User Message", Text).required(),
                    PortDefinition::new("images", "Images", Image),
                ],
                outputs: output(Text),
            },
            NodeDescriptor {
                node_type: NodeType::CropImage,
                label: "Crop Image",
                description: "Crops an image to a rectangle given in percent",
                inputs: vec![
                    PortDefinition::new("image_url", "Image", Image).required(),
                    PortDefinition::new("x_percent", "X %", Number),
                    PortDefinition::new("y_percent", "Y %", Number),
                    PortDefinition::new("width_percent", "Width %", Number),
                    PortDefinition::new("height_percent", "Height %", Number),
                ],
                outputs: output(Image),
            },
            NodeDescriptor {
                node_type: NodeType::ExtractFrame,
                label: "Extract Frame",
                description: "Grabs one frame from a video at a time in seconds or percent",
                inputs: vec![
                    PortDefinition::new("video_url", "Video", Video).required(),
                    PortDefinition::new("timestamp", "Timestamp", Text),
                ],
                outputs: output(Image),
            },
        ];

        Self { descriptors }
    }

    pub fn descriptors(&self) -> &[NodeDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, node_type: NodeType) -> Option<&NodeDescriptor> {
        self.descriptors.iter().find(|d| d.node_type == node_type)
    }

    /// Declared type of `handle` on the output side of `node`. Unknown handles read as text.
    pub fn output_type(&self, node: &GraphNode, handle: &str) -> HandleType {
        self.port_type(node, handle, |d| &d.outputs)
    }

    /// Declared type of `handle` on the input side of `node`. Unknown handles read as text.
    pub fn input_type(&self, node: &GraphNode, handle: &str) -> HandleType {
        self.port_type(node, handle, |d| &d.inputs)
    }

    fn port_type(
        &self,
        node: &GraphNode,
        handle: &str,
        ports: impl Fn(&NodeDescriptor) -> &Vec<PortDefinition>,
    ) -> HandleType {
        node.kind
            .node_type()
            .and_then(|t| self.get(t))
            .and_then(|d| ports(d).iter().find(|p| p.id == handle).map(|p| p.handle_type))
            .unwrap_or(HandleType::Text)
    }
}

impl Default for NodeCatalog {
    fn default() -> Self {
        Self::new()
    }
}
