use weavecore::{NodeKind, NodeOutput, Record, TextConfig, UploadImageConfig, UploadVideoConfig, Value};

pub fn text(config: &TextConfig) -> NodeOutput {
    NodeOutput::new().with_output("output", config.text.clone().unwrap_or_default())
}

pub fn upload_image(config: &UploadImageConfig) -> NodeOutput {
    NodeOutput::new().with_output("outputUrl", config.image_url.clone().unwrap_or_default())
}

pub fn upload_video(config: &UploadVideoConfig) -> NodeOutput {
    NodeOutput::new().with_output("outputUrl", config.video_url.clone().unwrap_or_default())
}

/// Unknown node types hand on their `output` field, or their whole data object.
pub fn other(node_type: &str, data: &Record) -> NodeOutput {
    tracing::debug!(node_type, "passing through unknown node type");
    let value: Value = NodeKind::Other {
        node_type: node_type.to_string(),
        data: data.clone(),
    }
    .persisted_output();
    NodeOutput::new().with_output("output", value)
}
