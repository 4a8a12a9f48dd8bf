use std::sync::Arc;
use weavecore::services::MediaTransform;
use weavecore::{ExtractFrameConfig, NodeContext, NodeError, NodeOutput};

pub const DEFAULT_TIMESTAMP: &str = "0";

/// Grabs a single frame from a video through the media service.
pub struct ExtractFrameNode {
    media: Arc<dyn MediaTransform>,
}

impl ExtractFrameNode {
    pub fn new(media: Arc<dyn MediaTransform>) -> Self {
        Self { media }
    }

    pub async fn execute(&self, config: &ExtractFrameConfig, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let video_url = ctx
            .input_text("video_url")
            .or_else(|| ctx.input_text("input"))
            .or_else(|| config.video_url.clone().filter(|u| !u.trim().is_empty()))
            .ok_or_else(|| NodeError::MissingInput("video_url".to_string()))?;

        let timestamp = ctx
            .input_text("timestamp")
            .or_else(|| config.timestamp.clone().filter(|t| !t.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_TIMESTAMP.to_string());

        ctx.events.info(format!("Extracting frame at {}", timestamp));
        let output_url = self.media.extract_frame(&video_url, &timestamp).await?;
        Ok(NodeOutput::new().with_output("outputUrl", output_url))
    }
}
