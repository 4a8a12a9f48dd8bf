use crate::config::ServiceConfig;
use crate::crop::CropImageNode;
use crate::frame::ExtractFrameNode;
use crate::gemini::GeminiClient;
use crate::images::ImageFetcher;
use crate::llm::LlmNode;
use crate::media::FfmpegMedia;
use crate::passthrough;
use async_trait::async_trait;
use std::sync::Arc;
use weavecore::services::{CompletionService, MediaTransform};
use weavecore::{GraphNode, NodeContext, NodeDispatcher, NodeError, NodeKind, NodeOutput};

/// Dispatcher for the built-in node types.
pub struct StandardDispatcher {
    llm: LlmNode,
    crop: CropImageNode,
    frame: ExtractFrameNode,
}

impl StandardDispatcher {
    pub fn new(
        completion: Option<Arc<dyn CompletionService>>,
        media: Arc<dyn MediaTransform>,
        images: ImageFetcher,
    ) -> Self {
        Self {
            llm: LlmNode::new(completion, images),
            crop: CropImageNode::new(media.clone()),
            frame: ExtractFrameNode::new(media),
        }
    }

    /// Gemini for completions (when a key is configured) and ffmpeg for media.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let completion = GeminiClient::from_config(config)
            .map(|client| Arc::new(client) as Arc<dyn CompletionService>);
        if completion.is_none() {
            tracing::warn!("GOOGLE_AI_API_KEY not set, llm nodes will fail");
        }
        Self::new(
            completion,
            Arc::new(FfmpegMedia::new(config)),
            ImageFetcher::new(config.images.clone()),
        )
    }
}

#[async_trait]
impl NodeDispatcher for StandardDispatcher {
    async fn run(&self, node: &GraphNode, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        tracing::debug!(node_id = %node.id, node_type = node.type_name(), "dispatching node");
        match &node.kind {
            NodeKind::Text(config) => Ok(passthrough::text(config)),
            NodeKind::UploadImage(config) => Ok(passthrough::upload_image(config)),
            NodeKind::UploadVideo(config) => Ok(passthrough::upload_video(config)),
            NodeKind::Llm(config) => self.llm.execute(config, &ctx).await,
            NodeKind::CropImage(config) => self.crop.execute(config, &ctx).await,
            NodeKind::ExtractFrame(config) => self.frame.execute(config, &ctx).await,
            NodeKind::Other { node_type, data } => Ok(passthrough::other(node_type, data)),
        }
    }
}
