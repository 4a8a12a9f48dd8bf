use std::sync::Arc;
use weavecore::services::{CropParams, MediaTransform};
use weavecore::{CropImageConfig, NodeContext, NodeError, NodeOutput};

/// Crops an image to a percent rectangle through the media service.
pub struct CropImageNode {
    media: Arc<dyn MediaTransform>,
}

impl CropImageNode {
    pub fn new(media: Arc<dyn MediaTransform>) -> Self {
        Self { media }
    }

    /// Connected inputs first, then the node's own settings, then the full frame.
    pub fn params(config: &CropImageConfig, ctx: &NodeContext) -> CropParams {
        let defaults = CropParams::default();
        let pick = |handle: &str, configured: Option<f64>, fallback: f64| {
            ctx.input_number(handle).or(configured).unwrap_or(fallback)
        };
        CropParams {
            x: pick("x_percent", config.x_percent, defaults.x),
            y: pick("y_percent", config.y_percent, defaults.y),
            width: pick("width_percent", config.width_percent, defaults.width),
            height: pick("height_percent", config.height_percent, defaults.height),
        }
    }

    pub async fn execute(&self, config: &CropImageConfig, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let image_url = ctx
            .input_text("image_url")
            .or_else(|| ctx.input_text("input"))
            .or_else(|| config.image_url.clone().filter(|u| !u.trim().is_empty()))
            .ok_or_else(|| NodeError::MissingInput("image_url".to_string()))?;

        let params = Self::params(config, ctx);
        ctx.events.info(format!(
            "Cropping x={} y={} w={} h={} (percent)",
            params.x, params.y, params.width, params.height
        ));

        let output_url = self.media.crop_image(&image_url, params).await?;
        Ok(NodeOutput::new().with_output("outputUrl", output_url))
    }
}
