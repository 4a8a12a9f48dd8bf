//! Boundary contracts for the external services node handlers call.

use crate::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Image passed to the completion service as an inline base64 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    /// Model to try before the service's own candidates.
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub user_message: String,
    pub images: Vec<InlineImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    /// Model that produced the text, when the service reports it.
    pub model: Option<String>,
}

/// Black-box text/image completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError>;
}

/// Crop rectangle expressed in percent of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropParams {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for CropParams {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        }
    }
}

/// Black-box media operations over a source reference (http(s) or `data:` URL).
///
/// Both return a usable output reference, typically an inline `data:` URL.
#[async_trait]
pub trait MediaTransform: Send + Sync {
    async fn crop_image(&self, image_url: &str, params: CropParams) -> Result<String, ServiceError>;

    async fn extract_frame(&self, video_url: &str, timestamp: &str) -> Result<String, ServiceError>;
}
