//! Standard node library
//!
//! Handlers for the built-in node types and the external services they call:
//! the Gemini completion client and the ffmpeg media transforms.

#[cfg(test)]
mod canned;
mod config;
mod crop;
mod dispatcher;
mod frame;
mod gemini;
mod images;
mod llm;
mod media;
mod passthrough;

pub use config::{ImageLimits, ServiceConfig, DEFAULT_MODELS};
pub use crop::CropImageNode;
pub use dispatcher::StandardDispatcher;
pub use frame::{ExtractFrameNode, DEFAULT_TIMESTAMP};
pub use gemini::{first_available, model_candidates, GeminiClient, ModelCandidate};
pub use images::{is_http_url, parse_data_url, ImageFetcher};
pub use llm::LlmNode;
pub use media::{crop_rect, resolve_timestamp, CropRect, FfmpegMedia};
