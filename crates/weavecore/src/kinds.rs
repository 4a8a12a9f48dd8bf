//! Closed set of node types and their typed configuration.
//!
//! A node's `data` blob carries both static configuration and the last result the
//! engine wrote back; each variant owns a struct for exactly the fields it uses.

use crate::{Record, Value};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Text,
    UploadImage,
    UploadVideo,
    Llm,
    CropImage,
    ExtractFrame,
}

impl NodeType {
    pub const ALL: [NodeType; 6] = [
        NodeType::Text,
        NodeType::UploadImage,
        NodeType::UploadVideo,
        NodeType::Llm,
        NodeType::CropImage,
        NodeType::ExtractFrame,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Text => "text",
            NodeType::UploadImage => "uploadImage",
            NodeType::UploadVideo => "uploadVideo",
            NodeType::Llm => "llm",
            NodeType::CropImage => "cropImage",
            NodeType::ExtractFrame => "extractFrame",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        NodeType::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextConfig {
    #[serde(deserialize_with = "lenient_string")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadVideoConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// Last completion written back by the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CropImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub x_percent: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub y_percent: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub width_percent: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub height_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
}

impl Default for CropImageConfig {
    fn default() -> Self {
        Self {
            image_url: None,
            x_percent: Some(0.0),
            y_percent: Some(0.0),
            width_percent: Some(100.0),
            height_percent: Some(100.0),
            output_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractFrameConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Seconds (`"12.5"`) or a share of the duration (`"50%"`).
    #[serde(deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
}

/// Node type plus its configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Text(TextConfig),
    UploadImage(UploadImageConfig),
    UploadVideo(UploadVideoConfig),
    Llm(LlmConfig),
    CropImage(CropImageConfig),
    ExtractFrame(ExtractFrameConfig),
    /// A type this engine does not know; executed as a best-effort passthrough.
    Other { node_type: String, data: Record },
}

impl NodeKind {
    pub fn node_type(&self) -> Option<NodeType> {
        match self {
            NodeKind::Text(_) => Some(NodeType::Text),
            NodeKind::UploadImage(_) => Some(NodeType::UploadImage),
            NodeKind::UploadVideo(_) => Some(NodeType::UploadVideo),
            NodeKind::Llm(_) => Some(NodeType::Llm),
            NodeKind::CropImage(_) => Some(NodeType::CropImage),
            NodeKind::ExtractFrame(_) => Some(NodeType::ExtractFrame),
            NodeKind::Other { .. } => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            NodeKind::Other { node_type, .. } => node_type,
            known => known.node_type().map(|t| t.as_str()).unwrap_or("unknown"),
        }
    }

    /// Field of this node's run-scoped outputs record that downstream nodes read.
    pub fn output_field(&self) -> &'static str {
        match self {
            NodeKind::Text(_) | NodeKind::Llm(_) | NodeKind::Other { .. } => "output",
            NodeKind::UploadImage(_)
            | NodeKind::UploadVideo(_)
            | NodeKind::CropImage(_)
            | NodeKind::ExtractFrame(_) => "outputUrl",
        }
    }

    /// Last-known value of this node when no run-scoped output exists.
    pub fn persisted_output(&self) -> Value {
        let text = |s: &Option<String>| Value::String(s.clone().unwrap_or_default());
        match self {
            NodeKind::Text(c) => text(&c.text),
            NodeKind::UploadImage(c) => text(&c.image_url),
            NodeKind::UploadVideo(c) => text(&c.video_url),
            NodeKind::Llm(c) => text(&c.response),
            NodeKind::CropImage(c) => text(&c.output_url),
            NodeKind::ExtractFrame(c) => text(&c.output_url),
            NodeKind::Other { data, .. } => data
                .get("output")
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| Value::Object(data.clone())),
        }
    }

    /// Writes a successful run's outputs back into the node's last-known results.
    pub fn apply_outputs(&mut self, outputs: &Record) {
        let output = outputs.get("output").and_then(Value::to_text);
        let output_url = outputs.get("outputUrl").and_then(Value::to_text);
        match self {
            NodeKind::Llm(c) => {
                if output.is_some() {
                    c.response = output;
                }
            }
            NodeKind::CropImage(c) => {
                if output_url.is_some() {
                    c.output_url = output_url;
                }
            }
            NodeKind::ExtractFrame(c) => {
                if output_url.is_some() {
                    c.output_url = output_url;
                }
            }
            NodeKind::Other { data, .. } => {
                if let Some(value) = outputs.get("output") {
                    data.insert("output".to_string(), value.clone());
                }
            }
            NodeKind::Text(_) | NodeKind::UploadImage(_) | NodeKind::UploadVideo(_) => {}
        }
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| Value::from(v).to_number()))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| Value::from(v).to_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_percentages_accept_strings() {
        let config: CropImageConfig =
            serde_json::from_value(serde_json::json!({ "xPercent": "10", "widthPercent": 80 }))
                .unwrap();
        assert_eq!(config.x_percent, Some(10.0));
        assert_eq!(config.width_percent, Some(80.0));
        assert_eq!(config.y_percent, Some(0.0));
        assert_eq!(config.height_percent, Some(100.0));
    }

    #[test]
    fn persisted_output_by_type() {
        let llm = NodeKind::Llm(LlmConfig {
            response: Some("hi".into()),
            ..Default::default()
        });
        assert_eq!(llm.persisted_output(), Value::from("hi"));
        assert_eq!(llm.output_field(), "output");

        let crop = NodeKind::CropImage(CropImageConfig::default());
        assert_eq!(crop.persisted_output(), Value::from(""));
        assert_eq!(crop.output_field(), "outputUrl");
    }

    #[test]
    fn unknown_kind_passes_its_data_through() {
        let mut data = Record::new();
        data.insert("label".into(), Value::from("Note"));
        let kind = NodeKind::Other {
            node_type: "note".into(),
            data: data.clone(),
        };
        assert_eq!(kind.persisted_output(), Value::Object(data));
    }

    #[test]
    fn apply_outputs_updates_results() {
        let mut kind = NodeKind::ExtractFrame(ExtractFrameConfig::default());
        let mut outputs = Record::new();
        outputs.insert("outputUrl".into(), Value::from("data:image/png;base64,AA=="));
        kind.apply_outputs(&outputs);
        assert_eq!(kind.persisted_output(), Value::from("data:image/png;base64,AA=="));
    }
}
