use crate::images::ImageFetcher;
use std::sync::Arc;
use weavecore::services::{CompletionRequest, CompletionService};
use weavecore::{LlmConfig, NodeContext, NodeError, NodeOutput, Value};

/// Runs a prompt through the completion service.
pub struct LlmNode {
    completion: Option<Arc<dyn CompletionService>>,
    images: ImageFetcher,
}

/// String references held by an input, flattening fan-in lists.
fn image_refs(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().flat_map(|v| image_refs(Some(v))).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

impl LlmNode {
    pub fn new(completion: Option<Arc<dyn CompletionService>>, images: ImageFetcher) -> Self {
        Self { completion, images }
    }

    /// Image references in priority order: `images`, then `input`/`output`, then configuration.
    fn image_candidates(config: &LlmConfig, ctx: &NodeContext) -> Vec<String> {
        let connected = image_refs(ctx.input("images"));
        if !connected.is_empty() {
            return connected;
        }
        let mut fallback = image_refs(ctx.input("input"));
        fallback.extend(image_refs(ctx.input("output")));
        if !fallback.is_empty() {
            return fallback;
        }
        config.images.iter().filter(|s| !s.trim().is_empty()).cloned().collect()
    }

    pub async fn execute(&self, config: &LlmConfig, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let completion = self
            .completion
            .as_ref()
            .ok_or_else(|| NodeError::Configuration("GOOGLE_AI_API_KEY not configured".to_string()))?;

        let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.trim().is_empty());
        let system_prompt = ctx
            .input_text("system_prompt")
            .or_else(|| non_empty(&config.system_prompt));
        let user_message = ctx
            .input_text("user_message")
            .or_else(|| non_empty(&config.user_message))
            .ok_or_else(|| NodeError::MissingInput("user_message".to_string()))?;

        let candidates = Self::image_candidates(config, ctx);
        let images = self.images.resolve(&candidates, &ctx.events).await?;
        ctx.events.info(format!(
            "Sending prompt with {} of {} image(s)",
            images.len(),
            candidates.len()
        ));

        let request = CompletionRequest {
            model: non_empty(&config.model),
            system_prompt,
            user_message,
            images,
        };
        let completion = completion.complete(&request).await?;

        let mut output = NodeOutput::new().with_output("output", completion.text);
        if let Some(model) = completion.model.or(request.model) {
            output = output.with_output("model", model);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weavecore::{record, EventBus};

    fn ctx(inputs: weavecore::Record) -> NodeContext {
        let bus = EventBus::new(8);
        let run_id = uuid::Uuid::new_v4();
        NodeContext::new(run_id, "llm", inputs, bus.create_emitter(run_id, "llm".into()))
    }

    #[test]
    fn images_input_wins() {
        let config = LlmConfig {
            images: vec!["cfg.png".into()],
            ..Default::default()
        };
        let c = ctx(record([
            ("images", Value::Array(vec!["a".into(), Value::Null, "b".into()])),
            ("input", Value::from("c")),
        ]));
        assert_eq!(LlmNode::image_candidates(&config, &c), vec!["a", "b"]);
    }

    #[test]
    fn falls_back_to_generic_handles_then_config() {
        let config = LlmConfig {
            images: vec!["cfg.png".into()],
            ..Default::default()
        };
        let c = ctx(record([("input", "in"), ("output", "out")]));
        assert_eq!(LlmNode::image_candidates(&config, &c), vec!["in", "out"]);

        let c = ctx(record([("user_message", "hi")]));
        assert_eq!(LlmNode::image_candidates(&config, &c), vec!["cfg.png"]);
    }

    #[tokio::test]
    async fn missing_key_is_a_configuration_error() {
        let node = LlmNode::new(None, ImageFetcher::default());
        let result = node
            .execute(&LlmConfig::default(), &ctx(record([("user_message", "hi")])))
            .await;
        assert!(matches!(result, Err(NodeError::Configuration(_))));
    }
}
