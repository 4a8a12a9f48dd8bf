//! Completion service backed by the Google Generative Language REST API.

use crate::config::ServiceConfig;
use async_trait::async_trait;
use serde_json::{json, Value as Json};
use std::future::Future;
use std::time::Duration;
use weavecore::services::{Completion, CompletionRequest, CompletionService};
use weavecore::ServiceError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_VERSIONS: [&str; 2] = ["v1", "v1beta"];

/// One (model, API version) pair to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidate {
    pub model: String,
    pub version: &'static str,
}

/// Tries candidates in order until one answers.
///
/// A not-found class error moves on to the next candidate; any other error is
/// returned immediately. When every candidate is not found, the last such
/// error is returned.
pub async fn first_available<C, T, F, Fut>(candidates: &[C], mut attempt: F) -> Result<T, ServiceError>
where
    C: Clone,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut last = ServiceError::Unavailable("no model candidates".to_string());
    for candidate in candidates {
        match attempt(candidate.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_not_found() => {
                tracing::warn!("candidate unavailable, trying next: {}", e);
                last = e;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last)
}

/// Configured models first, then discovered "flash" models, without duplicates,
/// each crossed with both API versions.
pub fn model_candidates(configured: &[String], discovered: &[String]) -> Vec<ModelCandidate> {
    let mut models: Vec<String> = Vec::new();
    for name in configured.iter().chain(discovered) {
        let name = name.trim_start_matches("models/").to_string();
        if !name.is_empty() && !models.contains(&name) {
            models.push(name);
        }
    }
    models
        .into_iter()
        .flat_map(|model| {
            API_VERSIONS.iter().map(move |&version| ModelCandidate {
                model: model.clone(),
                version,
            })
        })
        .collect()
}

fn request_body(request: &CompletionRequest) -> Json {
    let mut parts = Vec::new();
    if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        parts.push(json!({ "text": format!("{}\n\n", system) }));
    }
    parts.push(json!({ "text": request.user_message }));
    for image in &request.images {
        parts.push(json!({
            "inlineData": { "mimeType": image.mime_type, "data": image.data }
        }));
    }
    json!({ "contents": [{ "role": "user", "parts": parts }] })
}

fn response_text(body: &Json) -> String {
    body["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Names of models the list endpoint reports as "flash" and able to generate content.
fn flash_models(body: &Json) -> Vec<String> {
    body["models"]
        .as_array()
        .map(|models| {
            models
                .iter()
                .filter(|m| {
                    let methods = m["supportedGenerationMethods"].as_array();
                    methods.map_or(true, |list| list.iter().any(|v| v == "generateContent"))
                })
                .filter_map(|m| m["name"].as_str())
                .filter(|name| name.contains("flash"))
                .map(|name| name.trim_start_matches("models/").to_string())
                .collect()
        })
        .unwrap_or_default()
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    models: Vec<String>,
    discover_models: bool,
    timeout: Duration,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, config: &ServiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            models: config.models.clone(),
            discover_models: config.discover_models,
            timeout: config.completion_timeout,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Client for the key in `config`, if one is set.
    pub fn from_config(config: &ServiceConfig) -> Option<Self> {
        config.api_key.as_ref().map(|key| Self::new(key.clone(), config))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn map_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            ServiceError::Network(e.to_string())
        }
    }

    /// Best effort; listing failures only mean no extra candidates.
    async fn discover(&self) -> Vec<String> {
        let url = format!("{}/v1/models?key={}", self.base_url, self.api_key);
        let response = match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(status = %r.status(), "model listing refused");
                return Vec::new();
            }
            Err(e) => {
                tracing::debug!("model listing failed: {}", e);
                return Vec::new();
            }
        };
        match response.json::<Json>().await {
            Ok(body) => flash_models(&body),
            Err(_) => Vec::new(),
        }
    }

    async fn generate(&self, candidate: &ModelCandidate, body: &Json) -> Result<Completion, ServiceError> {
        let url = format!(
            "{}/{}/models/{}:generateContent?key={}",
            self.base_url, candidate.version, candidate.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = if text.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                text
            };
            return Err(ServiceError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Json = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        let text = response_text(&payload);
        if text.trim().is_empty() {
            // Treated like a missing model so the next candidate gets a turn.
            return Err(ServiceError::NotFound(format!(
                "empty completion from {} ({})",
                candidate.model, candidate.version
            )));
        }
        tracing::info!(model = %candidate.model, version = candidate.version, "completion received");
        Ok(Completion {
            text,
            model: Some(candidate.model.clone()),
        })
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError> {
        let discovered = if self.discover_models {
            self.discover().await
        } else {
            Vec::new()
        };
        let configured: Vec<String> = request
            .model
            .iter()
            .chain(&self.models)
            .cloned()
            .collect();
        let candidates = model_candidates(&configured, &discovered);
        let body = request_body(request);
        let body = &body;
        first_available(&candidates, |candidate| async move { self.generate(&candidate, body).await }).await
    }
}
