//! Turns LLM image references into inline payloads.

use crate::config::ImageLimits;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::join_all;
use weavecore::services::InlineImage;
use weavecore::{EventEmitter, ServiceError};

const FALLBACK_MIME: &str = "image/jpeg";

/// Parses `data:<mime>;base64,<payload>`. An empty mime falls back to `image/jpeg`.
pub fn parse_data_url(url: &str) -> Option<InlineImage> {
    let rest = url.strip_prefix("data:")?;
    let (mime_type, data) = rest.split_once(";base64,")?;
    Some(InlineImage {
        mime_type: if mime_type.is_empty() {
            FALLBACK_MIME.to_string()
        } else {
            mime_type.to_string()
        },
        data: data.to_string(),
    })
}

pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Resolves image references for a completion request.
#[derive(Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    limits: ImageLimits,
}

impl ImageFetcher {
    pub fn new(limits: ImageLimits) -> Self {
        Self {
            client: reqwest::Client::new(),
            limits,
        }
    }

    /// Resolves at most `max_images` candidates concurrently, keeping their order.
    ///
    /// Unusable candidates are dropped with a warning. A fetch that times out
    /// fails the whole resolution.
    pub async fn resolve(
        &self,
        candidates: &[String],
        events: &EventEmitter,
    ) -> Result<Vec<InlineImage>, ServiceError> {
        let picked = &candidates[..candidates.len().min(self.limits.max_images)];
        let results = join_all(picked.iter().map(|url| self.resolve_one(url))).await;

        let mut images = Vec::with_capacity(results.len());
        for (url, result) in picked.iter().zip(results) {
            match result {
                Ok(Some(image)) => images.push(image),
                Ok(None) => {
                    tracing::warn!(url = %preview(url), "skipping unusable image reference");
                    events.warn(format!("Skipped image {}", preview(url)));
                }
                Err(e @ ServiceError::Timeout { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(url = %preview(url), "skipping image: {}", e);
                    events.warn(format!("Skipped image {}: {}", preview(url), e));
                }
            }
        }
        Ok(images)
    }

    async fn resolve_one(&self, url: &str) -> Result<Option<InlineImage>, ServiceError> {
        if url.starts_with("data:") {
            return Ok(parse_data_url(url));
        }
        if !is_http_url(url) {
            return Ok(None);
        }

        let seconds = self.limits.fetch_timeout.as_secs();
        let response = self
            .client
            .get(url)
            .timeout(self.limits.fetch_timeout)
            .send()
            .await
            .map_err(|e| fetch_error(e, seconds))?;

        if !response.status().is_success() {
            return Err(ServiceError::Http {
                status: response.status().as_u16(),
                message: format!("image fetch returned {}", response.status()),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_lowercase().starts_with("image/") {
            return Err(ServiceError::InvalidResponse(format!(
                "content type '{}' is not an image",
                content_type
            )));
        }
        let bytes = read_capped(response, self.limits.max_bytes, seconds).await?;

        Ok(Some(InlineImage {
            mime_type: content_type,
            data: STANDARD.encode(&bytes),
        }))
    }
}

impl Default for ImageFetcher {
    fn default() -> Self {
        Self::new(ImageLimits::default())
    }
}

/// Reads a response body in chunks, giving up as soon as it passes `max_bytes`.
pub(crate) async fn read_capped(
    mut response: reqwest::Response,
    max_bytes: u64,
    seconds: u64,
) -> Result<Vec<u8>, ServiceError> {
    let too_large = || ServiceError::InvalidResponse(format!("payload exceeds {} bytes", max_bytes));
    if response.content_length().is_some_and(|len| len > max_bytes) {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| fetch_error(e, seconds))? {
        if (body.len() + chunk.len()) as u64 > max_bytes {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

pub(crate) fn fetch_error(e: reqwest::Error, seconds: u64) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout { seconds }
    } else {
        ServiceError::Network(e.to_string())
    }
}

/// Short form of a reference for logs; data URLs are not echoed in full.
fn preview(url: &str) -> String {
    if url.starts_with("data:") {
        url.split(',').next().unwrap_or("data:").to_string()
    } else {
        url.chars().take(120).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canned::{response, serve, unsized_response};
    use std::time::Duration;
    use weavecore::EventBus;

    fn emitter() -> EventEmitter {
        EventBus::new(16).create_emitter(uuid::Uuid::new_v4(), "llm".into())
    }

    fn small_limits() -> ImageLimits {
        ImageLimits {
            fetch_timeout: Duration::from_millis(300),
            max_images: 2,
            max_bytes: 8,
        }
    }

    async fn fetch_one(reply: Vec<u8>) -> Result<Vec<InlineImage>, ServiceError> {
        let base = serve(vec![reply]).await;
        ImageFetcher::new(small_limits())
            .resolve(&[format!("{}/picture", base)], &emitter())
            .await
    }

    #[test]
    fn data_urls_parse() {
        let image = parse_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "iVBORw0KGgo=");

        let bare = parse_data_url("data:;base64,AAAA").unwrap();
        assert_eq!(bare.mime_type, "image/jpeg");

        assert!(parse_data_url("data:text/plain,hello").is_none());
        assert!(parse_data_url("https://example.com/a.png").is_none());
    }

    #[tokio::test]
    async fn caps_and_skips_without_network() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let events = bus.create_emitter(uuid::Uuid::new_v4(), "llm".into());
        let fetcher = ImageFetcher::default();

        let candidates = vec![
            "ftp://nope/a.png".to_string(),
            "data:image/png;base64,AAAA".to_string(),
            "data:image/gif;base64,BBBB".to_string(),
        ];
        let images = fetcher.resolve(&candidates, &events).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].data, "AAAA");
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn fetched_image_is_inlined() {
        let images = fetch_one(response("200 OK", "image/png", b"PNG")).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
        assert_eq!(images[0].data, STANDARD.encode(b"PNG"));
    }

    #[tokio::test]
    async fn bad_status_type_or_size_is_skipped() {
        let replies = vec![
            response("404 Not Found", "image/png", b""),
            response("200 OK", "text/html", b"<html>"),
            response("200 OK", "image/png", b"0123456789"),
            unsized_response("image/png", b"0123456789abcdef"),
        ];
        for reply in replies {
            assert_eq!(fetch_one(reply).await, Ok(Vec::new()));
        }
    }

    #[tokio::test]
    async fn stalled_fetch_fails_with_timeout() {
        let base = serve(Vec::new()).await;
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            ImageFetcher::new(small_limits()).resolve(&[format!("{}/slow.png", base)], &emitter()),
        )
        .await
        .expect("fetch is bounded by its own timeout");
        assert!(matches!(result, Err(ServiceError::Timeout { .. })));
    }
}
