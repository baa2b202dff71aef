//! Vision label detection client.
//!
//! Sends image content (base64) to an annotation endpoint using the Google
//! Vision request shape: one request per image with label detection, web
//! detection, and object localization features. Only the label annotations
//! feed the pipeline; the narrative stage is never started without them.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{build_http_client, ApiError, LabelDetector};
use crate::config::VisionConfig;

/// Vision annotation API client.
pub struct VisionApiClient {
    client: reqwest::Client,
    config: VisionConfig,
}

#[derive(Debug, Serialize)]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "maxResults")]
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageResponse {
    #[serde(default, rename = "labelAnnotations")]
    label_annotations: Vec<LabelAnnotation>,
    #[serde(default)]
    error: Option<ResponseError>,
}

#[derive(Debug, Deserialize)]
struct LabelAnnotation {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    #[serde(default)]
    message: String,
}

impl VisionApiClient {
    /// Create a new vision client.
    pub fn new(config: VisionConfig, timeout: std::time::Duration) -> Self {
        Self {
            client: build_http_client(timeout),
            config,
        }
    }

    fn request_url(&self) -> String {
        match &self.config.api_key {
            Some(key) => format!("{}?key={}", self.config.endpoint, key),
            None => self.config.endpoint.clone(),
        }
    }

    fn build_request(&self, bytes: &[u8]) -> AnnotateRequest {
        let content = base64::engine::general_purpose::STANDARD.encode(bytes);
        AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent { content },
                features: vec![
                    Feature {
                        kind: "LABEL_DETECTION",
                        max_results: self.config.max_results,
                    },
                    Feature {
                        kind: "WEB_DETECTION",
                        max_results: self.config.max_results,
                    },
                    Feature {
                        kind: "OBJECT_LOCALIZATION",
                        max_results: self.config.max_results,
                    },
                ],
            }],
        }
    }
}

/// Pull the label descriptions out of an annotation response.
fn parse_labels(response: AnnotateResponse) -> Result<Vec<String>, ApiError> {
    let first = response
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Parse("annotation response is empty".to_string()))?;

    if let Some(err) = first.error {
        return Err(ApiError::Api(err.message));
    }

    let labels: Vec<String> = first
        .label_annotations
        .into_iter()
        .map(|l| l.description)
        .filter(|d| !d.is_empty())
        .collect();

    if labels.is_empty() {
        return Err(ApiError::Parse(
            "label detection returned no labels".to_string(),
        ));
    }

    Ok(labels)
}

#[async_trait]
impl LabelDetector for VisionApiClient {
    async fn detect_labels(&self, bytes: &[u8]) -> Result<Vec<String>, ApiError> {
        let request = self.build_request(bytes);

        debug!(size = bytes.len(), "requesting label detection");

        let resp = self
            .client
            .post(self.request_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("HTTP {}: {}", status, body)));
        }

        let annotated: AnnotateResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        parse_labels(annotated)
    }
}
