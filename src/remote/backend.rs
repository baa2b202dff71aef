//! Case-management backend client.
//!
//! Two endpoints matter to the pipeline: the case listing that gates the
//! acceptor, and the evidence write the persister issues exactly once per
//! session. The backend's error envelope is not uniform across endpoints
//! (`msg`, `message`, or a nested `error.message` depending on the route),
//! so every failure is normalized here before it reaches pipeline logic.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{build_http_client, ApiError, EvidenceStore};
use crate::config::BackendConfig;
use crate::models::{CaseSummary, EvidenceRecord};

/// REST client for the case-management backend.
pub struct BackendClient {
    client: reqwest::Client,
    config: BackendConfig,
}

/// Success/error envelope shared by backend endpoints.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
}

/// Extract a human-readable error message from a backend response body.
///
/// Checks the envelope shapes observed across endpoints in order:
/// `msg`, `message`, then `error.message`.
fn error_message(body: &Value) -> String {
    body.get("msg")
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str))
        .or_else(|| {
            body.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
        })
        .unwrap_or("unknown backend error")
        .to_string()
}

impl BackendClient {
    /// Create a new backend client.
    pub fn new(config: BackendConfig, timeout: std::time::Duration) -> Self {
        Self {
            client: build_http_client(timeout),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Decode a backend response into its envelope, normalizing every
    /// failure shape into [`ApiError`].
    async fn decode(&self, resp: reqwest::Response) -> Result<Envelope, ApiError> {
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Api(format!(
                "HTTP {}: {}",
                status,
                error_message(&body)
            )));
        }

        let envelope: Envelope =
            serde_json::from_value(body.clone()).map_err(|e| ApiError::Parse(e.to_string()))?;

        if !envelope.success {
            return Err(ApiError::Api(error_message(&body)));
        }

        Ok(envelope)
    }
}

#[async_trait]
impl EvidenceStore for BackendClient {
    async fn persist(&self, record: &EvidenceRecord) -> Result<Option<String>, ApiError> {
        debug!(case = %record.case_id, kind = record.kind.as_str(), "persisting evidence");

        let resp = self
            .authorize(self.client.post(self.endpoint("evidences")).json(record))
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        let envelope = self.decode(resp).await?;

        let evidence_id = envelope
            .data
            .as_ref()
            .and_then(|d| d.get("_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(evidence_id)
    }

    async fn list_cases(&self) -> Result<Vec<CaseSummary>, ApiError> {
        let resp = self
            .authorize(self.client.get(self.endpoint("cases")))
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        let envelope = self.decode(resp).await?;

        let data = envelope
            .data
            .ok_or_else(|| ApiError::Parse("case listing has no data".to_string()))?;

        serde_json::from_value(data).map_err(|e| ApiError::Parse(e.to_string()))
    }
}
