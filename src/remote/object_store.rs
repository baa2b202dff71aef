//! Object store upload client.
//!
//! Uploads evidence files through an unsigned, preset-based multipart POST
//! (the Cloudinary upload contract). The store answers with the durable
//! `secure_url` the evidence record will reference as its archive.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::{build_http_client, ApiError, ObjectStore};
use crate::config::ObjectStoreConfig;

/// Preset-based object store client.
pub struct PresetUploadStore {
    client: reqwest::Client,
    config: ObjectStoreConfig,
}

/// Upload response; only the durable URL matters to the pipeline.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl PresetUploadStore {
    /// Create a new upload client.
    pub fn new(config: ObjectStoreConfig, timeout: std::time::Duration) -> Self {
        Self {
            client: build_http_client(timeout),
            config,
        }
    }
}

#[async_trait]
impl ObjectStore for PresetUploadStore {
    async fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<String, ApiError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| ApiError::Parse(format!("invalid MIME type {}: {}", mime_type, e)))?;

        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.config.upload_preset.clone());

        debug!(file = file_name, size = bytes.len(), "uploading to object store");

        let resp = self
            .client
            .post(&self.config.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Api(format!("HTTP {}: {}", status, body)));
        }

        let upload: UploadResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        Ok(upload.secure_url)
    }
}
