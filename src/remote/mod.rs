//! Remote service boundaries.
//!
//! Each external collaborator of the pipeline sits behind a trait so the
//! orchestrator can be driven against recording doubles in tests. The
//! production implementations are thin reqwest clients; every one of them
//! normalizes its service's failure shapes into [`ApiError`] before the
//! error reaches pipeline logic.

mod backend;
mod llm;
mod object_store;
mod vision;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CaseSummary, EvidenceRecord};

pub use backend::BackendClient;
pub use llm::NarrativeClient;
pub use object_store::PresetUploadStore;
pub use vision::VisionApiClient;

/// Errors produced at a remote service boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failed to reach the service at all.
    #[error("connection error: {0}")]
    Connection(String),

    /// The service answered with a non-success status or error envelope.
    #[error("API error: {0}")]
    Api(String),

    /// The response arrived but could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Durable file storage for uploaded evidence.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a file and return its durable URL.
    async fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<String, ApiError>;
}

/// Label detection for image evidence.
#[async_trait]
pub trait LabelDetector: Send + Sync {
    /// Detect content labels in an image. Never returns an empty list; a
    /// response without labels is an error.
    async fn detect_labels(&self, bytes: &[u8]) -> Result<Vec<String>, ApiError>;
}

/// Narrative generation for evidence analysis.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Produce a narrative from extracted document text.
    async fn narrate_document(&self, text: &str) -> Result<String, ApiError>;

    /// Produce a narrative from detected image labels.
    async fn narrate_labels(&self, labels: &[String]) -> Result<String, ApiError>;
}

/// The case-management backend.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Persist an evidence record. Returns the backend's identifier for the
    /// created record when it reports one.
    async fn persist(&self, record: &EvidenceRecord) -> Result<Option<String>, ApiError>;

    /// List the cases evidence may attach to.
    async fn list_cases(&self) -> Result<Vec<CaseSummary>, ApiError>;
}

/// Build the shared HTTP client used by all remote boundaries.
pub(crate) fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
        .expect("Failed to create HTTP client")
}
