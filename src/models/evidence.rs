//! Evidence models.
//!
//! An evidence record links a stored file and its AI-derived preliminary
//! analysis to a case. Records are created exactly once by the ingestion
//! pipeline and never mutated by this client afterwards; the backend owns
//! them from that point on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of evidence attached to a case.
///
/// `Declaration` and `Interrogatory` exist in the backend contract but are
/// produced through manual intake flows outside this pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvidenceType {
    Image,
    Document,
    Declaration,
    Interrogatory,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Document => "DOCUMENT",
            Self::Declaration => "DECLARATION",
            Self::Interrogatory => "INTERROGATORY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IMAGE" => Some(Self::Image),
            "DOCUMENT" => Some(Self::Document),
            "DECLARATION" => Some(Self::Declaration),
            "INTERROGATORY" => Some(Self::Interrogatory),
            _ => None,
        }
    }
}

/// File-level metadata recorded alongside an evidence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMetadata {
    /// Original file name as dropped.
    pub file_name: String,
    /// Size in bytes.
    pub file_size: u64,
    /// Resolved MIME type of the content.
    pub mime_type: String,
    /// SHA-256 hash of the file content.
    pub content_hash: String,
    /// Page count, for document evidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    /// Number of detected labels, for image evidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_count: Option<u32>,
}

/// An evidence record in the backend's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    /// Evidence kind.
    #[serde(rename = "type")]
    pub kind: EvidenceType,
    /// Human-readable description.
    pub description: String,
    /// Durable storage URL of the uploaded file.
    pub archive: String,
    /// When the evidence was collected (ingestion time).
    pub collection_date: DateTime<Utc>,
    /// Identifier of the uploader.
    pub uploaded_by: String,
    /// Case this evidence attaches to.
    #[serde(rename = "case")]
    pub case_id: String,
    /// AI-generated narrative analysis.
    pub preliminary_analysis: String,
    /// Optional file metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EvidenceMetadata>,
}

/// Compute the SHA-256 hash of file content.
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
