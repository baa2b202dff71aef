//! File acceptance and validation.
//!
//! The acceptor is the only entry into the pipeline: it checks that a case
//! is selected, resolves the real content type (sniffed from the bytes
//! before trusting the declared type or the file extension), gates on the
//! allowed type set, and enforces the size ceilings. Rejected drops never
//! create a session and never cause network traffic.

use thiserror::Error;

use crate::config::IngestLimits;
use crate::pipeline::session::PipelineKind;

/// A dropped or selected file, as handed to the pipeline.
#[derive(Debug, Clone)]
pub struct FileDrop {
    /// Original file name.
    pub file_name: String,
    /// MIME type declared by the source of the drop, if any.
    pub declared_mime: Option<String>,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

/// A validated file with its resolved type and pipeline branch.
#[derive(Debug)]
pub struct AcceptedFile {
    pub file_name: String,
    pub mime_type: String,
    pub kind: PipelineKind,
    pub bytes: Vec<u8>,
}

/// Rejection reasons produced by the acceptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no case selected")]
    MissingCase,

    #[error("file is empty")]
    EmptyFile,

    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
}

/// Resolve the effective MIME type of a drop.
///
/// Content sniffing wins over the declared type, which wins over the file
/// extension; declared types from browsers and shells are frequently wrong
/// for renamed files.
pub fn resolve_mime(drop: &FileDrop) -> String {
    if let Some(kind) = infer::get(&drop.bytes) {
        return kind.mime_type().to_string();
    }
    if let Some(declared) = &drop.declared_mime {
        if !declared.is_empty() {
            return declared.clone();
        }
    }
    mime_guess::from_path(&drop.file_name)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Validate a drop against the selected case and the configured limits.
///
/// On success the file bytes move into the returned [`AcceptedFile`].
pub fn accept(
    drop: FileDrop,
    case_id: &str,
    limits: &IngestLimits,
) -> Result<AcceptedFile, ValidationError> {
    if case_id.trim().is_empty() {
        return Err(ValidationError::MissingCase);
    }
    if drop.bytes.is_empty() {
        return Err(ValidationError::EmptyFile);
    }

    let mime_type = resolve_mime(&drop);
    let size = drop.bytes.len() as u64;

    let (kind, limit) = if mime_type == "application/pdf" {
        (PipelineKind::Document, limits.max_pdf_bytes)
    } else if mime_type.starts_with("image/") {
        (PipelineKind::Image, limits.max_image_bytes)
    } else {
        return Err(ValidationError::UnsupportedType(mime_type));
    };

    if size > limit {
        return Err(ValidationError::TooLarge { size, limit });
    }

    Ok(AcceptedFile {
        file_name: drop.file_name,
        mime_type,
        kind,
        bytes: drop.bytes,
    })
}
