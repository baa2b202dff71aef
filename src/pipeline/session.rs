//! Upload session state.
//!
//! One [`UploadSession`] exists per ingestion attempt. It owns the accepted
//! file bytes and every stage output, and carries the one-shot latches that
//! keep side-effecting stages from running twice. Sessions are never shared
//! between pipelines; the single-threaded driver makes plain mutation safe.

use uuid::Uuid;

/// Processing stage of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Validating,
    Extracting,
    Uploading,
    Analyzing,
    Persisting,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Extracting => "extracting",
            Self::Uploading => "uploading",
            Self::Analyzing => "analyzing",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether a new session may be started from this stage.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Done | Self::Failed)
    }

    /// Whether this stage is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which branch of the pipeline a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Image branch: upload and label detection, then narrative.
    Image,
    /// Document branch: local text extraction, then upload, then narrative.
    Document,
}

/// One-shot guard for a side-effecting stage.
///
/// The first `acquire` wins; every later call returns false. The latch is
/// acquired synchronously before the asynchronous call it guards begins,
/// which closes the re-entry window between rapid trigger deliveries.
#[derive(Debug, Default)]
pub struct Latch {
    fired: bool,
}

impl Latch {
    /// Attempt to acquire the latch. Returns true exactly once.
    pub fn acquire(&mut self) -> bool {
        if self.fired {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn is_set(&self) -> bool {
        self.fired
    }
}

/// Single-assignment cell for a stage output.
///
/// The first `set` wins and every later one is rejected, so a stage output
/// observed by downstream stages can never change underneath them.
#[derive(Debug, Default)]
pub struct SetOnce<T> {
    value: Option<T>,
}

impl<T> SetOnce<T> {
    /// Set the value if unset. Returns true if this call stored it.
    pub fn set(&mut self, value: T) -> bool {
        if self.value.is_some() {
            return false;
        }
        self.value = Some(value);
        true
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

/// Ephemeral state for a single ingestion attempt.
pub struct UploadSession {
    /// Session identifier, used to correlate log lines.
    pub id: Uuid,
    /// Case the evidence will attach to. Non-empty by construction.
    pub case_id: String,
    /// Pipeline branch selected by the acceptor.
    pub kind: PipelineKind,
    /// Original file name.
    pub file_name: String,
    /// Resolved MIME type.
    pub mime_type: String,
    /// Raw file content, owned by the session until it completes or resets.
    pub bytes: Vec<u8>,
    /// SHA-256 hash of the file content.
    pub content_hash: String,
    /// Evidence description supplied by the operator, or a generated one.
    pub description: String,
    /// Page count, populated by the extraction stage for documents.
    pub page_count: Option<u32>,
    /// Extracted document text (document branch).
    pub extracted_text: SetOnce<String>,
    /// Detected labels (image branch).
    pub detected_labels: SetOnce<Vec<String>>,
    /// Durable storage URL, set exactly once by the upload stage.
    pub storage_url: SetOnce<String>,
    /// LLM narrative, set exactly once by the analysis stage.
    pub narrative: SetOnce<String>,
    /// Current stage.
    pub stage: Stage,
    /// Backend identifier of the persisted record, if it reported one.
    pub evidence_id: Option<String>,
    /// Failure message, set when the session enters `Failed`.
    pub failure: Option<String>,
    /// Guard for the object store upload.
    pub upload_latch: Latch,
    /// Guard for the label detection call.
    pub labels_latch: Latch,
    /// Guard for the narrative generation call.
    pub narrative_latch: Latch,
    /// Guard for evidence persistence. Never reset within a session, even
    /// after failure: duplicate evidence records must not be created from a
    /// single physical upload.
    pub persist_latch: Latch,
}

impl UploadSession {
    /// Create a session for an accepted file, entering `Validating`.
    pub fn new(
        case_id: String,
        kind: PipelineKind,
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
        description: String,
    ) -> Self {
        let content_hash = crate::models::compute_content_hash(&bytes);
        Self {
            id: Uuid::new_v4(),
            case_id,
            kind,
            file_name,
            mime_type,
            bytes,
            content_hash,
            description,
            page_count: None,
            extracted_text: SetOnce::default(),
            detected_labels: SetOnce::default(),
            storage_url: SetOnce::default(),
            narrative: SetOnce::default(),
            stage: Stage::Validating,
            evidence_id: None,
            failure: None,
            upload_latch: Latch::default(),
            labels_latch: Latch::default(),
            narrative_latch: Latch::default(),
            persist_latch: Latch::default(),
        }
    }

    /// Whether the analysis input for this branch is available.
    pub fn analysis_input_ready(&self) -> bool {
        match self.kind {
            PipelineKind::Document => self.extracted_text.is_set(),
            PipelineKind::Image => self.detected_labels.is_set(),
        }
    }

    /// Mark the session failed at its current stage.
    pub fn fail(&mut self, message: String) {
        tracing::warn!(
            session = %self.id,
            stage = %self.stage,
            error = %message,
            "session failed"
        );
        self.failure = Some(message);
        self.stage = Stage::Failed;
    }
}
