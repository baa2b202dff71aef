//! Evidence ingestion pipeline.
//!
//! The pipeline moves one accepted file through upload, analysis, and
//! persistence as an explicit state machine: every stage completion is a
//! [`SessionEvent`] fed to [`IngestPipeline::dispatch`], which applies the
//! transition and returns the side-effecting [`StageAction`]s to start.
//! Stage ordering is enforced by the transition table rather than by
//! observing data presence, and each side-effecting stage is guarded by a
//! one-shot latch acquired synchronously before its call is issued — a
//! duplicate or stale completion is ignored, never re-executed.
//!
//! Failure at any stage is terminal for the session: completed outputs are
//! kept (a successfully uploaded file's storage URL survives a later
//! analysis failure), nothing is rolled back, and nothing retries. The
//! operator starts over with an explicit reset.

mod acceptor;
mod extract;
mod session;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::IngestLimits;
use crate::models::{EvidenceMetadata, EvidenceRecord, EvidenceType};
use crate::remote::{ApiError, EvidenceStore, LabelDetector, NarrativeGenerator, ObjectStore};

pub use acceptor::{accept, resolve_mime, AcceptedFile, FileDrop, ValidationError};
pub use extract::{extract_pdf_text, join_pages, ExtractedDocument, ExtractionError};
pub use session::{Latch, PipelineKind, SetOnce, Stage, UploadSession};

/// Completion of a pipeline stage, fed to [`IngestPipeline::dispatch`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The acceptor validated the drop and the session entered `Validating`.
    Accepted,
    /// Document text extraction finished.
    TextExtracted { text: String, page_count: u32 },
    /// The object store returned a durable URL.
    UploadFinished { url: String },
    /// The vision service returned labels.
    LabelsDetected(Vec<String>),
    /// The LLM returned the analysis narrative.
    NarrativeReady(String),
    /// The backend accepted the evidence record.
    Persisted { evidence_id: Option<String> },
}

/// A side-effecting stage the dispatcher has decided to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAction {
    /// Extract document text locally (document branch).
    ExtractText,
    /// Upload the file to the object store.
    BeginUpload,
    /// Request label detection (image branch).
    DetectLabels,
    /// Request the narrative from the LLM.
    GenerateNarrative,
    /// Persist the assembled evidence record.
    PersistEvidence,
}

/// Progress events emitted for display while a session runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The session entered a new stage.
    StageChanged { stage: Stage },
    /// Coarse upload progress (jumps 0, 20, 100).
    UploadProgress { percent: u8 },
    /// Labels came back from the vision service.
    LabelsDetected { count: usize },
    /// The session completed and the evidence record was persisted.
    Completed { evidence_id: Option<String> },
    /// The session failed at a stage.
    Failed { stage: Stage, error: String },
}

/// Errors terminating an ingestion session.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("{stage} stage failed: {source}")]
    Transport { stage: Stage, source: ApiError },

    #[error("evidence persistence failed: {0}")]
    Persistence(ApiError),

    #[error("a session is already in progress; reset it before starting another")]
    SessionBusy,

    #[error("pipeline stalled in {0} stage")]
    Stalled(Stage),
}

/// Result of a completed ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Backend identifier of the created evidence record, if reported.
    pub evidence_id: Option<String>,
    /// Case the evidence was attached to.
    pub case_id: String,
    /// Durable storage URL of the uploaded file.
    pub storage_url: String,
    /// AI-generated narrative.
    pub narrative: String,
    /// Evidence kind that was filed.
    pub kind: EvidenceType,
    /// Original file name.
    pub file_name: String,
}

/// Orchestrator for one evidence ingestion at a time.
///
/// Owns at most one [`UploadSession`]; the four remote boundaries are trait
/// objects so tests can substitute recording doubles.
pub struct IngestPipeline {
    store: Arc<dyn ObjectStore>,
    labels: Arc<dyn LabelDetector>,
    narrator: Arc<dyn NarrativeGenerator>,
    evidence: Arc<dyn EvidenceStore>,
    limits: IngestLimits,
    uploaded_by: String,
    events: Option<mpsc::Sender<PipelineEvent>>,
    session: Option<UploadSession>,
}

impl IngestPipeline {
    /// Create a pipeline over the given remote boundaries.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        labels: Arc<dyn LabelDetector>,
        narrator: Arc<dyn NarrativeGenerator>,
        evidence: Arc<dyn EvidenceStore>,
        limits: IngestLimits,
        uploaded_by: String,
    ) -> Self {
        Self {
            store,
            labels,
            narrator,
            evidence,
            limits,
            uploaded_by,
            events: None,
            session: None,
        }
    }

    /// Attach a progress event channel.
    pub fn with_events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Current stage; `Idle` when no session exists.
    pub fn stage(&self) -> Stage {
        self.session.as_ref().map(|s| s.stage).unwrap_or(Stage::Idle)
    }

    /// The current session, if one exists.
    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    /// Discard the session and return to `Idle`.
    ///
    /// Only legal when no session exists or the session is terminal; a
    /// running session cannot be reset out from under its in-flight stages.
    /// All partial state is discarded. Returns false if the reset was
    /// refused.
    pub fn reset(&mut self) -> bool {
        match &self.session {
            None => true,
            Some(s) if s.stage.can_start() => {
                tracing::debug!(session = %s.id, "session reset");
                self.session = None;
                true
            }
            Some(_) => false,
        }
    }

    /// Validate a drop and open a session for it.
    ///
    /// Returns the first actions to execute. Validation failures leave the
    /// pipeline in `Idle` with no session and no network traffic issued.
    pub fn begin(
        &mut self,
        drop: FileDrop,
        case_id: &str,
        description: Option<&str>,
    ) -> Result<Vec<StageAction>, PipelineError> {
        if self.session.is_some() {
            return Err(PipelineError::SessionBusy);
        }

        let accepted = accept(drop, case_id, &self.limits)?;
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Ingested file {}", accepted.file_name));

        let session = UploadSession::new(
            case_id.to_string(),
            accepted.kind,
            accepted.file_name,
            accepted.mime_type,
            accepted.bytes,
            description,
        );
        tracing::info!(
            session = %session.id,
            case = %session.case_id,
            file = %session.file_name,
            mime = %session.mime_type,
            "session opened"
        );
        self.session = Some(session);
        self.emit(PipelineEvent::StageChanged {
            stage: Stage::Validating,
        });

        Ok(self.dispatch(SessionEvent::Accepted))
    }

    /// Run a full ingestion to completion.
    pub async fn ingest(
        &mut self,
        drop: FileDrop,
        case_id: &str,
        description: Option<&str>,
    ) -> Result<IngestOutcome, PipelineError> {
        let mut pending = self.begin(drop, case_id, description)?;

        while !pending.is_empty() {
            let round = self.execute_round(&pending).await;
            pending = Vec::new();

            let mut first_err: Option<PipelineError> = None;
            for result in round {
                match result {
                    // Successful completions are applied even when a sibling
                    // stage failed, so outputs like the storage URL are
                    // retained by the failed session.
                    Ok(event) => pending.extend(self.dispatch(event)),
                    Err(e) => {
                        if first_err.is_none() {
                            first_err = Some(e);
                        }
                    }
                }
            }

            if let Some(err) = first_err {
                self.fail(&err);
                return Err(err);
            }
        }

        match self.outcome() {
            Some(outcome) => Ok(outcome),
            None => {
                let err = PipelineError::Stalled(self.stage());
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Apply a stage completion to the session and decide what starts next.
    ///
    /// Duplicate and stale events (completions the session has already
    /// observed, or completions arriving after a reset) are dropped here;
    /// the one-shot latches make re-execution impossible even if the same
    /// trigger is delivered repeatedly.
    pub fn dispatch(&mut self, event: SessionEvent) -> Vec<StageAction> {
        let mut emits = Vec::new();
        let actions = match self.session.as_mut() {
            Some(session) => Self::transition(session, event, &mut emits),
            None => {
                tracing::debug!(?event, "event for absent session ignored");
                Vec::new()
            }
        };
        for ev in emits {
            self.emit(ev);
        }
        actions
    }

    /// The transition table. Mutates only the session; progress events are
    /// collected for the caller to emit.
    fn transition(
        session: &mut UploadSession,
        event: SessionEvent,
        emits: &mut Vec<PipelineEvent>,
    ) -> Vec<StageAction> {
        match event {
            SessionEvent::Accepted => {
                if session.stage != Stage::Validating {
                    return Self::stale(session, "Accepted");
                }
                match session.kind {
                    PipelineKind::Document => {
                        session.stage = Stage::Extracting;
                        emits.push(PipelineEvent::StageChanged {
                            stage: Stage::Extracting,
                        });
                        vec![StageAction::ExtractText]
                    }
                    PipelineKind::Image => {
                        session.stage = Stage::Uploading;
                        emits.push(PipelineEvent::StageChanged {
                            stage: Stage::Uploading,
                        });
                        let mut actions = Vec::new();
                        if session.upload_latch.acquire() {
                            actions.push(StageAction::BeginUpload);
                        }
                        if session.labels_latch.acquire() {
                            actions.push(StageAction::DetectLabels);
                        }
                        actions
                    }
                }
            }

            SessionEvent::TextExtracted { text, page_count } => {
                if session.stage != Stage::Extracting || !session.extracted_text.set(text) {
                    return Self::stale(session, "TextExtracted");
                }
                session.page_count = Some(page_count);
                session.stage = Stage::Uploading;
                emits.push(PipelineEvent::StageChanged {
                    stage: Stage::Uploading,
                });
                let mut actions = Vec::new();
                if session.upload_latch.acquire() {
                    actions.push(StageAction::BeginUpload);
                }
                actions
            }

            SessionEvent::UploadFinished { url } => {
                if session.stage != Stage::Uploading || !session.storage_url.set(url) {
                    return Self::stale(session, "UploadFinished");
                }
                session.stage = Stage::Analyzing;
                emits.push(PipelineEvent::UploadProgress { percent: 100 });
                emits.push(PipelineEvent::StageChanged {
                    stage: Stage::Analyzing,
                });
                Self::maybe_start_narrative(session)
            }

            SessionEvent::LabelsDetected(labels) => {
                let in_window = matches!(session.stage, Stage::Uploading | Stage::Analyzing);
                if !in_window || !session.detected_labels.set(labels) {
                    return Self::stale(session, "LabelsDetected");
                }
                let count = session.detected_labels.get().map(|l| l.len()).unwrap_or(0);
                emits.push(PipelineEvent::LabelsDetected { count });
                Self::maybe_start_narrative(session)
            }

            SessionEvent::NarrativeReady(narrative) => {
                if session.stage != Stage::Analyzing || !session.narrative.set(narrative) {
                    return Self::stale(session, "NarrativeReady");
                }
                session.stage = Stage::Persisting;
                emits.push(PipelineEvent::StageChanged {
                    stage: Stage::Persisting,
                });
                let mut actions = Vec::new();
                // The latch is taken before the persistence call is issued;
                // a second narrative completion can never enqueue a second
                // write.
                if session.persist_latch.acquire() {
                    actions.push(StageAction::PersistEvidence);
                }
                actions
            }

            SessionEvent::Persisted { evidence_id } => {
                if session.stage != Stage::Persisting {
                    return Self::stale(session, "Persisted");
                }
                session.evidence_id = evidence_id.clone();
                session.stage = Stage::Done;
                tracing::info!(session = %session.id, "evidence persisted");
                emits.push(PipelineEvent::StageChanged { stage: Stage::Done });
                emits.push(PipelineEvent::Completed { evidence_id });
                Vec::new()
            }
        }
    }

    /// Execute one round of actions; independent actions overlap.
    pub async fn execute_round(
        &self,
        actions: &[StageAction],
    ) -> Vec<Result<SessionEvent, PipelineError>> {
        let futures = actions.iter().map(|action| self.execute(*action));
        futures::future::join_all(futures).await
    }

    /// The ingestion outcome, available once the session is `Done`.
    pub fn outcome(&self) -> Option<IngestOutcome> {
        let session = self.session.as_ref()?;
        if session.stage != Stage::Done {
            return None;
        }
        Some(IngestOutcome {
            evidence_id: session.evidence_id.clone(),
            case_id: session.case_id.clone(),
            storage_url: session.storage_url.get()?.clone(),
            narrative: session.narrative.get()?.clone(),
            kind: Self::evidence_type(session.kind),
            file_name: session.file_name.clone(),
        })
    }

    async fn execute(&self, action: StageAction) -> Result<SessionEvent, PipelineError> {
        let Some(session) = self.session.as_ref() else {
            return Err(PipelineError::Stalled(Stage::Idle));
        };

        match action {
            StageAction::ExtractText => {
                let extracted = extract_pdf_text(&session.bytes)?;
                Ok(SessionEvent::TextExtracted {
                    text: extracted.text,
                    page_count: extracted.page_count,
                })
            }

            StageAction::BeginUpload => {
                self.emit(PipelineEvent::UploadProgress { percent: 0 });
                self.emit(PipelineEvent::UploadProgress { percent: 20 });
                let url = self
                    .store
                    .upload(&session.file_name, &session.mime_type, &session.bytes)
                    .await
                    .map_err(|source| PipelineError::Transport {
                        stage: Stage::Uploading,
                        source,
                    })?;
                Ok(SessionEvent::UploadFinished { url })
            }

            StageAction::DetectLabels => {
                let labels = self
                    .labels
                    .detect_labels(&session.bytes)
                    .await
                    .map_err(|source| PipelineError::Transport {
                        stage: Stage::Analyzing,
                        source,
                    })?;
                Ok(SessionEvent::LabelsDetected(labels))
            }

            StageAction::GenerateNarrative => {
                let result = match session.kind {
                    PipelineKind::Document => {
                        let text = session
                            .extracted_text
                            .get()
                            .ok_or(PipelineError::Stalled(session.stage))?;
                        self.narrator.narrate_document(text).await
                    }
                    PipelineKind::Image => {
                        let labels = session
                            .detected_labels
                            .get()
                            .ok_or(PipelineError::Stalled(session.stage))?;
                        self.narrator.narrate_labels(labels).await
                    }
                };
                let narrative = result.map_err(|source| PipelineError::Transport {
                    stage: Stage::Analyzing,
                    source,
                })?;
                Ok(SessionEvent::NarrativeReady(narrative))
            }

            StageAction::PersistEvidence => {
                let record = self.build_record(session)?;
                let evidence_id = self
                    .evidence
                    .persist(&record)
                    .await
                    .map_err(PipelineError::Persistence)?;
                Ok(SessionEvent::Persisted { evidence_id })
            }
        }
    }

    /// Start the narrative stage if its inputs are complete.
    ///
    /// Requires the storage URL (the session is in `Analyzing`) and the
    /// branch's analysis input. The narrative latch makes this a one-shot
    /// decision no matter how many completions re-check it.
    fn maybe_start_narrative(session: &mut UploadSession) -> Vec<StageAction> {
        if session.stage == Stage::Analyzing
            && session.storage_url.is_set()
            && session.analysis_input_ready()
            && session.narrative_latch.acquire()
        {
            vec![StageAction::GenerateNarrative]
        } else {
            Vec::new()
        }
    }

    fn build_record(&self, session: &UploadSession) -> Result<EvidenceRecord, PipelineError> {
        let archive = session
            .storage_url
            .get()
            .ok_or(PipelineError::Stalled(session.stage))?
            .clone();
        let narrative = session
            .narrative
            .get()
            .ok_or(PipelineError::Stalled(session.stage))?
            .clone();

        Ok(EvidenceRecord {
            kind: Self::evidence_type(session.kind),
            description: session.description.clone(),
            archive,
            collection_date: Utc::now(),
            uploaded_by: self.uploaded_by.clone(),
            case_id: session.case_id.clone(),
            preliminary_analysis: narrative,
            metadata: Some(EvidenceMetadata {
                file_name: session.file_name.clone(),
                file_size: session.bytes.len() as u64,
                mime_type: session.mime_type.clone(),
                content_hash: session.content_hash.clone(),
                page_count: session.page_count,
                label_count: session.detected_labels.get().map(|l| l.len() as u32),
            }),
        })
    }

    fn evidence_type(kind: PipelineKind) -> EvidenceType {
        match kind {
            PipelineKind::Image => EvidenceType::Image,
            PipelineKind::Document => EvidenceType::Document,
        }
    }

    fn fail(&mut self, err: &PipelineError) {
        if let Some(session) = self.session.as_mut() {
            let at = session.stage;
            session.fail(err.to_string());
            self.emit(PipelineEvent::Failed {
                stage: at,
                error: err.to_string(),
            });
        }
    }

    fn stale(session: &UploadSession, event: &str) -> Vec<StageAction> {
        tracing::debug!(
            session = %session.id,
            stage = %session.stage,
            event,
            "stale event ignored"
        );
        Vec::new()
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }
}
