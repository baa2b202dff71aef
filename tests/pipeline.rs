//! End-to-end pipeline tests against recording doubles for the four remote
//! boundaries. These cover the ingestion properties that matter most: no
//! network traffic before validation passes, at-most-once semantics for
//! every side-effecting stage, strict stage ordering, and failure isolation
//! without rollback.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use custodia::config::IngestLimits;
use custodia::models::{CaseSummary, EvidenceRecord, EvidenceType};
use custodia::pipeline::{
    FileDrop, IngestPipeline, PipelineError, SessionEvent, Stage, StageAction, ValidationError,
};
use custodia::remote::{ApiError, EvidenceStore, LabelDetector, NarrativeGenerator, ObjectStore};

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

// ---------------------------------------------------------------------------
// Recording doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockStore {
    calls: AtomicUsize,
    fail: AtomicBool,
    url: String,
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn upload(&self, _: &str, _: &str, _: &[u8]) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Api("HTTP 502: upload failed".to_string()));
        }
        Ok(self.url.clone())
    }
}

#[derive(Default)]
struct MockVision {
    calls: AtomicUsize,
    fail: AtomicBool,
    labels: Vec<String>,
}

#[async_trait]
impl LabelDetector for MockVision {
    async fn detect_labels(&self, _: &[u8]) -> Result<Vec<String>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Api("HTTP 500: internal error".to_string()));
        }
        Ok(self.labels.clone())
    }
}

#[derive(Default)]
struct MockNarrator {
    calls: AtomicUsize,
    fail: AtomicBool,
    last_document: Mutex<Option<String>>,
    last_labels: Mutex<Option<Vec<String>>>,
}

#[async_trait]
impl NarrativeGenerator for MockNarrator {
    async fn narrate_document(&self, text: &str) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_document.lock().unwrap() = Some(text.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Api("HTTP 503: model unavailable".to_string()));
        }
        Ok("Preliminary analysis narrative.".to_string())
    }

    async fn narrate_labels(&self, labels: &[String]) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_labels.lock().unwrap() = Some(labels.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Api("HTTP 503: model unavailable".to_string()));
        }
        Ok("Preliminary analysis narrative.".to_string())
    }
}

#[derive(Default)]
struct MockBackend {
    persist_calls: AtomicUsize,
    fail: AtomicBool,
    last_record: Mutex<Option<EvidenceRecord>>,
}

#[async_trait]
impl EvidenceStore for MockBackend {
    async fn persist(&self, record: &EvidenceRecord) -> Result<Option<String>, ApiError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_record.lock().unwrap() = Some(record.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Api("evidence rejected".to_string()));
        }
        Ok(Some("ev-1".to_string()))
    }

    async fn list_cases(&self) -> Result<Vec<CaseSummary>, ApiError> {
        Ok(vec![CaseSummary {
            id: "c1".to_string(),
            title: "Warehouse break-in".to_string(),
        }])
    }
}

struct Harness {
    store: Arc<MockStore>,
    vision: Arc<MockVision>,
    narrator: Arc<MockNarrator>,
    backend: Arc<MockBackend>,
    pipeline: IngestPipeline,
}

fn harness(upload_url: &str, labels: Vec<&str>) -> Harness {
    let store = Arc::new(MockStore {
        url: upload_url.to_string(),
        ..MockStore::default()
    });
    let vision = Arc::new(MockVision {
        labels: labels.into_iter().map(str::to_string).collect(),
        ..MockVision::default()
    });
    let narrator = Arc::new(MockNarrator::default());
    let backend = Arc::new(MockBackend::default());

    let pipeline = IngestPipeline::new(
        store.clone(),
        vision.clone(),
        narrator.clone(),
        backend.clone(),
        IngestLimits::default(),
        "analyst-7".to_string(),
    );

    Harness {
        store,
        vision,
        narrator,
        backend,
        pipeline,
    }
}

/// Build a small PDF with one text page per entry in `pages`.
fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn pdf_drop(name: &str, pages: &[&str]) -> FileDrop {
    FileDrop {
        file_name: name.to_string(),
        declared_mime: Some("application/pdf".to_string()),
        bytes: build_pdf(pages),
    }
}

fn image_drop(name: &str) -> FileDrop {
    FileDrop {
        file_name: name.to_string(),
        declared_mime: Some("image/jpeg".to_string()),
        bytes: PNG_MAGIC.to_vec(),
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

// Dropping a file with no case selected never issues any
// network request.
#[tokio::test]
async fn no_case_means_no_network_calls() {
    let mut h = harness("https://cdn/x.jpg", vec!["cat"]);

    let err = h
        .pipeline
        .ingest(image_drop("photo.jpg"), "", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::MissingCase)
    ));
    assert_eq!(h.pipeline.stage(), Stage::Idle);
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.vision.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.narrator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.backend.persist_calls.load(Ordering::SeqCst), 0);
}

// A text file is rejected before any extraction or upload is attempted.
#[tokio::test]
async fn text_file_rejected_before_extraction() {
    let mut h = harness("https://cdn/x.pdf", vec![]);

    let drop = FileDrop {
        file_name: "notes.txt".to_string(),
        declared_mime: Some("text/plain".to_string()),
        bytes: b"just some notes".to_vec(),
    };
    let err = h.pipeline.ingest(drop, "c1", None).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::UnsupportedType(_))
    ));
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.backend.persist_calls.load(Ordering::SeqCst), 0);
}

// Re-delivering the extraction completion produces exactly one upload.
#[tokio::test]
async fn duplicate_extraction_triggers_one_upload() {
    let mut h = harness("https://cdn/x.pdf", vec![]);

    let actions = h
        .pipeline
        .begin(pdf_drop("case.pdf", &["Hello", "World"]), "c1", None)
        .unwrap();
    assert_eq!(actions, vec![StageAction::ExtractText]);

    let first = h.pipeline.dispatch(SessionEvent::TextExtracted {
        text: "Hello \n\nWorld \n\n".to_string(),
        page_count: 2,
    });
    assert_eq!(first, vec![StageAction::BeginUpload]);

    // The triggering state is set again, as a re-entered reactive effect
    // would do; the latch must hold.
    let second = h.pipeline.dispatch(SessionEvent::TextExtracted {
        text: "Hello \n\nWorld \n\n".to_string(),
        page_count: 2,
    });
    assert!(second.is_empty());

    let results = h.pipeline.execute_round(&first).await;
    assert_eq!(results.len(), 1);
    assert!(results.into_iter().all(|r| r.is_ok()));
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 1);
}

// Two near-simultaneous narrative completions persist exactly once.
#[tokio::test]
async fn duplicate_narrative_persists_once() {
    let mut h = harness("https://cdn/x.pdf", vec![]);

    h.pipeline
        .begin(pdf_drop("case.pdf", &["Hello"]), "c1", None)
        .unwrap();
    h.pipeline.dispatch(SessionEvent::TextExtracted {
        text: "Hello \n\n".to_string(),
        page_count: 1,
    });
    h.pipeline.dispatch(SessionEvent::UploadFinished {
        url: "https://cdn/x.pdf".to_string(),
    });

    let first = h
        .pipeline
        .dispatch(SessionEvent::NarrativeReady("Analysis.".to_string()));
    assert_eq!(first, vec![StageAction::PersistEvidence]);

    let second = h
        .pipeline
        .dispatch(SessionEvent::NarrativeReady("Analysis again.".to_string()));
    assert!(second.is_empty());

    let results = h.pipeline.execute_round(&first).await;
    assert!(results.into_iter().all(|r| r.is_ok()));
    assert_eq!(h.backend.persist_calls.load(Ordering::SeqCst), 1);
}

// The narrative stage never starts before its analysis input exists.
#[tokio::test]
async fn narrative_waits_for_labels() {
    let mut h = harness("https://cdn/p.jpg", vec!["cat", "outdoor"]);

    h.pipeline.begin(image_drop("photo.jpg"), "c2", None).unwrap();

    // Upload completes first; labels are still in flight
    let actions = h.pipeline.dispatch(SessionEvent::UploadFinished {
        url: "https://cdn/p.jpg".to_string(),
    });
    assert!(actions.is_empty());
    assert_eq!(h.narrator.calls.load(Ordering::SeqCst), 0);

    // Labels arriving unlocks exactly one narrative request
    let actions = h.pipeline.dispatch(SessionEvent::LabelsDetected(vec![
        "cat".to_string(),
        "outdoor".to_string(),
    ]));
    assert_eq!(actions, vec![StageAction::GenerateNarrative]);

    let results = h.pipeline.execute_round(&actions).await;
    assert!(results.into_iter().all(|r| r.is_ok()));
    assert_eq!(h.narrator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.narrator.last_labels.lock().unwrap().as_deref(),
        Some(&["cat".to_string(), "outdoor".to_string()][..])
    );
}

// An analysis failure after a successful upload keeps the storage URL
// in the failed session but never persists evidence without a narrative.
#[tokio::test]
async fn narrative_failure_keeps_storage_url() {
    let h = harness("https://cdn/x.pdf", vec![]);
    h.narrator.fail.store(true, Ordering::SeqCst);
    let mut pipeline = h.pipeline;

    let err = pipeline
        .ingest(pdf_drop("case.pdf", &["Hello", "World"]), "c1", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Transport {
            stage: Stage::Analyzing,
            ..
        }
    ));
    assert_eq!(pipeline.stage(), Stage::Failed);
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 1);

    let session = pipeline.session().unwrap();
    assert_eq!(
        session.storage_url.get().map(String::as_str),
        Some("https://cdn/x.pdf")
    );
    assert_eq!(h.backend.persist_calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Full runs
// ---------------------------------------------------------------------------

// A two-page PDF flows through extraction, upload, narrative, and
// persistence with the expected record.
#[tokio::test]
async fn scenario_document_ingestion() {
    let mut h = harness("https://cdn/x.pdf", vec![]);

    let outcome = h
        .pipeline
        .ingest(pdf_drop("case.pdf", &["Hello", "World"]), "c1", None)
        .await
        .unwrap();

    assert_eq!(h.pipeline.stage(), Stage::Done);
    assert_eq!(outcome.kind, EvidenceType::Document);
    assert_eq!(outcome.storage_url, "https://cdn/x.pdf");
    assert_eq!(outcome.evidence_id.as_deref(), Some("ev-1"));

    // Page texts joined in page order with blank-line separators
    let session = h.pipeline.session().unwrap();
    assert_eq!(
        session.extracted_text.get().map(String::as_str),
        Some("Hello \n\nWorld \n\n")
    );
    assert_eq!(session.page_count, Some(2));

    // The narrative request carried the extracted text
    let sent = h.narrator.last_document.lock().unwrap().clone().unwrap();
    assert!(sent.contains("Hello \n\nWorld"));

    // The persisted record references case, archive, and analysis
    let record = h.backend.last_record.lock().unwrap().clone().unwrap();
    assert_eq!(record.kind, EvidenceType::Document);
    assert_eq!(record.archive, "https://cdn/x.pdf");
    assert_eq!(record.case_id, "c1");
    assert_eq!(record.uploaded_by, "analyst-7");
    assert_eq!(record.preliminary_analysis, "Preliminary analysis narrative.");
    let metadata = record.metadata.unwrap();
    assert_eq!(metadata.file_name, "case.pdf");
    assert_eq!(metadata.mime_type, "application/pdf");
    assert_eq!(metadata.page_count, Some(2));
}

// Image ingestion detects labels, narrates from them, and files
// IMAGE evidence.
#[tokio::test]
async fn scenario_image_ingestion() {
    let mut h = harness("https://cdn/photo.jpg", vec!["cat", "outdoor"]);

    let outcome = h
        .pipeline
        .ingest(image_drop("photo.jpg"), "c2", None)
        .await
        .unwrap();

    assert_eq!(outcome.kind, EvidenceType::Image);
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.vision.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.narrator.calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        h.narrator.last_labels.lock().unwrap().as_deref(),
        Some(&["cat".to_string(), "outdoor".to_string()][..])
    );

    let record = h.backend.last_record.lock().unwrap().clone().unwrap();
    assert_eq!(record.kind, EvidenceType::Image);
    assert_eq!(record.case_id, "c2");
    assert_eq!(record.metadata.unwrap().label_count, Some(2));
}

// A vision failure fails the session before any narrative or
// persistence work happens.
#[tokio::test]
async fn scenario_vision_failure_halts_pipeline() {
    let h = harness("https://cdn/photo.jpg", vec![]);
    h.vision.fail.store(true, Ordering::SeqCst);
    let mut pipeline = h.pipeline;

    let err = pipeline
        .ingest(image_drop("photo.jpg"), "c2", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Transport {
            stage: Stage::Analyzing,
            ..
        }
    ));
    assert_eq!(pipeline.stage(), Stage::Failed);
    assert_eq!(h.narrator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.backend.persist_calls.load(Ordering::SeqCst), 0);
}

// A failed session refuses further work until explicitly reset; after the
// reset a fresh session runs to completion.
#[tokio::test]
async fn explicit_reset_recovers_after_failure() {
    let h = harness("https://cdn/photo.jpg", vec!["cat"]);
    h.vision.fail.store(true, Ordering::SeqCst);
    let mut pipeline = h.pipeline;

    pipeline
        .ingest(image_drop("photo.jpg"), "c2", None)
        .await
        .unwrap_err();
    assert_eq!(pipeline.stage(), Stage::Failed);

    // Starting over without a reset is refused
    let err = pipeline
        .ingest(image_drop("photo.jpg"), "c2", None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::SessionBusy));

    assert!(pipeline.reset());
    h.vision.fail.store(false, Ordering::SeqCst);

    let outcome = pipeline
        .ingest(image_drop("photo.jpg"), "c2", None)
        .await
        .unwrap();
    assert_eq!(outcome.kind, EvidenceType::Image);
    assert_eq!(h.backend.persist_calls.load(Ordering::SeqCst), 1);
}

// A backend rejection is terminal: the persist latch stays set and the
// session cannot write a duplicate record within the same session.
#[tokio::test]
async fn persistence_failure_is_terminal() {
    let h = harness("https://cdn/x.pdf", vec![]);
    h.backend.fail.store(true, Ordering::SeqCst);
    let mut pipeline = h.pipeline;

    let err = pipeline
        .ingest(pdf_drop("case.pdf", &["Hello"]), "c1", None)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Persistence(_)));
    assert_eq!(pipeline.stage(), Stage::Failed);
    assert_eq!(h.backend.persist_calls.load(Ordering::SeqCst), 1);

    // Re-delivering the narrative completion cannot re-run persistence
    let actions = pipeline.dispatch(SessionEvent::NarrativeReady("again".to_string()));
    assert!(actions.is_empty());
    assert_eq!(h.backend.persist_calls.load(Ordering::SeqCst), 1);
}
