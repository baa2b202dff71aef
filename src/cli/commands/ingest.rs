//! `ingest` command: run the full evidence pipeline on a local file.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::ProgressBar;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::pipeline::{FileDrop, IngestPipeline, PipelineEvent};
use crate::remote::{BackendClient, NarrativeClient, PresetUploadStore, VisionApiClient};

/// Run the ingestion pipeline for one file.
pub async fn execute(
    settings: &Settings,
    file: &Path,
    case_id: &str,
    description: Option<&str>,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", file.display(), e))?;

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "evidence".to_string());

    let file_drop = FileDrop {
        file_name,
        declared_mime: None,
        bytes,
    };

    let timeout = settings.request_timeout();
    let store = Arc::new(PresetUploadStore::new(settings.object_store.clone(), timeout));
    let labels = Arc::new(VisionApiClient::new(settings.vision.clone(), timeout));
    let narrator = Arc::new(NarrativeClient::new(settings.llm.clone(), timeout));
    let backend = Arc::new(BackendClient::new(settings.backend.clone(), timeout));

    let (event_tx, event_rx) = mpsc::channel(64);
    let mut pipeline = IngestPipeline::new(
        store,
        labels,
        narrator,
        backend,
        settings.limits,
        settings.backend.uploaded_by.clone(),
    )
    .with_events(event_tx);

    let display = tokio::spawn(render_progress(event_rx));

    let result = pipeline.ingest(file_drop, case_id, description).await;

    // Closing the channel ends the display task
    drop(pipeline);
    let _ = display.await;

    match result {
        Ok(outcome) => {
            println!(
                "{} {} evidence filed to case {}",
                style("ok").green().bold(),
                outcome.kind.as_str(),
                style(&outcome.case_id).cyan()
            );
            if let Some(id) = &outcome.evidence_id {
                println!("   record:  {}", id);
            }
            println!("   archive: {}", outcome.storage_url);
            println!();
            println!("{}", outcome.narrative);
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("ingestion failed: {}", e)),
    }
}

/// Render pipeline progress events with a spinner.
async fn render_progress(mut rx: mpsc::Receiver<PipelineEvent>) {
    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(120));

    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::StageChanged { stage } => {
                spinner.set_message(format!("{}...", stage));
            }
            PipelineEvent::UploadProgress { percent } => {
                spinner.set_message(format!("uploading... {}%", percent));
            }
            PipelineEvent::LabelsDetected { count } => {
                spinner.set_message(format!("analyzing... {} labels detected", count));
            }
            PipelineEvent::Completed { .. } => {
                spinner.set_message("done");
            }
            PipelineEvent::Failed { stage, error } => {
                spinner.set_message(format!("failed during {}: {}", stage, error));
            }
        }
    }

    spinner.finish_and_clear();
}
