//! `cases` command: list cases from the case-management backend.

use console::style;

use crate::config::Settings;
use crate::remote::{BackendClient, EvidenceStore};

/// Fetch and print the case listing.
pub async fn execute(settings: &Settings) -> anyhow::Result<()> {
    let backend = BackendClient::new(settings.backend.clone(), settings.request_timeout());

    let cases = backend
        .list_cases()
        .await
        .map_err(|e| anyhow::anyhow!("failed to list cases: {}", e))?;

    if cases.is_empty() {
        println!("No cases found.");
        return Ok(());
    }

    for case in &cases {
        println!("{}  {}", style(&case.id).cyan(), case.title);
    }
    println!();
    println!("{} case(s)", cases.len());

    Ok(())
}
