//! Text extraction for document evidence.
//!
//! PDFs are parsed in-process and their text is pulled page by page, in page
//! order, with a blank line between pages. A document that cannot be parsed
//! (or that has no text layer at all, e.g. a pure scan) halts the session
//! with a resettable error; there is no OCR fallback in this pipeline.

use thiserror::Error;

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    #[error("document produced no extractable text")]
    NoText,
}

/// Result of extracting a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Page texts joined in page order with blank-line separators.
    pub text: String,
    /// Number of pages in the document.
    pub page_count: u32,
}

/// Join per-page texts with the pipeline's page separator.
///
/// Each page contributes its text (trailing whitespace stripped) followed by
/// a space and a blank line, so "Hello" / "World" becomes
/// `"Hello \n\nWorld \n\n"`.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut out = String::new();
    for page in pages {
        out.push_str(page.as_ref().trim_end());
        out.push_str(" \n\n");
    }
    out
}

/// Extract the text of every page of a PDF, in page order.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<ExtractedDocument, ExtractionError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractionError::Parse(e.to_string()))?;

    let pages = doc.get_pages();
    let page_count = pages.len() as u32;

    let mut page_texts = Vec::with_capacity(pages.len());
    for (&page_no, _) in pages.iter() {
        // Pages without a text layer decode to nothing rather than failing
        // the whole document.
        let text = doc.extract_text(&[page_no]).unwrap_or_default();
        page_texts.push(text);
    }

    let text = join_pages(&page_texts);
    if text.trim().is_empty() {
        return Err(ExtractionError::NoText);
    }

    tracing::debug!(page_count, chars = text.len(), "extracted document text");

    Ok(ExtractedDocument { text, page_count })
}
