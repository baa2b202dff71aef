//! `config` command: show the resolved configuration.

use crate::config::Settings;

fn secret(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "(set)"
    } else {
        "(unset)"
    }
}

/// Print the resolved settings with secrets redacted.
pub fn execute(settings: &Settings) {
    println!("backend.base_url       = {}", settings.backend.base_url);
    println!("backend.api_token      = {}", secret(&settings.backend.api_token));
    println!("backend.uploaded_by    = {}", settings.backend.uploaded_by);
    println!("object_store.upload_url    = {}", settings.object_store.upload_url);
    println!("object_store.upload_preset = {}", settings.object_store.upload_preset);
    println!("vision.endpoint        = {}", settings.vision.endpoint);
    println!("vision.api_key         = {}", secret(&settings.vision.api_key));
    println!("vision.max_results     = {}", settings.vision.max_results);
    println!("llm.endpoint           = {}", settings.llm.endpoint);
    println!("llm.api_key            = {}", secret(&settings.llm.api_key));
    println!("llm.model              = {}", settings.llm.model);
    println!("llm.max_tokens         = {}", settings.llm.max_tokens);
    println!("llm.temperature        = {}", settings.llm.temperature);
    println!("llm.max_content_chars  = {}", settings.llm.max_content_chars);
    println!("limits.max_pdf_bytes   = {}", settings.limits.max_pdf_bytes);
    println!("limits.max_image_bytes = {}", settings.limits.max_image_bytes);
    println!("request_timeout_secs   = {}", settings.request_timeout_secs);
}
