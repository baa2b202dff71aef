//! Configuration management for Custodia.
//!
//! Settings are loaded from an optional TOML file and then overridden by
//! environment variables. The resolved [`Settings`] value is constructed
//! once at startup and passed down to the pipeline and its clients; nothing
//! reads configuration ambiently after that point.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Size ceiling for PDF evidence (50MB).
pub const DEFAULT_MAX_PDF_BYTES: u64 = 50 * 1024 * 1024;

/// Size ceiling for image evidence (10MB).
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Default prompt for the document branch. `{content}` is replaced with the
/// extracted (possibly truncated) document text.
pub const DEFAULT_DOCUMENT_PROMPT: &str = "\
You are a forensic analyst assisting an investigation. Write a preliminary \
analysis of the following document recovered as evidence. Describe its \
apparent purpose, the parties involved, and anything of investigative \
interest. Be factual and concise.\n\nDocument content:\n{content}";

/// Default prompt for the image branch. `{labels}` is replaced with the
/// comma-joined detected labels.
pub const DEFAULT_IMAGE_PROMPT: &str = "\
You are a forensic analyst assisting an investigation. The following labels \
were detected in a photograph recovered as evidence: {labels}. Write a \
preliminary analysis describing what the photograph likely depicts and \
anything of investigative interest. Be factual and concise.";

/// Case-management backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the case-management API.
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    /// Bearer token for authenticated endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Identifier recorded as the evidence uploader.
    #[serde(default = "default_uploaded_by")]
    pub uploaded_by: String,
}

fn default_backend_url() -> String {
    "http://localhost:4000/api".to_string()
}

fn default_uploaded_by() -> String {
    "custodia".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            api_token: None,
            uploaded_by: default_uploaded_by(),
        }
    }
}

/// Object store upload configuration.
///
/// The store accepts unsigned uploads against a named preset, so no API
/// secret is held client-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Full upload endpoint, e.g.
    /// `https://api.cloudinary.com/v1_1/<cloud>/auto/upload`.
    #[serde(default)]
    pub upload_url: String,
    /// Unsigned upload preset name.
    #[serde(default)]
    pub upload_preset: String,
}

/// Vision/label detection API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Annotation endpoint.
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,
    /// API key passed as the `key` query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Maximum results requested per feature.
    #[serde(default = "default_vision_max_results")]
    pub max_results: u32,
}

fn default_vision_endpoint() -> String {
    "https://vision.googleapis.com/v1/images:annotate".to_string()
}

fn default_vision_max_results() -> u32 {
    10
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_vision_endpoint(),
            api_key: None,
            max_results: default_vision_max_results(),
        }
    }
}

/// Configuration for the narrative LLM client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API base, e.g. `https://openrouter.ai/api`. The client appends
    /// `/v1/chat/completions`.
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    /// Bearer token for the chat-completion API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model to use for narrative generation.
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Maximum tokens in response.
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0).
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    /// Maximum characters of document content to send to the LLM.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// Custom prompt for the document branch (uses `{content}` placeholder).
    #[serde(default)]
    pub document_prompt: Option<String>,
    /// Custom prompt for the image branch (uses `{labels}` placeholder).
    #[serde(default)]
    pub image_prompt: Option<String>,
}

fn default_llm_endpoint() -> String {
    "https://openrouter.ai/api".to_string()
}

fn default_llm_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_llm_max_tokens() -> u32 {
    512
}

fn default_llm_temperature() -> f32 {
    0.3
}

fn default_max_content_chars() -> usize {
    12000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            max_content_chars: default_max_content_chars(),
            document_prompt: None,
            image_prompt: None,
        }
    }
}

impl LlmConfig {
    /// Get the document prompt, using custom or default.
    pub fn get_document_prompt(&self) -> &str {
        self.document_prompt
            .as_deref()
            .unwrap_or(DEFAULT_DOCUMENT_PROMPT)
    }

    /// Get the image prompt, using custom or default.
    pub fn get_image_prompt(&self) -> &str {
        self.image_prompt.as_deref().unwrap_or(DEFAULT_IMAGE_PROMPT)
    }
}

/// Size ceilings enforced by the file acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestLimits {
    /// Maximum accepted PDF size in bytes.
    #[serde(default = "default_max_pdf_bytes")]
    pub max_pdf_bytes: u64,
    /// Maximum accepted image size in bytes.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,
}

fn default_max_pdf_bytes() -> u64 {
    DEFAULT_MAX_PDF_BYTES
}

fn default_max_image_bytes() -> u64 {
    DEFAULT_MAX_IMAGE_BYTES
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_pdf_bytes: DEFAULT_MAX_PDF_BYTES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// Resolved application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub limits: IngestLimits,
    /// HTTP request timeout in seconds for all remote calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            object_store: ObjectStoreConfig::default(),
            vision: VisionConfig::default(),
            llm: LlmConfig::default(),
            limits: IngestLimits::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// HTTP request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate that configured endpoints are well-formed URLs.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut endpoints = vec![
            ("backend.base_url", self.backend.base_url.as_str()),
            ("vision.endpoint", self.vision.endpoint.as_str()),
            ("llm.endpoint", self.llm.endpoint.as_str()),
        ];
        // The upload URL may legitimately be unset until an ingest runs
        if !self.object_store.upload_url.is_empty() {
            endpoints.push(("object_store.upload_url", self.object_store.upload_url.as_str()));
        }
        for (name, value) in endpoints {
            url::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("invalid {} \"{}\": {}", name, value, e))?;
        }
        Ok(())
    }

    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        let settings: Settings = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))?;
        Ok(settings)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `CUSTODIA_API_URL`: case-management backend base URL
    /// - `CUSTODIA_API_TOKEN`: backend bearer token
    /// - `CUSTODIA_UPLOADED_BY`: identifier recorded on evidence records
    /// - `CUSTODIA_UPLOAD_URL`: object store upload endpoint
    /// - `CUSTODIA_UPLOAD_PRESET`: object store unsigned preset name
    /// - `VISION_ENDPOINT`: label detection endpoint
    /// - `VISION_API_KEY`: label detection API key
    /// - `LLM_ENDPOINT`: chat-completion API base
    /// - `LLM_API_KEY`: chat-completion bearer token
    ///   (falls back to `OPENROUTER_API_KEY`)
    /// - `LLM_MODEL`: model name
    /// - `LLM_MAX_TOKENS`: maximum tokens in response
    /// - `LLM_TEMPERATURE`: generation temperature (0.0-1.0)
    /// - `LLM_MAX_CONTENT_CHARS`: max document chars to send
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("CUSTODIA_API_URL") {
            self.backend.base_url = val;
        }
        if let Ok(val) = std::env::var("CUSTODIA_API_TOKEN") {
            self.backend.api_token = Some(val);
        }
        if let Ok(val) = std::env::var("CUSTODIA_UPLOADED_BY") {
            self.backend.uploaded_by = val;
        }
        if let Ok(val) = std::env::var("CUSTODIA_UPLOAD_URL") {
            self.object_store.upload_url = val;
        }
        if let Ok(val) = std::env::var("CUSTODIA_UPLOAD_PRESET") {
            self.object_store.upload_preset = val;
        }
        if let Ok(val) = std::env::var("VISION_ENDPOINT") {
            self.vision.endpoint = val;
        }
        if let Ok(val) = std::env::var("VISION_API_KEY") {
            self.vision.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("LLM_ENDPOINT") {
            self.llm.endpoint = val;
        }
        if let Ok(val) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = Some(val);
        } else if self.llm.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(val) = std::env::var("LLM_MODEL") {
            self.llm.model = val;
        }
        if let Ok(val) = std::env::var("LLM_MAX_TOKENS") {
            if let Ok(n) = val.parse() {
                self.llm.max_tokens = n;
            }
        }
        if let Ok(val) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(t) = val.parse() {
                self.llm.temperature = t;
            }
        }
        if let Ok(val) = std::env::var("LLM_MAX_CONTENT_CHARS") {
            if let Ok(n) = val.parse() {
                self.llm.max_content_chars = n;
            }
        }
        self
    }
}

/// Load settings from an explicit path, or from `custodia.toml` in the
/// current directory if present, then apply environment overrides.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match config_path {
        Some(path) => Settings::from_file(path)?,
        None => {
            let default_path = PathBuf::from("custodia.toml");
            if default_path.exists() {
                Settings::from_file(&default_path)?
            } else {
                Settings::default()
            }
        }
    };
    let settings = settings.with_env_overrides();
    settings.validate()?;
    Ok(settings)
}
