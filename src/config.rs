//! Pipeline configuration.
//!
//! Layered: built-in defaults, then an optional JSON file, then `OCR_*`
//! environment variables (after `.env` is loaded), then CLI flags applied by
//! `main`. The resolved value is passed explicitly into the driver and server.

use crate::ocr::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const MARKDOWN_PROMPT: &str = "Extract all visible text and meaningful labels from the image into clean Markdown. \
Preserve structure by grouping textual information into logical sections (e.g., project details, notes, labels). \
If the image contains diagrams, arrows, airflow lines, equipment, or seating layouts, describe them concisely \
in Markdown as bullet points or short paragraphs. \
Maintain clear separation between textual metadata and diagram descriptions. \
If location is relevant (e.g., 'top-right corner', 'inside dome'), include it briefly. \
Do not include any preambles, explanations, code fences, or adornments. \
Only return direct Markdown content.";

const GRAPH_PROMPT: &str = r#"Extract all visible text and meaningful labels from the image as plain, structured prose suitable for ingestion into a knowledge graph or RAG system.
Convert textual content into coherent, semantically rich sentences grouped by logical themes (e.g., project details, annotations, equipment list, spatial layout).
Preserve contextual relationships by explicitly stating connections between entities (e.g., "The air handler unit (AHU-3) is located in the mechanical room and supplies conditioned air to Zone B via ductwork labeled DB-04").
Describe diagrams, arrows, airflow paths, equipment placements, seating arrangements, or architectural features as factual, spatially aware statements.
Include positional context only when it contributes to semantic meaning.
Avoid markdown formatting, bullet points, or section headers; instead, use natural transitions to separate ideas.
Output fluent, concise, and graph-friendly narrative text optimized for entity extraction, relationship mapping, and retrieval-augmented generation."#;

/// Built-in system instructions sent alongside every page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptPreset {
    /// Clean Markdown transcription.
    #[default]
    Markdown,
    /// Narrative prose for knowledge-graph / RAG ingestion.
    Graph,
}

impl PromptPreset {
    pub fn text(self) -> &'static str {
        match self {
            Self::Markdown => MARKDOWN_PROMPT,
            Self::Graph => GRAPH_PROMPT,
        }
    }
}

impl FromStr for PromptPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "markdown" => Ok(Self::Markdown),
            "graph" => Ok(Self::Graph),
            other => anyhow::bail!("Unknown prompt preset: {} (expected markdown|graph)", other),
        }
    }
}

/// Everything the pipeline and server need, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Chat-completions endpoint of the vision model server.
    pub api_url: String,
    pub model: String,
    /// Optional bearer token for the endpoint.
    pub api_key: Option<String>,
    pub prompt_preset: PromptPreset,
    /// Literal system prompt; overrides `prompt_preset` when set.
    pub prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Sent as `chat_template_kwargs.enable_thinking` when set.
    pub enable_thinking: Option<bool>,

    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
    /// Maximum in-flight page requests per document.
    pub concurrency: usize,

    pub input_dir: PathBuf,
    pub output_dir: PathBuf,

    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub max_pages: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7600".to_string(),
            max_upload_bytes: 100 * 1024 * 1024,
            max_pages: 500,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:7601/v1/chat/completions".to_string(),
            model: "vision_model".to_string(),
            api_key: None,
            prompt_preset: PromptPreset::default(),
            prompt: None,
            temperature: None,
            max_tokens: None,
            enable_thinking: Some(false),
            max_attempts: 3,
            retry_delay_secs: 5,
            request_timeout_secs: 300,
            concurrency: 5,
            input_dir: PathBuf::from("preprocessed"),
            output_dir: PathBuf::from("ocr_output"),
            server: ServerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Resolve defaults + optional file + process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `OCR_*` variables looked up through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("OCR_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = lookup("OCR_MODEL") {
            self.model = v;
        }
        if let Some(v) = lookup("OCR_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "OCR_PROMPT_PRESET")? {
            self.prompt_preset = v;
        }
        if let Some(v) = lookup("OCR_PROMPT") {
            self.prompt = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "OCR_MAX_ATTEMPTS")? {
            self.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "OCR_RETRY_DELAY_SECS")? {
            self.retry_delay_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "OCR_TIMEOUT_SECS")? {
            self.request_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "OCR_CONCURRENCY")? {
            self.concurrency = v;
        }
        if let Some(v) = lookup("OCR_INPUT_DIR") {
            self.input_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OCR_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OCR_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            anyhow::bail!("api_url must not be empty");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("model must not be empty");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        Ok(())
    }

    pub fn system_prompt(&self) -> &str {
        self.prompt
            .as_deref()
            .unwrap_or_else(|| self.prompt_preset.text())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", key, raw, e)),
        None => Ok(None),
    }
}
