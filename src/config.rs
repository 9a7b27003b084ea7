//! TOML configuration.
//!
//! Every section except `[notion]` has defaults, so a minimal file can be
//! as small as:
//!
//! ```toml
//! [source]
//! kind = "file"
//! path = "./records.json"
//!
//! [embedding]
//! provider = "hash"
//! ```
//!
//! [`load_config`] parses and validates; invalid chunking parameters and
//! unknown providers are rejected here rather than mid-sync.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use notion_rag_core::chunk::{ChunkParams, DEFAULT_MAX_WORDS, DEFAULT_OVERLAP};
use notion_rag_core::context::{ContextConfig, DEFAULT_ROUTINE_TOP_K, DEFAULT_TASK_TOP_K};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub notion: NotionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Parent of all tenant directories.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

fn default_max_words() -> usize {
    DEFAULT_MAX_WORDS
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

impl ChunkingConfig {
    pub fn params(&self) -> Result<ChunkParams> {
        Ok(ChunkParams::new(self.max_words, self.overlap)?)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_task_top_k")]
    pub task_top_k: usize,
    #[serde(default = "default_routine_top_k")]
    pub routine_top_k: usize,
    #[serde(default = "default_view_start")]
    pub calendar_view_start: String,
    #[serde(default = "default_view_end")]
    pub calendar_view_end: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            task_top_k: DEFAULT_TASK_TOP_K,
            routine_top_k: DEFAULT_ROUTINE_TOP_K,
            calendar_view_start: default_view_start(),
            calendar_view_end: default_view_end(),
        }
    }
}

fn default_task_top_k() -> usize {
    DEFAULT_TASK_TOP_K
}
fn default_routine_top_k() -> usize {
    DEFAULT_ROUTINE_TOP_K
}
fn default_view_start() -> String {
    "10:00".to_string()
}
fn default_view_end() -> String {
    "02:00".to_string()
}

impl RetrievalConfig {
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig {
            task_top_k: self.task_top_k,
            routine_top_k: self.routine_top_k,
            calendar_view_start: self.calendar_view_start.clone(),
            calendar_view_end: self.calendar_view_end.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override (Ollama).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Notion,
    File,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// JSON record file for `kind = "file"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotionConfig {
    #[serde(default)]
    pub tasks_database_id: Option<String>,
    #[serde(default)]
    pub routines_database_id: Option<String>,
    #[serde(default = "default_notion_version")]
    pub api_version: String,
    #[serde(default = "default_notion_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            tasks_database_id: None,
            routines_database_id: None,
            api_version: default_notion_version(),
            base_url: default_notion_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_notion_version() -> String {
    "2022-06-28".to_string()
}
fn default_notion_url() -> String {
    "https://api.notion.com".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.max_words == 0 {
        bail!("chunking.max_words must be > 0");
    }
    if config.chunking.overlap >= config.chunking.max_words {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.max_words ({})",
            config.chunking.overlap,
            config.chunking.max_words
        );
    }

    // Validate retrieval
    if config.retrieval.task_top_k == 0 || config.retrieval.routine_top_k == 0 {
        bail!("retrieval.task_top_k and retrieval.routine_top_k must be >= 1");
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "hash" | "local" => {}
        "openai" | "ollama" | "gemini" => {
            if embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.dims.is_none() || embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, gemini, or local.",
            other
        ),
    }
    if embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }

    if config.source.kind == SourceKind::File && config.source.path.is_none() {
        bail!("source.path is required when source.kind = \"file\"");
    }

    Ok(())
}
