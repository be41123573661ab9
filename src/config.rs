//! Configuration loading.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. built-in defaults (every field has one),
//! 2. an optional TOML file (`--config`, or `./docqa.toml` when present),
//! 3. environment variables (`PINECONE_INDEX`, `PINECONE_REGION`,
//!    `OPENAI_API_MODEL`, `OPENAI_API_TEMPERATURE`, `OPENAI_BASE_URL`).
//!
//! API keys are read from the environment only and are checked lazily by
//! [`OpenAIConfig::require_api_key`] / [`PineconeConfig::require_api_key`],
//! so commands that never touch the network (`ingest --dry-run`) run
//! without credentials.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "docqa.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// What to do when a single file cannot be loaded.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Log the failure and continue with the next file.
    #[default]
    Skip,
    /// Stop the batch at the failing file.
    Abort,
}

impl OnError {
    /// What the run does about a file that failed to load.
    pub fn action(self) -> &'static str {
        match self {
            OnError::Skip => "skipping unreadable file",
            OnError::Abort => "aborting on unreadable file",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub on_error: OnError,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            on_error: OnError::Skip,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./data")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    500
}
fn default_overlap_chars() -> usize {
    50
}

/// Shared settings for every OpenAI-compatible call (embeddings and chat).
#[derive(Debug, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            timeout_secs: default_openai_timeout_secs(),
            max_retries: default_max_retries(),
            api_key: None,
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_openai_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    5
}

impl OpenAIConfig {
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}
fn default_dims() -> usize {
    3072
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct PineconeConfig {
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_controller_url")]
    pub controller_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    #[serde(default = "default_pinecone_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            index: None,
            cloud: default_cloud(),
            region: default_region(),
            metric: default_metric(),
            controller_url: default_controller_url(),
            api_version: default_api_version(),
            namespace: String::new(),
            upsert_batch_size: default_upsert_batch_size(),
            timeout_secs: default_pinecone_timeout_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_cloud() -> String {
    "aws".to_string()
}
fn default_region() -> String {
    "us-west-1".to_string()
}
fn default_metric() -> String {
    "cosine".to_string()
}
fn default_controller_url() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_api_version() -> String {
    "2024-07".to_string()
}
fn default_upsert_batch_size() -> usize {
    50
}
fn default_pinecone_timeout_secs() -> u64 {
    30
}
fn default_ready_timeout_secs() -> u64 {
    120
}

impl PineconeConfig {
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("PINECONE_API_KEY environment variable not set"))
    }

    pub fn require_index(&self) -> Result<&str> {
        self.index.as_deref().filter(|i| !i.is_empty()).ok_or_else(|| {
            anyhow::anyhow!("No index name: set PINECONE_INDEX or pinecone.index in the config")
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum retained conversation turns; `0` keeps everything.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            temperature: 0.0,
            top_k: default_top_k(),
            history_cap: default_history_cap(),
            stream: default_stream(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_top_k() -> usize {
    4
}
fn default_history_cap() -> usize {
    10
}
fn default_stream() -> bool {
    true
}

impl ChatConfig {
    pub fn history_cap(&self) -> Option<usize> {
        (self.history_cap > 0).then_some(self.history_cap)
    }
}

/// Load the configuration used by every command.
///
/// With `path = None` the default file is read if it exists; otherwise the
/// built-in defaults are used. An explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                read_config_file(default_path)?
            } else {
                Config::default()
            }
        }
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Overlay environment variables onto `config`.
///
/// `lookup` abstracts `std::env::var` so tests can feed a fixed map.
pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = get("PINECONE_API_KEY") {
        config.pinecone.api_key = Some(key);
    }
    if let Some(index) = get("PINECONE_INDEX") {
        config.pinecone.index = Some(index);
    }
    if let Some(region) = get("PINECONE_REGION") {
        config.pinecone.region = region;
    }
    if let Some(key) = get("OPENAI_API_KEY") {
        config.openai.api_key = Some(key);
    }
    if let Some(url) = get("OPENAI_BASE_URL") {
        config.openai.base_url = url;
    }
    if let Some(model) = get("OPENAI_API_MODEL") {
        config.chat.model = model;
    }
    if let Some(raw) = get("OPENAI_API_TEMPERATURE") {
        config.chat.temperature = raw.trim().parse::<f32>().with_context(|| {
            format!("OPENAI_API_TEMPERATURE must be a number, got '{}'", raw)
        })?;
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        bail!(
            "chunking.overlap_chars ({}) must be smaller than chunking.max_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.max_chars
        );
    }

    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.pinecone.upsert_batch_size == 0 {
        bail!("pinecone.upsert_batch_size must be > 0");
    }

    match config.pinecone.metric.as_str() {
        "cosine" | "euclidean" | "dotproduct" => {}
        other => bail!(
            "Unknown pinecone.metric: '{}'. Must be cosine, euclidean, or dotproduct.",
            other
        ),
    }

    if config.chat.top_k == 0 {
        bail!("chat.top_k must be >= 1");
    }
    if !(0.0..=2.0).contains(&config.chat.temperature) {
        bail!(
            "chat temperature must be in [0.0, 2.0], got {}",
            config.chat.temperature
        );
    }

    Ok(())
}
