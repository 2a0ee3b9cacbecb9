//! TOML configuration.
//!
//! Every section is optional; a missing file yields [`Config::minimal`].
//! API keys are never read from the file, only from the environment
//! (`OPENAI_API_KEY`, `AZURE_OPENAI_API_KEY`, `AZURE_OPENAI_ENDPOINT`).
//!
//! ```toml
//! [collection]
//! path = "/srv/kb/handbook"
//!
//! [chunking]
//! max_tokens = 250
//!
//! [retrieval]
//! search_type = "mmr"
//! k = 4
//! fetch_k = 20
//! lambda_mult = 0.5
//! chain_type = "stuff"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-ada-002"
//! dims = 1536
//!
//! [chat]
//! provider = "azure"
//! model = "gpt-35-turbo"
//! url = "https://my-resource.openai.azure.com"
//!
//! [server]
//! bind = "127.0.0.1:7860"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use vecstore_core::chain::ChainType;
use vecstore_core::retriever::{RetrieverParams, SearchType};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CollectionConfig {
    /// Used when a command is given no `--collection`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_search_type")]
    pub search_type: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,
    /// Chain used when a question does not name one.
    #[serde(default = "default_chain_type")]
    pub chain_type: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_type: default_search_type(),
            k: default_k(),
            fetch_k: default_fetch_k(),
            lambda_mult: default_lambda_mult(),
            chain_type: default_chain_type(),
        }
    }
}

fn default_search_type() -> String {
    "mmr".to_string()
}
fn default_k() -> usize {
    4
}
fn default_fetch_k() -> usize {
    20
}
fn default_lambda_mult() -> f32 {
    0.5
}
fn default_chain_type() -> String {
    "stuff".to_string()
}

impl RetrievalConfig {
    /// Retriever tuning for the core crate. Assumes [`load_config`] validated it.
    pub fn params(&self) -> Result<RetrieverParams> {
        Ok(RetrieverParams {
            search_type: self.search_type.parse::<SearchType>()?,
            k: self.k,
            fetch_k: self.fetch_k,
            lambda_mult: self.lambda_mult,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Unset means the provider default, see [`EmbeddingConfig::resolved_model`].
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `ollama` or the Azure resource endpoint for `azure`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            api_version: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
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

/// Embedding model for `openai` and `azure` when none is configured.
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// fastembed model for `local` when none is configured.
pub const DEFAULT_LOCAL_EMBEDDING_MODEL: &str = "all-minilm-l6-v2";

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// The configured model, else the provider's default. `ollama` has none.
    pub fn resolved_model(&self) -> Option<&str> {
        self.model.as_deref().or(match self.provider.as_str() {
            "openai" | "azure" => Some(DEFAULT_OPENAI_EMBEDDING_MODEL),
            "local" => Some(DEFAULT_LOCAL_EMBEDDING_MODEL),
            _ => None,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_provider")]
    pub provider: String,
    /// Model used when a question does not name one. For `azure` this is
    /// the deployment name.
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_chat_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_chat_provider(),
            model: default_chat_model(),
            url: None,
            api_version: None,
            temperature: default_temperature(),
            max_retries: default_chat_retries(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_provider() -> String {
    "openai".to_string()
}
fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_chat_retries() -> u32 {
    3
}
fn default_chat_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7860".to_string()
}

impl Config {
    /// All defaults; used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Read `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!("no config at {}, using defaults", path.display());
        Ok(Config::minimal())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Reject configurations that would only fail later, mid-request.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    let retrieval = &config.retrieval;
    retrieval.search_type.parse::<SearchType>()?;
    retrieval.chain_type.parse::<ChainType>()?;
    if retrieval.k == 0 {
        bail!("retrieval.k must be >= 1");
    }
    if retrieval.fetch_k < retrieval.k {
        bail!("retrieval.fetch_k must be >= retrieval.k");
    }
    if !(0.0..=1.0).contains(&retrieval.lambda_mult) {
        bail!("retrieval.lambda_mult must be in [0.0, 1.0]");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "azure" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, azure, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.resolved_model().is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.chat.provider.as_str() {
        "openai" | "azure" | "ollama" => {}
        other => bail!(
            "Unknown chat provider: '{}'. Must be openai, azure, or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.chat.temperature) {
        bail!("chat.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
