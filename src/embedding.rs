//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations selected by `[embedding].provider`:
//!
//! | Config value | Provider | Endpoint |
//! |--------------|----------|----------|
//! | `openai` | [`OpenAIEmbedder`] | `POST {url or https://api.openai.com/v1}/embeddings` |
//! | `azure` | [`AzureEmbedder`] | `POST {endpoint}/openai/deployments/{model}/embeddings` |
//! | `ollama` | [`OllamaEmbedder`] | `POST {url}/api/embed` |
//! | `local` | `LocalEmbedder` | fastembed, in-process (feature `local-embeddings-fastembed`) |
//! | `disabled` | [`DisabledEmbedder`] | always errors |
//!
//! HTTP providers share the retry policy in [`crate::http`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use vecstore_core::embedding::Embedder;

use crate::config::EmbeddingConfig;
use crate::http::{self, post_json_with_retry, require_env, trim_base_url};

/// Azure OpenAI REST API version used when none is configured.
pub const DEFAULT_AZURE_API_VERSION: &str = "2023-05-15";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Vector size of the well-known hosted models, used when `dims` is not set.
fn known_dims(model: &str) -> Option<usize> {
    match model {
        "text-embedding-ada-002" | "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "nomic-embed-text" => Some(768),
        "mxbai-embed-large" => Some(1024),
        "all-minilm" => Some(384),
        _ => None,
    }
}

fn model_and_dims(config: &EmbeddingConfig, provider: &str) -> Result<(String, usize)> {
    let model = config
        .resolved_model()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("embedding.model required for {} provider", provider))?;
    let dims = config
        .dims
        .or_else(|| known_dims(&model))
        .ok_or_else(|| anyhow!("embedding.dims required for model '{}'", model))?;
    Ok((model, dims))
}

// ============ Disabled ============

/// Refuses to embed. Collections can still be listed and files deleted.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled; set [embedding].provider in the config")
    }
}

// ============ OpenAI ============

pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    /// Requires `OPENAI_API_KEY` in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = model_and_dims(config, "OpenAI")?;
        Ok(Self {
            model,
            dims,
            url: format!(
                "{}/embeddings",
                trim_base_url(config.url.as_deref().unwrap_or(OPENAI_BASE_URL))
            ),
            api_key: require_env("OPENAI_API_KEY")?,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            &[("Authorization", format!("Bearer {}", self.api_key))],
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

// ============ Azure OpenAI ============

/// `model` is the Azure deployment name.
pub struct AzureEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl AzureEmbedder {
    /// Endpoint comes from `embedding.url` or `AZURE_OPENAI_ENDPOINT`; the key
    /// from `AZURE_OPENAI_API_KEY`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = model_and_dims(config, "Azure OpenAI")?;
        let endpoint = match &config.url {
            Some(url) => url.clone(),
            None => require_env("AZURE_OPENAI_ENDPOINT")?,
        };
        let api_version = config
            .api_version
            .as_deref()
            .unwrap_or(DEFAULT_AZURE_API_VERSION);
        Ok(Self {
            url: format!(
                "{}/openai/deployments/{}/embeddings?api-version={}",
                trim_base_url(&endpoint),
                model,
                api_version
            ),
            model,
            dims,
            api_key: require_env("AZURE_OPENAI_API_KEY")?,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for AzureEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "input": texts });
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            &[("api-key", self.api_key.clone())],
            &body,
            self.max_retries,
            "Azure OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid embeddings response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid embeddings response: missing embedding"))?;
        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = model_and_dims(config, "Ollama")?;
        let base = config.url.as_deref().unwrap_or("http://localhost:11434");
        Ok(Self {
            model,
            dims,
            url: format!("{}/api/embed", trim_base_url(base)),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            &[],
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            e.as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::config::DEFAULT_LOCAL_EMBEDDING_MODEL;

    fn fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
        use fastembed::EmbeddingModel as M;
        match name {
            "all-minilm-l6-v2" => Ok((M::AllMiniLML6V2, 384)),
            "bge-small-en-v1.5" => Ok((M::BGESmallENV15, 384)),
            "bge-base-en-v1.5" => Ok((M::BGEBaseENV15, 768)),
            "bge-large-en-v1.5" => Ok((M::BGELargeENV15, 1024)),
            "nomic-embed-text-v1.5" => Ok((M::NomicEmbedTextV15, 768)),
            "multilingual-e5-small" => Ok((M::MultilingualE5Small, 384)),
            "multilingual-e5-base" => Ok((M::MultilingualE5Base, 768)),
            "multilingual-e5-large" => Ok((M::MultilingualE5Large, 1024)),
            other => bail!(
                "Unknown local embedding model: '{}'. Try all-minilm-l6-v2 or bge-small-en-v1.5.",
                other
            ),
        }
    }

    /// In-process embeddings. The model is downloaded and loaded on first use.
    pub struct LocalEmbedder {
        name: String,
        model: fastembed::EmbeddingModel,
        dims: usize,
        batch_size: usize,
        loaded: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
    }

    impl LocalEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let name = config
                .model
                .as_deref()
                .unwrap_or(DEFAULT_LOCAL_EMBEDDING_MODEL)
                .to_string();
            let (model, dims) = fastembed_model(&name)?;
            Ok(Self {
                name,
                model,
                dims,
                batch_size: config.batch_size,
                loaded: Arc::new(Mutex::new(None)),
            })
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        fn model_name(&self) -> &str {
            &self.name
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let texts = texts.to_vec();
            let loaded = Arc::clone(&self.loaded);
            let model = self.model.clone();
            let batch_size = self.batch_size;

            tokio::task::spawn_blocking(move || {
                let mut guard = loaded
                    .lock()
                    .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
                if guard.is_none() {
                    let init = fastembed::InitOptions::new(model).with_show_download_progress(true);
                    let te = fastembed::TextEmbedding::try_new(init).map_err(|e| {
                        anyhow!("Failed to initialize local embedding model: {}", e)
                    })?;
                    *guard = Some(te);
                }
                let te = guard
                    .as_mut()
                    .ok_or_else(|| anyhow!("local embedding model not loaded"))?;
                te.embed(texts, Some(batch_size))
                    .map_err(|e| anyhow!("Local embedding failed: {}", e))
            })
            .await?
        }
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

/// Build the embedder named by `[embedding].provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        "azure" => Ok(Box::new(AzureEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_response_is_reordered_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn malformed_responses_error() {
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
        assert!(parse_ollama_response(&serde_json::json!({ "embeddings": [1] })).is_err());
    }

    #[test]
    fn ollama_response_parses() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.25]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.5, 0.25]]);
    }

    #[tokio::test]
    async fn disabled_provider_refuses() {
        let embedder = create_embedder(&EmbeddingConfig {
            provider: "disabled".into(),
            ..EmbeddingConfig::default()
        })
        .unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        assert!(embedder.embed_query("hi").await.is_err());
    }

    #[cfg(feature = "local-embeddings-fastembed")]
    #[test]
    fn local_provider_without_model_uses_local_default() {
        let config: crate::config::Config =
            toml::from_str("[embedding]\nprovider = \"local\"").unwrap();
        crate::config::validate(&config).unwrap();
        let embedder = create_embedder(&config.embedding).unwrap();
        assert_eq!(embedder.model_name(), "all-minilm-l6-v2");
        assert_eq!(embedder.dims(), 384);
    }

    #[test]
    fn dims_fall_back_to_known_models() {
        let config = EmbeddingConfig::default();
        let (model, dims) = model_and_dims(&config, "OpenAI").unwrap();
        assert_eq!(model, "text-embedding-ada-002");
        assert_eq!(dims, 1536);

        let unknown = EmbeddingConfig {
            model: Some("mystery".into()),
            ..EmbeddingConfig::default()
        };
        assert!(model_and_dims(&unknown, "OpenAI").is_err());
    }
}
