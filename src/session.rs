//! The session: current collection, chat history and the four operations.
//!
//! | Operation | Method |
//! |-----------|--------|
//! | create / load a collection | [`Session::create_collection`], [`Session::load_collection`] |
//! | add a file | [`Session::add_file`], [`Session::ingest_file`] |
//! | delete a file | [`Session::delete_file`] |
//! | ask a question | [`Session::ask`] |
//!
//! The CLI owns one session per invocation. The server keeps one behind a
//! `tokio::sync::Mutex`, so operations never interleave.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use vecstore_core::chain::{ChainType, RetrievalQa};
use vecstore_core::chat::ChatModel;
use vecstore_core::embedding::Embedder;
use vecstore_core::files;
use vecstore_core::models::Document;
use vecstore_core::store::StoreError;

use crate::collection::Collection;
use crate::config::{ChatConfig, Config, EmbeddingConfig};
use crate::embedding::create_embedder;
use crate::error::VecstoreError;
use crate::llm::create_chat_model;
use crate::loader::load_file;
use crate::progress::{ProgressEvent, ProgressReporter};

/// Appended to every answer from the bare chat model.
pub const CITATION_LABEL: &str = "\nCited documents:";

/// File-filter value meaning "search the whole collection".
pub const UNSELECT_FILE: &str = "Unselect file(s)";

pub const BASE_MODEL_NOTICE: &str =
    "No knowledge base selected, so the answer comes from the base model.";
pub const CREATE_NOTICE: &str = "Successfully created knowledge base.";
pub const LOAD_NOTICE: &str = "Successfully loaded knowledge base.";
pub const DELETE_NOTICE: &str = "The selected file has been deleted";

pub const PROGRESS_UPDATING: &str = "Updating knowledge base...";
pub const PROGRESS_ADDING: &str = "Adding the file to the knowledge base...";
pub const PROGRESS_COMPARING: &str = "Document comparison in progress...";
pub const PROGRESS_DELETING: &str = "File deleting...";

/// Where a session gets its embedder and chat models from.
pub trait Providers: Send + Sync {
    fn embedder(&self) -> Result<Arc<dyn Embedder>>;
    /// `model` overrides the configured default when set.
    fn chat_model(&self, model: Option<&str>) -> Result<Arc<dyn ChatModel>>;
}

/// Providers built from `[embedding]` and `[chat]`. The embedder is created
/// once and shared by every collection the session opens.
pub struct ConfiguredProviders {
    embedding: EmbeddingConfig,
    chat: ChatConfig,
    embedder: Mutex<Option<Arc<dyn Embedder>>>,
}

impl ConfiguredProviders {
    pub fn new(config: &Config) -> Self {
        Self {
            embedding: config.embedding.clone(),
            chat: config.chat.clone(),
            embedder: Mutex::new(None),
        }
    }
}

impl Providers for ConfiguredProviders {
    fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let mut cached = self
            .embedder
            .lock()
            .map_err(|_| anyhow::anyhow!("embedder cache lock poisoned"))?;
        if let Some(embedder) = cached.as_ref() {
            return Ok(Arc::clone(embedder));
        }
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&self.embedding)?);
        *cached = Some(Arc::clone(&embedder));
        Ok(embedder)
    }

    fn chat_model(&self, model: Option<&str>) -> Result<Arc<dyn ChatModel>> {
        Ok(Arc::new(create_chat_model(&self.chat, model)?))
    }
}

/// One question in the history. `answer` stays `None` until
/// [`Session::resolve_pending`] fills it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub chain_type: Option<String>,
    #[serde(default)]
    pub collection_path: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub result: String,
    pub source_documents: Vec<Document>,
    /// The source path retrieval was restricted to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    pub path: PathBuf,
    pub files: Vec<String>,
    pub notice: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    pub file_name: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub file_name: String,
    pub removed: usize,
    pub notice: String,
}

pub struct Session {
    config: Config,
    providers: Arc<dyn Providers>,
    collection: Option<Collection>,
    history: Vec<ChatTurn>,
    pending: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Session {
    pub fn new(config: Config, providers: Arc<dyn Providers>) -> Self {
        Self {
            config,
            providers,
            collection: None,
            history: Vec::new(),
            pending: None,
        }
    }

    /// A session whose providers come from `config`.
    pub fn from_config(config: Config) -> Self {
        let providers = Arc::new(ConfiguredProviders::new(&config));
        Self::new(config, providers)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collection(&self) -> Option<&Collection> {
        self.collection.as_ref()
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Make the collection at `path` current, reusing the open one when the
    /// path is unchanged.
    async fn open_collection(&mut self, path: &Path) -> Result<&Collection> {
        let reuse = self
            .collection
            .as_ref()
            .is_some_and(|c| c.path() == path);
        if !reuse {
            let embedder = self.providers.embedder()?;
            let collection =
                Collection::open(path, embedder, self.config.embedding.batch_size).await?;
            self.collection = Some(collection);
        }
        self.collection
            .as_ref()
            .ok_or_else(|| VecstoreError::NotInitialized.into())
    }

    /// Create (or re-open) the collection at an absolute `path`.
    pub async fn create_collection(&mut self, path: &str) -> Result<String> {
        let path = path.trim();
        if path.is_empty() {
            return Err(VecstoreError::MissingPath.into());
        }
        if !Path::new(path).is_absolute() {
            return Err(VecstoreError::InvalidPath(path.to_string()).into());
        }
        self.open_collection(Path::new(path)).await?;
        tracing::info!("created collection {}", path);
        Ok(CREATE_NOTICE.to_string())
    }

    /// Open the collection at `path` and list its files.
    pub async fn load_collection(&mut self, path: Option<&str>) -> Result<LoadOutcome> {
        let path = non_empty(path).ok_or(VecstoreError::MissingPath)?;
        let collection = self.open_collection(Path::new(path)).await?;
        let files = collection.file_names().await?;
        Ok(LoadOutcome {
            path: collection.path().to_path_buf(),
            files,
            notice: LOAD_NOTICE.to_string(),
        })
    }

    /// File names in the current collection.
    pub async fn current_files(&self) -> Result<Vec<String>> {
        let collection = self
            .collection
            .as_ref()
            .ok_or(VecstoreError::NotInitialized)?;
        collection.file_names().await
    }

    /// Insert pre-split `docs` for `file` into the collection at
    /// `collection_path`, refusing a file whose base name is already stored.
    pub async fn add_file(
        &mut self,
        collection_path: Option<&str>,
        file: Option<&Path>,
        docs: &[Document],
        progress: &dyn ProgressReporter,
    ) -> Result<AddOutcome> {
        let file = file.ok_or(VecstoreError::NoFileChosen)?;
        let collection_path = non_empty(collection_path).ok_or(VecstoreError::NoCollection)?;
        let collection = self.open_collection(Path::new(collection_path)).await?;

        let file_path = file.to_string_lossy();
        let file_name = files::base_name(&file_path).to_string();

        let snapshot = collection.snapshot().await?;
        progress.report(ProgressEvent::new(0.3, PROGRESS_UPDATING));

        if files::contains_file(&snapshot, &file_name) {
            return Err(VecstoreError::DuplicateFile(file_name).into());
        }

        let ids = collection.add_documents(docs).await?;
        progress.report(ProgressEvent::new(1.0, PROGRESS_ADDING));
        tracing::info!(
            "added {} ({} chunks) to {}",
            file_name,
            ids.len(),
            collection.path().display()
        );

        Ok(AddOutcome {
            file_name,
            chunks: ids.len(),
        })
    }

    /// Read, extract and split `file`, then [`add_file`](Self::add_file) it.
    pub async fn ingest_file(
        &mut self,
        collection_path: Option<&str>,
        file: Option<&Path>,
        progress: &dyn ProgressReporter,
    ) -> Result<AddOutcome> {
        let file = file.ok_or(VecstoreError::NoFileChosen)?;
        if non_empty(collection_path).is_none() {
            return Err(VecstoreError::NoCollection.into());
        }
        let docs = load_file(file, &self.config.chunking)
            .map_err(|e| VecstoreError::InvalidRequest(format!("{:#}", e)))?;
        self.add_file(collection_path, Some(file), &docs, progress)
            .await
    }

    /// Remove every chunk whose source base name is `name`.
    pub async fn delete_file(
        &mut self,
        name: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<DeleteOutcome> {
        let collection = self
            .collection
            .as_ref()
            .ok_or(VecstoreError::NotInitialized)?;

        let snapshot = collection.snapshot().await?;
        let ids = files::ids_for_file(&snapshot, name);
        progress.report(ProgressEvent::new(0.9, PROGRESS_COMPARING));

        if let Err(e) = collection.delete_ids(&ids).await {
            if matches!(e.downcast_ref::<StoreError>(), Some(StoreError::EmptyIds)) {
                return Err(VecstoreError::FileNotFound(name.to_string()).into());
            }
            return Err(e);
        }

        progress.report(ProgressEvent::new(1.0, PROGRESS_DELETING));
        tracing::info!(
            "deleted {} ({} chunks) from {}",
            name,
            ids.len(),
            collection.path().display()
        );

        Ok(DeleteOutcome {
            file_name: name.to_string(),
            removed: ids.len(),
            notice: DELETE_NOTICE.to_string(),
        })
    }

    /// Answer a question, from the collection when `collection_path` is set
    /// and from the bare chat model otherwise.
    pub async fn ask(&mut self, req: &AskRequest) -> Result<Answer> {
        let question = req.question.trim();
        if question.is_empty() {
            return Err(VecstoreError::InvalidRequest("Please enter a question".into()).into());
        }
        let chain_type = non_empty(req.chain_type.as_deref())
            .unwrap_or(self.config.retrieval.chain_type.as_str())
            .parse::<ChainType>()
            .map_err(|e: anyhow::Error| VecstoreError::InvalidRequest(e.to_string()))?;
        let llm = self.providers.chat_model(non_empty(req.model.as_deref()))?;

        let answer = match non_empty(req.collection_path.as_deref()) {
            None => {
                tracing::info!("{}", BASE_MODEL_NOTICE);
                let reply = llm.predict(question).await?;
                Answer {
                    query: question.to_string(),
                    result: format!("{}{}", reply, CITATION_LABEL),
                    source_documents: Vec::new(),
                    source_filter: None,
                    notice: Some(BASE_MODEL_NOTICE.to_string()),
                }
            }
            Some(path) => {
                let params = self.config.retrieval.params()?;
                let collection = self.open_collection(Path::new(path)).await?;
                let source = match non_empty(req.file.as_deref()) {
                    None | Some(UNSELECT_FILE) => None,
                    Some(name) => {
                        let snapshot = collection.snapshot().await?;
                        let resolved = files::resolve_source_filter(name, &snapshot);
                        if resolved.is_none() {
                            tracing::debug!(
                                "no stored source matches '{}', using whole collection",
                                name
                            );
                        }
                        resolved
                    }
                };

                let retriever = collection.retriever(params, source.clone());
                let qa = RetrievalQa::new(llm, retriever, chain_type);
                let out = qa.run(question).await?;
                tracing::debug!(
                    "{} chain answered with {} source documents",
                    chain_type,
                    out.source_documents.len()
                );
                Answer {
                    query: out.query,
                    result: out.result,
                    source_documents: out.source_documents,
                    source_filter: source,
                    notice: None,
                }
            }
        };

        self.history.push(ChatTurn {
            question: answer.query.clone(),
            answer: None,
        });
        self.pending = Some(answer.result.clone());
        Ok(answer)
    }

    /// Move the pending answer into the latest history turn.
    pub fn resolve_pending(&mut self) -> Option<&ChatTurn> {
        let answer = self.pending.take()?;
        let turn = self.history.last_mut()?;
        turn.answer = Some(answer);
        Some(turn)
    }
}
