//! An open collection: a directory, its store, and the embedder bound to it.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vecstore_core::embedding::Embedder;
use vecstore_core::files;
use vecstore_core::models::{CollectionSnapshot, Document};
use vecstore_core::retriever::{Retriever, RetrieverParams};
use vecstore_core::store::VectorStore;

use crate::db;
use crate::migrate::run_migrations;
use crate::sqlite_store::SqliteStore;

const INFO_MODEL: &str = "embedding_model";
const INFO_DIMS: &str = "embedding_dims";

#[derive(Clone)]
pub struct Collection {
    path: PathBuf,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl Collection {
    /// Open the SQLite collection in `path`, creating it when absent.
    ///
    /// The first enabled embedder to open a collection is recorded in it;
    /// opening later with a different model only logs a warning, since
    /// vectors from different models are not comparable.
    pub async fn open(path: &Path, embedder: Arc<dyn Embedder>, batch_size: usize) -> Result<Self> {
        let pool = db::connect(path).await?;
        run_migrations(&pool).await?;
        let store = SqliteStore::new(pool);

        if embedder.model_name() != "disabled" {
            match store.info(INFO_MODEL).await? {
                None => {
                    store.set_info(INFO_MODEL, embedder.model_name()).await?;
                    store
                        .set_info(INFO_DIMS, &embedder.dims().to_string())
                        .await?;
                }
                Some(recorded) if recorded != embedder.model_name() => {
                    tracing::warn!(
                        "collection {} was embedded with '{}' but is opened with '{}'",
                        path.display(),
                        recorded,
                        embedder.model_name()
                    );
                }
                Some(_) => {}
            }
        }

        tracing::info!("opened collection {}", path.display());
        Ok(Self::with_store(path, Arc::new(store), embedder, batch_size))
    }

    /// Wrap an already-open store.
    pub fn with_store(
        path: &Path,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            store,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub async fn snapshot(&self) -> Result<CollectionSnapshot> {
        self.store.get().await
    }

    /// Distinct base filenames of everything stored, sorted.
    pub async fn file_names(&self) -> Result<Vec<String>> {
        Ok(files::file_names(&self.snapshot().await?))
    }

    /// Embed `docs` in batches and insert them. Returns the new chunk ids.
    pub async fn add_documents(&self, docs: &[Document]) -> Result<Vec<String>> {
        let mut vectors = Vec::with_capacity(docs.len());
        for batch in docs.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.page_content.clone()).collect();
            vectors.extend(self.embedder.embed_documents(&texts).await?);
        }
        self.store.add(docs, &vectors).await
    }

    pub async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        self.store.delete(ids).await
    }

    /// A retriever over this collection, optionally restricted to one source path.
    pub fn retriever(&self, params: RetrieverParams, source: Option<String>) -> Retriever {
        Retriever::new(Arc::clone(&self.store), Arc::clone(&self.embedder), params)
            .with_source_filter(source)
    }
}
