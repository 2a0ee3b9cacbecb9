//! Storage abstraction for a vector collection.
//!
//! The [`VectorStore`] trait covers the handful of operations the
//! application needs: append chunks with their vectors, list everything,
//! delete by id, and fetch nearest neighbours optionally restricted to one
//! source. Backends: [`memory::InMemoryStore`] here, the SQLite store in the
//! application crate.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CollectionSnapshot, Document, ScoredDocument};

/// Typed store failures the application translates into user-facing errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `delete` was called with no ids.
    #[error("expected ids to be a non-empty list")]
    EmptyIds,
    /// `add` was given a different number of documents and vectors.
    #[error("got {documents} documents but {vectors} vectors")]
    LengthMismatch { documents: usize, vectors: usize },
}

/// Abstract collection backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorStore::add) | Insert chunks with their vectors, returning generated ids |
/// | [`get`](VectorStore::get) | Snapshot of every stored id, metadata and text |
/// | [`delete`](VectorStore::delete) | Remove chunks by id; empty id list is an error |
/// | [`nearest`](VectorStore::nearest) | Top-`k` by cosine similarity, optionally for one source |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert `documents[i]` with `vectors[i]`. Returns one new id per document.
    async fn add(&self, documents: &[Document], vectors: &[Vec<f32>]) -> Result<Vec<String>>;

    /// Everything in the collection, in insertion order.
    async fn get(&self) -> Result<CollectionSnapshot>;

    /// Delete chunks by id. Fails with [`StoreError::EmptyIds`] when `ids` is empty.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// The `k` chunks most similar to `query_vec`, best first.
    ///
    /// When `source` is set only chunks whose `metadata.source` equals it
    /// are considered.
    async fn nearest(
        &self,
        query_vec: &[f32],
        k: usize,
        source: Option<&str>,
    ) -> Result<Vec<ScoredDocument>>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize> {
        Ok(self.get().await?.len())
    }
}

/// Shared argument checks for [`VectorStore::add`] implementations.
pub fn check_add_lengths(documents: &[Document], vectors: &[Vec<f32>]) -> Result<()> {
    if documents.len() != vectors.len() {
        return Err(StoreError::LengthMismatch {
            documents: documents.len(),
            vectors: vectors.len(),
        }
        .into());
    }
    Ok(())
}

/// Sort candidates by score (desc) and keep the best `k`.
pub fn top_k(mut candidates: Vec<ScoredDocument>, k: usize) -> Vec<ScoredDocument> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(k);
    candidates
}
