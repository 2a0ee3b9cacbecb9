//! In-memory [`VectorStore`] for tests and ephemeral sessions.
//!
//! Rows live in a `Vec` behind a `std::sync::RwLock`; nearest-neighbour
//! search is a brute-force cosine scan. Ids are sequential (`mem-0`, `mem-1`, ...).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{CollectionSnapshot, Document, ScoredDocument};

use super::{check_add_lengths, top_k, StoreError, VectorStore};

struct Row {
    id: String,
    document: Document,
    vector: Vec<f32>,
}

/// Volatile store backed by a vector of rows.
#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<Vec<Row>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add(&self, documents: &[Document], vectors: &[Vec<f32>]) -> Result<Vec<String>> {
        check_add_lengths(documents, vectors)?;
        let mut rows = self.rows.write().map_err(poisoned)?;
        let mut ids = Vec::with_capacity(documents.len());
        for (doc, vec) in documents.iter().zip(vectors) {
            let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
            rows.push(Row {
                id: id.clone(),
                document: doc.clone(),
                vector: vec.clone(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn get(&self) -> Result<CollectionSnapshot> {
        let rows = self.rows.read().map_err(poisoned)?;
        let mut snap = CollectionSnapshot::default();
        for row in rows.iter() {
            snap.ids.push(row.id.clone());
            snap.metadatas.push(row.document.metadata.clone());
            snap.documents.push(row.document.page_content.clone());
        }
        Ok(snap)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Err(StoreError::EmptyIds.into());
        }
        let mut rows = self.rows.write().map_err(poisoned)?;
        rows.retain(|row| !ids.contains(&row.id));
        Ok(())
    }

    async fn nearest(
        &self,
        query_vec: &[f32],
        k: usize,
        source: Option<&str>,
    ) -> Result<Vec<ScoredDocument>> {
        let rows = self.rows.read().map_err(poisoned)?;
        let candidates = rows
            .iter()
            .filter(|row| source.is_none() || row.document.source() == source)
            .map(|row| ScoredDocument {
                id: row.id.clone(),
                document: row.document.clone(),
                embedding: row.vector.clone(),
                score: cosine_similarity(query_vec, &row.vector) as f64,
            })
            .collect();
        Ok(top_k(candidates, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str, text: &str) -> Document {
        Document::new(text).with_source(source)
    }

    #[tokio::test]
    async fn add_get_delete() {
        let store = InMemoryStore::new();
        let ids = store
            .add(
                &[doc("/a.txt", "one"), doc("/b.txt", "two")],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        store.delete(&ids[..1]).await.unwrap();
        let snap = store.get().await.unwrap();
        assert_eq!(snap.documents, vec!["two"]);
    }

    #[tokio::test]
    async fn delete_empty_is_typed_error() {
        let store = InMemoryStore::new();
        let err = store.delete(&[]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::EmptyIds)
        ));
    }

    #[tokio::test]
    async fn add_rejects_length_mismatch() {
        let store = InMemoryStore::new();
        let err = store.add(&[doc("/a", "x")], &[]).await.unwrap_err();
        assert!(err.to_string().contains("1 documents but 0 vectors"));
    }

    #[tokio::test]
    async fn nearest_respects_source_filter() {
        let store = InMemoryStore::new();
        store
            .add(
                &[doc("/a.txt", "a"), doc("/b.txt", "b")],
                &[vec![1.0, 0.0], vec![0.9, 0.1]],
            )
            .await
            .unwrap();

        let all = store.nearest(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].document.page_content, "a");

        let only_b = store.nearest(&[1.0, 0.0], 10, Some("/b.txt")).await.unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].document.source(), Some("/b.txt"));
    }
}
