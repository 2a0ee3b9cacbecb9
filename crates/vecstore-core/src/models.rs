//! Data types shared by the store, retriever and chains.

use serde::{Deserialize, Serialize};

/// Free-form chunk metadata. `source` holds the originating file path.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key recording the originating file path of a chunk.
pub const SOURCE_KEY: &str = "source";

/// A pre-split fragment of a file: the unit of storage and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style helper that stamps `metadata.source`.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.insert(
            SOURCE_KEY.to_string(),
            serde_json::Value::String(source.into()),
        );
        self
    }

    /// The originating file path, if recorded.
    pub fn source(&self) -> Option<&str> {
        source_of(&self.metadata)
    }
}

/// Read `source` from a metadata map.
pub fn source_of(metadata: &Metadata) -> Option<&str> {
    metadata.get(SOURCE_KEY).and_then(|v| v.as_str())
}

/// Everything stored in a collection, as parallel lists.
///
/// `ids[i]`, `metadatas[i]` and `documents[i]` describe the same chunk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionSnapshot {
    pub ids: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub documents: Vec<String>,
}

impl CollectionSnapshot {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate `(id, source)` pairs, skipping chunks without a source.
    pub fn sources(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ids
            .iter()
            .zip(self.metadatas.iter())
            .filter_map(|(id, meta)| source_of(meta).map(|s| (id.as_str(), s)))
    }
}

/// A nearest-neighbour candidate returned by [`VectorStore::nearest`](crate::store::VectorStore::nearest).
///
/// Carries its embedding so the retriever can run MMR without another
/// round-trip to the store.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub id: String,
    pub document: Document,
    pub embedding: Vec<f32>,
    /// Cosine similarity to the query vector.
    pub score: f64,
}
