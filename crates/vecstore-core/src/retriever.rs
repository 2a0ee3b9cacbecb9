//! Query-time retrieval over a [`VectorStore`].
//!
//! Two search types:
//!
//! - **similarity**: the `k` nearest chunks by cosine similarity.
//! - **mmr** (maximal marginal relevance): fetch `fetch_k` nearest chunks,
//!   then greedily pick `k` of them, trading relevance to the query against
//!   redundancy with already-picked chunks:
//!
//! ```text
//! score(i) = λ · sim(query, i) − (1 − λ) · max_{j ∈ picked} sim(i, j)
//! ```

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::Document;
use crate::store::VectorStore;

/// How candidates are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Similarity,
    Mmr,
}

impl FromStr for SearchType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "similarity" => Ok(SearchType::Similarity),
            "mmr" => Ok(SearchType::Mmr),
            other => bail!("Unknown search type: '{}'. Use mmr or similarity.", other),
        }
    }
}

/// Retrieval tuning, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrieverParams {
    pub search_type: SearchType,
    /// Chunks handed to the chain.
    pub k: usize,
    /// Candidates considered by MMR.
    pub fetch_k: usize,
    /// 1.0 = pure relevance, 0.0 = pure diversity.
    pub lambda_mult: f32,
}

impl Default for RetrieverParams {
    fn default() -> Self {
        Self {
            search_type: SearchType::Mmr,
            k: 4,
            fetch_k: 20,
            lambda_mult: 0.5,
        }
    }
}

/// A store + embedder pair scoped to an optional source path.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    params: RetrieverParams,
    source: Option<String>,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        params: RetrieverParams,
    ) -> Self {
        Self {
            store,
            embedder,
            params,
            source: None,
        }
    }

    /// Restrict retrieval to chunks whose `metadata.source` equals `source`.
    pub fn with_source_filter(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    /// Fetch the chunks relevant to `query`, best first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let source = self.source.as_deref();

        match self.params.search_type {
            SearchType::Similarity => {
                let hits = self.store.nearest(&query_vec, self.params.k, source).await?;
                Ok(hits.into_iter().map(|h| h.document).collect())
            }
            SearchType::Mmr => {
                let fetch_k = self.params.fetch_k.max(self.params.k);
                let hits = self.store.nearest(&query_vec, fetch_k, source).await?;
                let embeddings: Vec<Vec<f32>> =
                    hits.iter().map(|h| h.embedding.clone()).collect();
                let picked = maximal_marginal_relevance(
                    &query_vec,
                    &embeddings,
                    self.params.lambda_mult,
                    self.params.k,
                );
                // Take out of `hits` in pick order without cloning documents.
                let mut docs = Vec::with_capacity(picked.len());
                let mut slots: Vec<Option<Document>> =
                    hits.into_iter().map(|h| Some(h.document)).collect();
                for idx in picked {
                    if let Some(doc) = slots.get_mut(idx).and_then(Option::take) {
                        docs.push(doc);
                    }
                }
                Ok(docs)
            }
        }
    }
}

/// Indices of `embeddings` chosen by maximal marginal relevance, in pick order.
///
/// The first pick is always the candidate most similar to `query`.
pub fn maximal_marginal_relevance(
    query: &[f32],
    embeddings: &[Vec<f32>],
    lambda_mult: f32,
    k: usize,
) -> Vec<usize> {
    let want = k.min(embeddings.len());
    if want == 0 {
        return Vec::new();
    }

    let to_query: Vec<f32> = embeddings
        .iter()
        .map(|e| cosine_similarity(query, e))
        .collect();

    let first = argmax(&to_query);
    let mut picked = vec![first];
    // Highest similarity of each candidate to anything picked so far.
    let mut redundancy: Vec<f32> = embeddings
        .iter()
        .map(|e| cosine_similarity(e, &embeddings[first]))
        .collect();

    while picked.len() < want {
        let mut best = f32::NEG_INFINITY;
        let mut best_idx = None;
        for (i, &relevance) in to_query.iter().enumerate() {
            if picked.contains(&i) {
                continue;
            }
            let score = lambda_mult * relevance - (1.0 - lambda_mult) * redundancy[i];
            if score > best {
                best = score;
                best_idx = Some(i);
            }
        }
        let Some(next) = best_idx else { break };
        picked.push(next);
        for (i, e) in embeddings.iter().enumerate() {
            let sim = cosine_similarity(e, &embeddings[next]);
            if sim > redundancy[i] {
                redundancy[i] = sim;
            }
        }
    }

    picked
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
