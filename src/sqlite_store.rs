//! SQLite-backed [`VectorStore`].
//!
//! One row per chunk in `chunks`; vectors are little-endian `f32` BLOBs.
//! Nearest-neighbour search is a brute-force cosine scan over the rows,
//! narrowed by `source` when a filter is given.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use vecstore_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use vecstore_core::models::{CollectionSnapshot, Document, Metadata, ScoredDocument};
use vecstore_core::store::{check_add_lengths, top_k, StoreError, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn info(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM collection_info WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    pub async fn set_info(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collection_info (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_metadata(id: &str, json: &str) -> Result<Metadata> {
    serde_json::from_str(json).with_context(|| format!("Invalid metadata_json for chunk {}", id))
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn add(&self, documents: &[Document], vectors: &[Vec<f32>]) -> Result<Vec<String>> {
        check_add_lengths(documents, vectors)?;
        let now = chrono::Utc::now().timestamp();
        let mut ids = Vec::with_capacity(documents.len());

        let mut tx = self.pool.begin().await?;
        for (doc, vec) in documents.iter().zip(vectors) {
            let id = uuid::Uuid::new_v4().to_string();
            let metadata_json = serde_json::to_string(&doc.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, text, metadata_json, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(doc.source())
            .bind(&doc.page_content)
            .bind(&metadata_json)
            .bind(vec_to_blob(vec))
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to insert chunk")?;
            ids.push(id);
        }
        tx.commit().await?;

        Ok(ids)
    }

    async fn get(&self) -> Result<CollectionSnapshot> {
        let rows = sqlx::query("SELECT id, text, metadata_json FROM chunks ORDER BY rowid ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut snap = CollectionSnapshot::default();
        for row in &rows {
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata_json");
            snap.metadatas.push(parse_metadata(&id, &metadata_json)?);
            snap.ids.push(id);
            snap.documents.push(row.get("text"));
        }
        Ok(snap)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Err(StoreError::EmptyIds.into());
        }

        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM chunks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn nearest(
        &self,
        query_vec: &[f32],
        k: usize,
        source: Option<&str>,
    ) -> Result<Vec<ScoredDocument>> {
        let rows = match source {
            Some(source) => {
                sqlx::query(
                    "SELECT id, text, metadata_json, embedding FROM chunks WHERE source = ?",
                )
                .bind(source)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT id, text, metadata_json, embedding FROM chunks")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let candidates = rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                let blob: Vec<u8> = row.get("embedding");
                let embedding = blob_to_vec(&blob);
                let metadata_json: String = row.get("metadata_json");
                Ok(ScoredDocument {
                    score: cosine_similarity(query_vec, &embedding) as f64,
                    document: Document {
                        page_content: row.get("text"),
                        metadata: parse_metadata(&id, &metadata_json)?,
                    },
                    id,
                    embedding,
                })
            })
            .collect::<Result<Vec<ScoredDocument>>>()?;

        Ok(top_k(candidates, k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
