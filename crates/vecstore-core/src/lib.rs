//! # vecstore core
//!
//! Runtime-agnostic building blocks for vecstore: the document model,
//! paragraph chunker, filename bookkeeping over stored `source` metadata,
//! the [`store::VectorStore`], [`embedding::Embedder`] and
//! [`chat::ChatModel`] traits, maximal-marginal-relevance retrieval and
//! the retrieval QA chains.
//!
//! This crate contains no tokio, sqlx, HTTP or filesystem I/O. Concrete
//! stores and providers live in the `vecstore` application crate.

pub mod chain;
pub mod chat;
pub mod chunk;
pub mod embedding;
pub mod files;
pub mod models;
pub mod retriever;
pub mod store;
