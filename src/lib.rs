//! # vecstore
//!
//! Chat with a persisted collection of your documents. Files are extracted,
//! split into chunks and embedded into a per-directory SQLite collection,
//! keyed by file name; questions are answered by a retrieval chain over the
//! collection (optionally one file of it) or, with no collection, by the
//! chat model alone.
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────┐
//! │ CLI/HTTP │──▶│  Session  │──▶│  Collection  │── SQLite (chunks + vectors)
//! └──────────┘   └─────┬─────┘   └──────────────┘
//!                      ▼
//!              Embedder / ChatModel (OpenAI, Azure, Ollama, fastembed)
//! ```
//!
//! Runtime-agnostic pieces (models, chunker, retriever, chains) live in
//! `vecstore-core`.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | User-facing error taxonomy |
//! | [`session`] | Collection lifecycle, ingestion, deletion, question routing |
//! | [`collection`] | An open collection bound to an embedder |
//! | [`sqlite_store`] | SQLite `VectorStore` |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat-completion providers |
//! | [`loader`] | File to chunks |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`progress`] | Progress reporting |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema |

pub mod collection;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod http;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod progress;
pub mod server;
pub mod session;
pub mod sqlite_store;
