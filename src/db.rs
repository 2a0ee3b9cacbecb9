//! SQLite connection management for a collection directory.
//!
//! Each collection is a directory holding one database file,
//! [`DB_FILE_NAME`]. The directory and file are created on first open.
//! WAL mode lets the server read while an ingest is writing.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

/// Database file inside a collection directory.
pub const DB_FILE_NAME: &str = "vecstore.sqlite3";

pub fn db_path(collection_dir: &Path) -> PathBuf {
    collection_dir.join(DB_FILE_NAME)
}

/// Open (creating if needed) the database for `collection_dir`.
pub async fn connect(collection_dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(collection_dir).with_context(|| {
        format!(
            "Failed to create collection directory: {}",
            collection_dir.display()
        )
    })?;

    let options = SqliteConnectOptions::new()
        .filename(db_path(collection_dir))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open collection at {}", collection_dir.display()))?;

    Ok(pool)
}
