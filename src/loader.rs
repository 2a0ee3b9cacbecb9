//! Load a file from disk into chunk documents ready for ingestion.

use anyhow::{bail, Context, Result};
use std::path::Path;

use vecstore_core::chunk::split_text;
use vecstore_core::models::Document;

use crate::config::ChunkingConfig;
use crate::extract::{extract_text, FileKind};

/// Read `path`, extract its text and split it into chunks whose
/// `metadata.source` is the path as given.
pub fn load_file(path: &Path, chunking: &ChunkingConfig) -> Result<Vec<Document>> {
    if !path.is_file() {
        bail!("File does not exist: {}", path.display());
    }

    let kind = FileKind::from_path(path)?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = extract_text(&bytes, kind)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;

    let source = path.to_string_lossy();
    let docs = split_text(&source, &text, chunking.max_tokens);
    if docs.is_empty() {
        bail!("No text found in {}", path.display());
    }

    tracing::debug!("loaded {} chunks from {}", docs.len(), path.display());
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_carry_the_file_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.md");
        std::fs::write(&path, "# Title\n\nFirst paragraph.\n\nSecond paragraph.").unwrap();

        let docs = load_file(&path, &ChunkingConfig { max_tokens: 5 }).unwrap();
        assert!(docs.len() > 1);
        let expected = path.to_string_lossy();
        assert!(docs.iter().all(|d| d.source() == Some(expected.as_ref())));
    }

    #[test]
    fn empty_and_missing_files_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let empty = tmp.path().join("empty.txt");
        std::fs::write(&empty, "   \n\n ").unwrap();
        assert!(load_file(&empty, &ChunkingConfig::default()).is_err());
        assert!(load_file(&tmp.path().join("nope.txt"), &ChunkingConfig::default()).is_err());
    }
}
