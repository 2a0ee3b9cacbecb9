//! User-facing error taxonomy.
//!
//! Session operations return `anyhow::Result`; the failures a caller is
//! expected to act on are raised as [`VecstoreError`] so the CLI and the
//! HTTP server can recognise them with `downcast_ref` and report a stable
//! code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VecstoreError {
    #[error("Please enter a collection path")]
    MissingPath,

    #[error("Collection path must be absolute: {0}")]
    InvalidPath(String),

    #[error("Please choose a file")]
    NoFileChosen,

    #[error("Please create or load a collection first")]
    NoCollection,

    #[error("A file named '{0}' already exists in the collection")]
    DuplicateFile(String),

    #[error("No collection has been opened in this session")]
    NotInitialized,

    #[error("The selected file '{0}' is not in the collection")]
    FileNotFound(String),

    #[error("{0}")]
    InvalidRequest(String),
}

impl VecstoreError {
    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            VecstoreError::MissingPath => "missing_path",
            VecstoreError::InvalidPath(_) => "invalid_path",
            VecstoreError::NoFileChosen => "no_file_chosen",
            VecstoreError::NoCollection => "no_collection",
            VecstoreError::DuplicateFile(_) => "duplicate_file",
            VecstoreError::NotInitialized => "not_initialized",
            VecstoreError::FileNotFound(_) => "file_not_found",
            VecstoreError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Find a [`VecstoreError`] anywhere in an error's chain.
pub fn classify(err: &anyhow::Error) -> Option<&VecstoreError> {
    err.chain().find_map(|e| e.downcast_ref::<VecstoreError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn classify_sees_through_context() {
        let err: anyhow::Result<()> =
            Err(VecstoreError::DuplicateFile("a.txt".into())).context("while adding");
        let err = err.unwrap_err();
        assert_eq!(classify(&err).map(|e| e.code()), Some("duplicate_file"));
    }

    #[test]
    fn plain_errors_are_unclassified() {
        let err = anyhow::anyhow!("disk on fire");
        assert!(classify(&err).is_none());
    }
}
