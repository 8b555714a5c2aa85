//! Error types for the evidence crate.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for evidence operations.
pub type EvidenceResult<T> = Result<T, EvidenceError>;

/// Failures while writing or reading an evidence pack.
///
/// Unlike every other failure in a run, these are fatal: a pack that could
/// not be written completely must not be published.
#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("Staging directory already exists: {0}")]
    StagingExists(PathBuf),

    #[error("Invalid document path '{0}': must be relative and stay inside the pack")]
    InvalidPath(String),

    #[error("Document already written: {0}")]
    DuplicateDocument(String),

    #[error("Manifest is for {found}, pack is for {expected}")]
    SetMismatch { expected: String, found: String },

    #[error("Collection timestamp cannot be stored in an archive: {0}")]
    Timestamp(String),

    #[error("Not an evidence pack (no hashes.sha256): {0}")]
    NotAPack(PathBuf),

    #[error("Malformed hash listing at line {line}: {message}")]
    InvalidListing { line: usize, message: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl EvidenceError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
