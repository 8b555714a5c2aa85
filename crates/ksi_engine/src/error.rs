//! Error types for the engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures that abort a run.
///
/// Everything else a run can run into (missing files, malformed
/// declarations, an unusable validator) ends up as a criterion outcome.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Detection failed: {0}")]
    Detection(#[from] ksi_iac::IacError),

    #[error("Evidence pack failed: {0}")]
    Evidence(#[from] ksi_evidence::EvidenceError),
}

impl EngineError {
    /// Whether no complete evidence pack could be written.
    pub fn is_evidence_failure(&self) -> bool {
        matches!(self, Self::Evidence(_))
    }
}
