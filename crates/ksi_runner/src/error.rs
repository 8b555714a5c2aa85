//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while running an external tool.
///
/// None of these represent a tool's verdict. A tool that runs and exits
/// non-zero is a successful execution with a non-zero [`exit_code`].
///
/// [`exit_code`]: crate::ExecutionResult::exit_code
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool is not executable: {0}")]
    NotExecutable(String),

    #[error("Tool timed out after {0} seconds")]
    Timeout(u64),

    #[error("Failed to spawn tool: {0}")]
    SpawnFailed(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Short machine-readable label used in evidence documents.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotExecutable(_) => "not_executable",
            Self::Timeout(_) => "timeout",
            Self::SpawnFailed(_) => "spawn_failed",
            Self::ExecutionFailed(_) => "execution_failed",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(RunnerError::NotFound("terraform".into()).kind(), "not_found");
        assert_eq!(RunnerError::Timeout(5).kind(), "timeout");
        assert_eq!(
            RunnerError::Timeout(120).to_string(),
            "Tool timed out after 120 seconds"
        );
    }
}
