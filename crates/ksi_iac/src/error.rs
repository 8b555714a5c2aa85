//! Error types for the IaC crate.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::hcl::SyntaxError;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur during detection, extraction or validation.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Invalid exclude pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Terraform not available: {0}")]
    TerraformNotAvailable(String),

    #[error("Runner error: {0}")]
    Runner(#[from] ksi_runner::RunnerError),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A declaration file that could not be parsed.
///
/// Recorded per file inside the inventory; never aborts a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn from_syntax(file: impl Into<String>, err: SyntaxError) -> Self {
        Self {
            file: file.into(),
            line: err.line,
            column: err.column,
            message: err.message,
        }
    }

    /// A file that was found but could not be read at all.
    pub fn unreadable(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: 0,
            column: 0,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}: {}", self.file, self.message)
        } else {
            write!(f, "{}:{}:{}: {}", self.file, self.line, self.column, self.message)
        }
    }
}
