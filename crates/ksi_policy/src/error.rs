//! Error types for the policy crate.

use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors that can occur while looking up criteria.
///
/// A criterion that fails is not an error; it is a FAIL outcome.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Unknown criterion: {0}")]
    UnknownCriterion(String),
}
