//! Criterion outcomes and their precedence.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Outcome of a criterion or of a whole evaluation.
///
/// Ordering follows precedence: `Pass < Fail < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        }
    }

    /// Combine two outcomes; the higher-precedence one wins.
    pub fn combine(self, other: Outcome) -> Outcome {
        self.max(other)
    }

    /// Reduce any number of outcomes. An empty input is PASS.
    ///
    /// The result does not depend on iteration order, so outcomes collected
    /// from concurrently evaluated criteria reduce to the same status.
    pub fn reduce<I>(outcomes: I) -> Outcome
    where
        I: IntoIterator<Item = Outcome>,
    {
        outcomes.into_iter().fold(Outcome::Pass, Outcome::combine)
    }

    pub fn is_pass(&self) -> bool {
        *self == Self::Pass
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PASS" => Ok(Self::Pass),
            "FAIL" => Ok(Self::Fail),
            "ERROR" => Ok(Self::Error),
            other => Err(CoreError::InvalidConfig(format!("unknown outcome: {}", other))),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Result of evaluating one named criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    /// Criterion ID (e.g. `MLA05-B`)
    pub id: String,
    /// Human label
    pub name: String,
    /// PASS / FAIL / ERROR
    pub outcome: Outcome,
    /// Why the outcome was reached
    pub rationale: String,
    /// Structured evidence, e.g. violating resource identifiers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<serde_json::Value>,
    /// Reported alongside the set but excluded from its overall status
    #[serde(default, skip_serializing_if = "is_false")]
    pub advisory: bool,
}

impl CriterionResult {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        outcome: Outcome,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            outcome,
            rationale: rationale.into(),
            evidence: None,
            advisory: false,
        }
    }

    /// Create a passing result.
    pub fn pass(id: impl Into<String>, name: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self::new(id, name, Outcome::Pass, rationale)
    }

    /// Create a failing result.
    pub fn fail(id: impl Into<String>, name: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self::new(id, name, Outcome::Fail, rationale)
    }

    /// Create an error result (tooling or parse failure).
    pub fn error(id: impl Into<String>, name: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self::new(id, name, Outcome::Error, rationale)
    }

    /// Attach structured evidence.
    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Mark the result as advisory.
    pub fn advisory(mut self) -> Self {
        self.advisory = true;
        self
    }
}

/// Per-outcome criterion counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
}

impl OutcomeCounts {
    pub fn tally<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a CriterionResult>,
    {
        let mut counts = Self::default();
        for result in results {
            match result.outcome {
                Outcome::Pass => counts.pass += 1,
                Outcome::Fail => counts.fail += 1,
                Outcome::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pass + self.fail + self.error
    }
}
