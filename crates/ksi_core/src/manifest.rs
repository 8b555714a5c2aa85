//! The evaluation manifest: the canonical verdict of a run.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criterion::CriterionSet;
use crate::outcome::{CriterionResult, Outcome, OutcomeCounts};

/// Schema version written into every evidence document.
pub const SCHEMA_VERSION: &str = "1.0";

/// Scope the verdict applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestScope {
    pub repository: Option<String>,
    pub commit_sha: Option<String>,
    pub root_paths: Vec<PathBuf>,
    pub trigger_event: String,
}

/// Tool versions the verdict was produced with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestTools {
    pub engine: String,
    pub engine_version: String,
    pub validator: String,
    pub validator_version: Option<String>,
}

/// Overall status plus every criterion result of one criterion set.
///
/// Self-sufficient for rendering a terminal check state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationManifest {
    pub schema_version: String,
    pub criterion_set: CriterionSet,
    /// Derived from the non-advisory criteria; see [`Outcome::reduce`]
    pub status: Outcome,
    pub criteria: Vec<CriterionResult>,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: ManifestScope,
    #[serde(default)]
    pub tools: ManifestTools,
}

impl EvaluationManifest {
    /// Build a manifest; the status is derived here and nowhere else.
    pub fn new(
        criterion_set: CriterionSet,
        criteria: Vec<CriterionResult>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let status = Self::derive_status(&criteria);
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            criterion_set,
            status,
            criteria,
            generated_at,
            scope: ManifestScope::default(),
            tools: ManifestTools::default(),
        }
    }

    pub fn with_scope(mut self, scope: ManifestScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_tools(mut self, tools: ManifestTools) -> Self {
        self.tools = tools;
        self
    }

    /// ERROR > FAIL > PASS over criteria that count toward the status.
    pub fn derive_status(criteria: &[CriterionResult]) -> Outcome {
        Outcome::reduce(criteria.iter().filter(|c| !c.advisory).map(|c| c.outcome))
    }

    pub fn criterion(&self, id: &str) -> Option<&CriterionResult> {
        self.criteria.iter().find(|c| c.id == id)
    }

    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts::tally(self.criteria.iter().filter(|c| !c.advisory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_precedence() {
        let now = Utc::now();

        let all_pass = EvaluationManifest::new(
            CriterionSet::Mla05,
            vec![
                CriterionResult::pass("A", "a", ""),
                CriterionResult::pass("B", "b", ""),
            ],
            now,
        );
        assert_eq!(all_pass.status, Outcome::Pass);

        let one_fail = EvaluationManifest::new(
            CriterionSet::Mla05,
            vec![
                CriterionResult::pass("A", "a", ""),
                CriterionResult::fail("B", "b", ""),
            ],
            now,
        );
        assert_eq!(one_fail.status, Outcome::Fail);

        let fail_and_error = EvaluationManifest::new(
            CriterionSet::Mla05,
            vec![
                CriterionResult::fail("A", "a", ""),
                CriterionResult::pass("B", "b", ""),
                CriterionResult::error("C", "c", ""),
                CriterionResult::pass("D", "d", ""),
            ],
            now,
        );
        assert_eq!(fail_and_error.status, Outcome::Error);
    }

    #[test]
    fn test_advisory_criteria_do_not_affect_status() {
        let manifest = EvaluationManifest::new(
            CriterionSet::Mla05,
            vec![
                CriterionResult::pass("A", "a", ""),
                CriterionResult::fail("N", "network", "3 violations").advisory(),
            ],
            Utc::now(),
        );
        assert_eq!(manifest.status, Outcome::Pass);
        assert_eq!(manifest.counts().total(), 1);
        assert_eq!(manifest.criterion("N").map(|c| c.outcome), Some(Outcome::Fail));
    }

    #[test]
    fn test_manifest_json_shape() {
        let manifest = EvaluationManifest::new(
            CriterionSet::Mla05,
            vec![CriterionResult::fail("MLA05-C", "Persistent Cycle Configured", "push trigger")],
            Utc::now(),
        );
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["status"], "FAIL");
        assert_eq!(json["criterion_set"], "ksi-mla-05");
        assert_eq!(json["criteria"][0]["id"], "MLA05-C");
        assert_eq!(json["criteria"][0]["outcome"], "FAIL");
        assert!(json["generated_at"].is_string());

        let back: EvaluationManifest = serde_json::from_value(json).unwrap();
        assert_eq!(back.status, Outcome::Fail);
    }
}
