//! Rendering a manifest into a terminal check state.

use serde::{Deserialize, Serialize};

use crate::manifest::EvaluationManifest;
use crate::outcome::Outcome;

/// Terminal check state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckConclusion {
    Success,
    Failure,
    Error,
}

impl From<Outcome> for CheckConclusion {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Pass => Self::Success,
            Outcome::Fail => Self::Failure,
            Outcome::Error => Self::Error,
        }
    }
}

impl CheckConclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }
}

fn icon(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Pass => "✅",
        Outcome::Fail => "❌",
        Outcome::Error => "⚠️",
    }
}

/// Check-run content derived from the manifest alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRunSummary {
    pub conclusion: CheckConclusion,
    pub title: String,
    /// One-line summary
    pub summary: String,
    /// Markdown detail text with every criterion rationale
    pub text: String,
}

impl CheckRunSummary {
    pub fn from_manifest(manifest: &EvaluationManifest) -> Self {
        let set = manifest.criterion_set;
        let counts = manifest.counts();
        let title = format!("{}: {}", set.label(), manifest.status);
        let summary = format!(
            "{} {} {} ({} passed, {} failed, {} errored)",
            icon(manifest.status),
            set.title(),
            manifest.status,
            counts.pass,
            counts.fail,
            counts.error
        );

        let mut text = String::new();
        text.push_str(&format!("## {} {}\n\n", set.label(), set.title()));
        text.push_str(&format!("> {}\n\n", set.requirement()));
        text.push_str("| Criterion | Outcome | Rationale |\n");
        text.push_str("|-----------|---------|-----------|\n");
        for criterion in &manifest.criteria {
            let label = if criterion.advisory {
                format!("{} {} (advisory)", criterion.id, criterion.name)
            } else {
                format!("{} {}", criterion.id, criterion.name)
            };
            text.push_str(&format!(
                "| {} | {} {} | {} |\n",
                label,
                icon(criterion.outcome),
                criterion.outcome,
                table_cell(&criterion.rationale)
            ));
        }

        if let Some(sha) = &manifest.scope.commit_sha {
            text.push_str(&format!("\nCommit: `{}`", sha));
        }
        text.push_str(&format!("\nGenerated: {}\n", manifest.generated_at.to_rfc3339()));

        Self {
            conclusion: manifest.status.into(),
            title,
            summary,
            text,
        }
    }
}

// Markdown tables cannot hold raw newlines or pipes.
fn table_cell(text: &str) -> String {
    let first_lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).take(5).collect();
    first_lines.join("<br>").replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::CriterionSet;
    use crate::outcome::CriterionResult;
    use chrono::Utc;

    #[test]
    fn test_conclusion_mapping() {
        assert_eq!(CheckConclusion::from(Outcome::Pass), CheckConclusion::Success);
        assert_eq!(CheckConclusion::from(Outcome::Fail), CheckConclusion::Failure);
        assert_eq!(CheckConclusion::from(Outcome::Error), CheckConclusion::Error);
    }

    #[test]
    fn test_summary_renders_every_rationale() {
        let manifest = EvaluationManifest::new(
            CriterionSet::Mla05,
            vec![
                CriterionResult::pass("MLA05-A", "Configuration Surface in Scope", "Found 3 files"),
                CriterionResult::fail(
                    "MLA05-B",
                    "Machine-Based Evaluation Performed",
                    "validate failed:\nError: Missing | required argument",
                ),
            ],
            Utc::now(),
        );

        let summary = CheckRunSummary::from_manifest(&manifest);
        assert_eq!(summary.conclusion, CheckConclusion::Failure);
        assert_eq!(summary.title, "KSI-MLA-05: FAIL");
        assert!(summary.summary.contains("1 passed, 1 failed, 0 errored"));
        assert!(summary.text.contains("Found 3 files"));
        assert!(summary.text.contains("Missing \\| required argument"));
        assert!(summary.text.contains("validate failed:<br>Error"));
    }
}
