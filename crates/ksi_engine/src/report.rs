//! What a run hands back to its caller.

use std::path::PathBuf;

use serde::Serialize;

use ksi_core::{CheckRunSummary, CriterionSet, EvaluationManifest, Outcome};
use ksi_evidence::EvidencePack;

/// Result for one criterion set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetReport {
    pub criterion_set: CriterionSet,
    pub status: Outcome,
    pub archive_name: String,
    pub archive_path: PathBuf,
    pub summary: CheckRunSummary,
    pub manifest: EvaluationManifest,
}

impl SetReport {
    pub fn new(pack: &EvidencePack, manifest: EvaluationManifest) -> Self {
        Self {
            criterion_set: pack.criterion_set,
            status: manifest.status,
            archive_name: pack.archive_name.clone(),
            archive_path: pack.archive_path.clone(),
            summary: CheckRunSummary::from_manifest(&manifest),
            manifest,
        }
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// ERROR > FAIL > PASS across every set
    pub status: Outcome,
    pub sets: Vec<SetReport>,
    pub results_path: PathBuf,
}

impl RunReport {
    pub fn new(sets: Vec<SetReport>, results_path: PathBuf) -> Self {
        Self {
            status: Outcome::reduce(sets.iter().map(|s| s.status)),
            sets,
            results_path,
        }
    }

    pub fn set(&self, set: CriterionSet) -> Option<&SetReport> {
        self.sets.iter().find(|s| s.criterion_set == set)
    }

    /// Short plain-text summary, one line per set.
    pub fn summary_text(&self) -> String {
        self.sets
            .iter()
            .map(|s| format!("{} {}: {} ({})", s.criterion_set.label(), s.status, s.summary.summary, s.archive_name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
