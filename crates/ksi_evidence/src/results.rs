//! `results.json`: one line per criterion set for downstream consumers.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ksi_core::{CriterionSet, Outcome, OutcomeCounts, SCHEMA_VERSION};

use crate::documents::RESULTS;
use crate::error::{EvidenceError, EvidenceResult};
use crate::pack::EvidencePack;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionSetResult {
    pub criterion_set: CriterionSet,
    pub status: Outcome,
    pub archive_name: String,
    pub archive_path: PathBuf,
    pub criteria_summary: OutcomeCounts,
    pub summary: String,
}

impl CriterionSetResult {
    pub fn from_pack(pack: &EvidencePack) -> Self {
        let set = pack.criterion_set;
        let summary = match pack.status {
            Outcome::Pass => format!("All {} criteria passed.", set.label()),
            Outcome::Fail => format!("{} evaluation failed. Review criteria results for details.", set.label()),
            Outcome::Error => format!(
                "{} evaluation encountered errors. Unable to determine compliance status.",
                set.label()
            ),
        };
        Self {
            criterion_set: set,
            status: pack.status,
            archive_name: pack.archive_name.clone(),
            archive_path: pack.archive_path.clone(),
            criteria_summary: pack.counts,
            summary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    /// ERROR > FAIL > PASS across every set
    pub overall_status: Outcome,
    pub criterion_sets: Vec<CriterionSetResult>,
}

impl ResultsSummary {
    pub fn from_packs(generated_at: DateTime<Utc>, packs: &[EvidencePack]) -> Self {
        let criterion_sets: Vec<CriterionSetResult> = packs.iter().map(CriterionSetResult::from_pack).collect();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at,
            overall_status: Outcome::reduce(criterion_sets.iter().map(|s| s.status)),
            criterion_sets,
        }
    }

    pub fn set(&self, set: CriterionSet) -> Option<&CriterionSetResult> {
        self.criterion_sets.iter().find(|s| s.criterion_set == set)
    }

    /// Write `results.json` into `output_dir`.
    pub fn write(&self, output_dir: &Path) -> EvidenceResult<PathBuf> {
        let path = output_dir.join(RESULTS);
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        fs::write(&path, content).map_err(|e| EvidenceError::io(&path, e))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> EvidenceResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| EvidenceError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}
