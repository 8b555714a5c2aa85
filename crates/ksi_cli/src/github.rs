//! GitHub Actions step outputs.
//!
//! Outputs are appended to the file named by `GITHUB_OUTPUT` as
//! `key=value` lines; multi-line values use the heredoc form with a
//! random delimiter.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use ksi_core::CriterionSet;
use ksi_engine::RunReport;

/// Ordered set of step outputs for one run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GithubOutput {
    entries: Vec<(String, String)>,
}

impl GithubOutput {
    /// Outputs for every criterion set of the run.
    ///
    /// The configuration set uses bare keys; other sets are prefixed
    /// (`network_status`, `network_artifact_name`, ...).
    pub fn from_report(report: &RunReport) -> Self {
        let mut out = Self::default();
        for set in &report.sets {
            let prefix = match set.criterion_set {
                CriterionSet::Mla05 => "",
                CriterionSet::Cna01 => "network_",
            };
            out.push(format!("{}status", prefix), set.status.to_string());
            out.push(format!("{}artifact_name", prefix), set.archive_name.clone());
            out.push(
                format!("{}artifact_path", prefix),
                set.archive_path.display().to_string(),
            );
            out.push(format!("{}summary", prefix), set.summary.text.clone());
        }
        out.push("overall_status", report.status.to_string());
        out
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render in the `GITHUB_OUTPUT` file format.
    pub fn render(&self) -> String {
        let mut text = String::new();
        for (key, value) in &self.entries {
            if value.contains('\n') {
                let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());
                text.push_str(&format!("{}<<{}\n{}\n{}\n", key, delimiter, value, delimiter));
            } else {
                text.push_str(&format!("{}={}\n", key, value));
            }
        }
        text
    }

    /// Append to the outputs file, creating it if needed.
    pub fn append_to(&self, path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(self.render().as_bytes())?;
        file.flush()
    }
}
