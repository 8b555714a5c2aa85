//! Fixed documents of an evidence pack and their paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ksi_core::{CriterionSet, ManifestTools, RunConfig, SCHEMA_VERSION};

pub const COLLECTED_AT: &str = "collected_at.json";
pub const SCOPE: &str = "scope.json";
pub const TOOLS: &str = "tools.json";
pub const DETECTION: &str = "declared/terraform_detection.json";
pub const INVENTORY: &str = "declared/terraform_inventory.json";
pub const VALIDATION: &str = "declared/terraform_validation.json";
pub const NETWORK_INVENTORY: &str = "declared/network_inventory.json";
pub const NETWORK_FINDINGS: &str = "declared/network_findings.json";
pub const EVALUATION_MANIFEST: &str = "evaluation_manifest.json";
pub const ARTIFACT_INDEX: &str = "manifest.json";
pub const HASHES: &str = "hashes.sha256";
/// Written next to the archives, not inside a pack
pub const RESULTS: &str = "results.json";

const MLA05_REQUIRED: &[&str] = &[COLLECTED_AT, SCOPE, TOOLS, DETECTION, INVENTORY];
const CNA01_REQUIRED: &[&str] = &[COLLECTED_AT, SCOPE, TOOLS, DETECTION, NETWORK_INVENTORY];

/// Files a provisional pack must contain before it can be finalized.
pub fn required_files(set: CriterionSet) -> &'static [&'static str] {
    match set {
        CriterionSet::Mla05 => MLA05_REQUIRED,
        CriterionSet::Cna01 => CNA01_REQUIRED,
    }
}

/// `collected_at.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedAt {
    pub schema_version: String,
    pub collected_at: DateTime<Utc>,
    pub timezone: String,
}

impl CollectedAt {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            collected_at: at,
            timezone: "UTC".to_string(),
        }
    }
}

/// `scope.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeDocument {
    pub schema_version: String,
    pub repository: Option<String>,
    pub commit_sha: Option<String>,
    pub criterion_set: CriterionSet,
    pub configuration_surfaces: Vec<String>,
    /// Root paths as configured, relative to the workspace
    pub root_paths: Vec<String>,
    /// Directories that actually contain declaration files
    pub surface_paths: Vec<String>,
    pub trigger_event: String,
    pub run_id: Option<String>,
    pub workflow: Option<String>,
}

impl ScopeDocument {
    pub fn new(config: &RunConfig, set: CriterionSet, surface_paths: &[String]) -> Self {
        let trigger = &config.trigger;
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            repository: trigger.repository.clone(),
            commit_sha: trigger.commit_sha.clone(),
            criterion_set: set,
            configuration_surfaces: vec!["TERRAFORM".to_string()],
            root_paths: config
                .root_paths
                .iter()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .collect(),
            surface_paths: surface_paths.to_vec(),
            trigger_event: trigger.event.as_str().to_string(),
            run_id: trigger.run_id.clone(),
            workflow: trigger.workflow.clone(),
        }
    }
}

/// `tools.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsDocument {
    pub schema_version: String,
    pub engine: String,
    pub engine_version: String,
    pub validator: String,
    /// Detected validator version; absent when the tool could not run
    pub tool_version: Option<String>,
    pub requested_version: Option<String>,
    /// `None` without a pin or without a detected version
    pub version_satisfied: Option<bool>,
}

impl ToolsDocument {
    pub fn new(validator: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            engine: "ksi".to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            validator: validator.into(),
            tool_version: None,
            requested_version: None,
            version_satisfied: None,
        }
    }

    pub fn with_tool_version(mut self, version: Option<String>) -> Self {
        self.tool_version = version;
        self
    }

    pub fn with_requested_version(mut self, pin: Option<String>) -> Self {
        self.requested_version = pin;
        self
    }

    pub fn with_version_satisfied(mut self, satisfied: Option<bool>) -> Self {
        self.version_satisfied = satisfied;
        self
    }

    /// Tool record embedded in the evaluation manifest.
    pub fn manifest_tools(&self) -> ManifestTools {
        ManifestTools {
            engine: self.engine.clone(),
            engine_version: self.engine_version.clone(),
            validator: self.validator.clone(),
            validator_version: self.tool_version.clone(),
        }
    }
}

/// One entry of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub description: String,
    pub schema_version: String,
}

/// `manifest.json`: index of the documents written before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub schema_version: String,
    pub criterion_set: CriterionSet,
    pub generated_at: DateTime<Utc>,
    pub repository: Option<String>,
    pub commit_sha: Option<String>,
    /// Sorted by path
    pub files: Vec<FileEntry>,
}
