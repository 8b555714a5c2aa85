//! Run context: trigger metadata and the immutable run configuration.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::criterion::CriterionSet;
use crate::settings::EngineSettings;

/// Kind of event that started the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerKind {
    Schedule,
    WorkflowDispatch,
    Push,
    Other(String),
}

impl TriggerKind {
    /// Classify a CI event name; anything unrecognised is kept as `Other`.
    pub fn parse_event(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "schedule" => Self::Schedule,
            "workflow_dispatch" => Self::WorkflowDispatch,
            "push" => Self::Push,
            "" => Self::Other("unknown".to_string()),
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Schedule => "schedule",
            Self::WorkflowDispatch => "workflow_dispatch",
            Self::Push => "push",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Whether the trigger is a recurring, schedule-driven cycle.
    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Schedule)
    }
}

impl Default for TriggerKind {
    fn default() -> Self {
        Self::Other("unknown".to_string())
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_event(s))
    }
}

impl From<String> for TriggerKind {
    fn from(s: String) -> Self {
        Self::parse_event(&s)
    }
}

impl From<TriggerKind> for String {
    fn from(kind: TriggerKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Metadata about what started the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerContext {
    pub event: TriggerKind,
    pub repository: Option<String>,
    pub commit_sha: Option<String>,
    pub run_id: Option<String>,
    pub workflow: Option<String>,
}

impl TriggerContext {
    pub fn new(event: TriggerKind) -> Self {
        Self {
            event,
            ..Default::default()
        }
    }

    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn commit_sha(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = Some(workflow.into());
        self
    }

    /// First seven characters of the commit SHA, or `unknown`.
    ///
    /// Only ASCII alphanumerics are kept so the value is safe in file names.
    pub fn short_sha(&self) -> String {
        let short: String = self
            .commit_sha
            .as_deref()
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(7)
            .collect();
        if short.is_empty() {
            "unknown".to_string()
        } else {
            short.to_lowercase()
        }
    }
}

/// Immutable configuration for one run.
///
/// Built once and passed by reference to every pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory the root paths are relative to
    pub workspace: PathBuf,
    /// Paths to scan for declaration files
    pub root_paths: Vec<PathBuf>,
    /// Where evidence packs are written
    pub output_dir: PathBuf,
    /// Requested validator version, recorded in tools.json
    pub tool_version_pin: Option<String>,
    pub trigger: TriggerContext,
    /// Collection timestamp, whole seconds
    pub collected_at: DateTime<Utc>,
    pub settings: EngineSettings,
}

impl RunConfig {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            output_dir: workspace.join("ksi-evidence"),
            workspace,
            root_paths: vec![PathBuf::from(".")],
            tool_version_pin: None,
            trigger: TriggerContext::default(),
            collected_at: Utc::now().trunc_subsecs(0),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_root_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.root_paths = paths.into_iter().map(Into::into).collect();
        if self.root_paths.is_empty() {
            self.root_paths.push(PathBuf::from("."));
        }
        self
    }

    /// Parse a comma-separated root path list; blank entries are ignored.
    pub fn with_root_paths_csv(self, csv: &str) -> Self {
        let paths: Vec<PathBuf> = csv
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect();
        self.with_root_paths(paths)
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_tool_version_pin(mut self, pin: impl Into<String>) -> Self {
        let pin = pin.into();
        let pin = pin.trim().trim_start_matches('v').to_string();
        self.tool_version_pin = if pin.is_empty() || pin == "latest" {
            None
        } else {
            Some(pin)
        };
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerContext) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_collected_at(mut self, at: DateTime<Utc>) -> Self {
        self.collected_at = at.trunc_subsecs(0);
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Root paths resolved against the workspace.
    pub fn resolved_roots(&self) -> Vec<PathBuf> {
        self.root_paths
            .iter()
            .map(|p| resolve(&self.workspace, p))
            .collect()
    }

    /// Criterion sets this run produces packs for.
    pub fn criterion_sets(&self) -> Vec<CriterionSet> {
        let mut sets = vec![CriterionSet::Mla05];
        if self.settings.network.enabled {
            sets.push(CriterionSet::Cna01);
        }
        sets
    }

    /// Collection timestamp in the compact archive-name form.
    pub fn timestamp_slug(&self) -> String {
        self.collected_at.format("%Y%m%dT%H%M%SZ").to_string()
    }
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else if path == Path::new(".") {
        workspace.to_path_buf()
    } else {
        workspace.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trigger_kind_parsing() {
        assert_eq!(TriggerKind::parse_event("schedule"), TriggerKind::Schedule);
        assert_eq!(TriggerKind::parse_event("WORKFLOW_DISPATCH"), TriggerKind::WorkflowDispatch);
        assert_eq!(
            TriggerKind::parse_event("pull_request"),
            TriggerKind::Other("pull_request".to_string())
        );
        assert_eq!("push".parse::<TriggerKind>(), Ok(TriggerKind::Push));
        assert_eq!(
            "".parse::<TriggerKind>(),
            Ok(TriggerKind::Other("unknown".to_string()))
        );
        assert!(TriggerKind::Schedule.is_recurring());
        assert!(!TriggerKind::Push.is_recurring());
        assert!(!TriggerKind::WorkflowDispatch.is_recurring());
    }

    #[test]
    fn test_trigger_kind_serializes_as_string() {
        let ctx = TriggerContext::new(TriggerKind::WorkflowDispatch).commit_sha("abc");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["event"], "workflow_dispatch");
        let back: TriggerContext = serde_json::from_value(json).unwrap();
        assert_eq!(back.event, TriggerKind::WorkflowDispatch);
    }

    #[test]
    fn test_short_sha() {
        let ctx = TriggerContext::new(TriggerKind::Push).commit_sha("ABCDEF1234567890");
        assert_eq!(ctx.short_sha(), "abcdef1");
        assert_eq!(TriggerContext::default().short_sha(), "unknown");
        let hostile = TriggerContext::default().commit_sha("../../x");
        assert_eq!(hostile.short_sha(), "x");
    }

    #[test]
    fn test_root_paths_csv() {
        let config = RunConfig::new("/repo").with_root_paths_csv(" infra , modules/net,, ");
        assert_eq!(
            config.root_paths,
            vec![PathBuf::from("infra"), PathBuf::from("modules/net")]
        );
        assert_eq!(
            config.resolved_roots(),
            vec![PathBuf::from("/repo/infra"), PathBuf::from("/repo/modules/net")]
        );

        let empty = RunConfig::new("/repo").with_root_paths_csv("");
        assert_eq!(empty.resolved_roots(), vec![PathBuf::from("/repo")]);
    }

    #[test]
    fn test_version_pin_normalization() {
        let config = RunConfig::new("/repo").with_tool_version_pin("v1.6.0");
        assert_eq!(config.tool_version_pin.as_deref(), Some("1.6.0"));
        let latest = RunConfig::new("/repo").with_tool_version_pin("latest");
        assert!(latest.tool_version_pin.is_none());
    }

    #[test]
    fn test_timestamp_slug_and_sets() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let config = RunConfig::new("/repo").with_collected_at(at);
        assert_eq!(config.timestamp_slug(), "20240305T070809Z");
        assert_eq!(
            config.criterion_sets(),
            vec![CriterionSet::Mla05, CriterionSet::Cna01]
        );

        let mut settings = EngineSettings::default();
        settings.network.enabled = false;
        let config = config.with_settings(settings);
        assert_eq!(config.criterion_sets(), vec![CriterionSet::Mla05]);
    }
}
