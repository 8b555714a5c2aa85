//! Evaluate command - run the pipeline and build evidence packs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use ksi_core::{EngineSettings, Outcome, RunConfig, TriggerContext, TriggerKind};
use ksi_engine::{Engine, RunReport};
use ksi_runner::ProcessRunner;

use super::OutputFormat;
use crate::github::GithubOutput;
use crate::ExitCodes;

#[derive(Args)]
pub struct EvaluateArgs {
    /// Comma-separated paths to scan, relative to the workspace
    #[arg(long, env = "INPUT_ROOT_PATHS", default_value = ".")]
    pub root_paths: String,

    /// Repository checkout (defaults to the current directory)
    #[arg(long, env = "GITHUB_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Where evidence packs are written (defaults to <workspace>/ksi-evidence)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Expected Terraform version; recorded, never enforced
    #[arg(long, env = "INPUT_TERRAFORM_VERSION")]
    pub terraform_version: Option<String>,

    /// Trigger event: schedule, workflow_dispatch, push, ...
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    pub event: Option<String>,

    /// Commit SHA being evaluated
    #[arg(long, env = "GITHUB_SHA")]
    pub sha: Option<String>,

    /// Repository in owner/name form
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    #[arg(long, env = "GITHUB_RUN_ID")]
    pub run_id: Option<String>,

    #[arg(long, env = "GITHUB_WORKFLOW")]
    pub workflow: Option<String>,

    /// Engine settings file (YAML)
    #[arg(short, long, env = "KSI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip the network isolation criterion set
    #[arg(long)]
    pub no_network: bool,

    /// Exit non-zero on a FAIL or ERROR verdict
    #[arg(long)]
    pub strict: bool,

    /// GitHub Actions output file
    #[arg(long, env = "GITHUB_OUTPUT")]
    pub github_output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl EvaluateArgs {
    fn run_config(&self) -> Result<RunConfig> {
        let workspace = match &self.workspace {
            Some(path) => path.clone(),
            None => std::env::current_dir().context("Cannot determine the current directory")?,
        };

        let mut settings = match &self.config {
            Some(path) => EngineSettings::from_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => EngineSettings::default(),
        };
        if self.no_network {
            settings.network.enabled = false;
        }

        let mut trigger = TriggerContext::new(TriggerKind::parse_event(self.event.as_deref().unwrap_or_default()));
        trigger.repository = self.repository.clone();
        trigger.commit_sha = self.sha.clone();
        trigger.run_id = self.run_id.clone();
        trigger.workflow = self.workflow.clone();

        let mut config = RunConfig::new(&workspace)
            .with_root_paths_csv(&self.root_paths)
            .with_trigger(trigger)
            .with_settings(settings);
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir);
        }
        if let Some(version) = &self.terraform_version {
            config = config.with_tool_version_pin(version);
        }
        Ok(config)
    }
}

pub async fn execute(args: EvaluateArgs) -> Result<u8> {
    let config = args.run_config()?;
    info!("Evaluating {:?} (roots: {})", config.workspace, args.root_paths);

    let report = Engine::new(Arc::new(ProcessRunner::new()))
        .run(&config)
        .await
        .context("Evaluation failed")?;

    match args.format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if let Some(path) = &args.github_output {
        GithubOutput::from_report(&report)
            .append_to(path)
            .with_context(|| format!("Failed to write GitHub outputs to {}", path.display()))?;
    }

    Ok(exit_code(report.status, args.strict))
}

fn exit_code(status: Outcome, strict: bool) -> u8 {
    match (strict, status) {
        (true, Outcome::Fail) => ExitCodes::VERDICT_FAIL,
        (true, Outcome::Error) => ExitCodes::VERDICT_ERROR,
        _ => ExitCodes::SUCCESS,
    }
}

fn print_report(report: &RunReport) {
    for set in &report.sets {
        println!("{}", set.summary.summary);
        for criterion in &set.manifest.criteria {
            let marker = match criterion.outcome {
                Outcome::Pass => "✅",
                Outcome::Fail => "❌",
                Outcome::Error => "⚠️ ",
            };
            let advisory = if criterion.advisory { " (advisory)" } else { "" };
            println!("   {} {} {}{}", marker, criterion.id, criterion.name, advisory);
        }
        println!("   📦 {}", set.archive_path.display());
        println!();
    }
    println!("Overall: {}", report.status);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> EvaluateArgs {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: EvaluateArgs,
        }

        let mut argv = vec!["evaluate"];
        argv.extend_from_slice(extra);
        Wrapper::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_run_config_from_flags() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().to_str().unwrap();
        let config = args(&[
            "--workspace",
            workspace,
            "--root-paths",
            "infra, ,network",
            "--event",
            "schedule",
            "--sha",
            "abcdef1234567",
            "--terraform-version",
            "v1.6.0",
            "--no-network",
        ])
        .run_config()
        .unwrap();

        assert_eq!(config.root_paths, vec![PathBuf::from("infra"), PathBuf::from("network")]);
        assert_eq!(config.trigger.event, TriggerKind::Schedule);
        assert_eq!(config.trigger.short_sha(), "abcdef1");
        assert_eq!(config.tool_version_pin.as_deref(), Some("1.6.0"));
        assert!(!config.settings.network.enabled);
        assert_eq!(config.output_dir, dir.path().join("ksi-evidence"));
    }

    #[test]
    fn test_missing_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = args(&[
            "--workspace",
            dir.path().to_str().unwrap(),
            "--config",
            dir.path().join("absent.yaml").to_str().unwrap(),
        ])
        .run_config();
        assert!(result.is_err());
    }

    #[test]
    fn test_strict_exit_codes() {
        assert_eq!(exit_code(Outcome::Fail, false), ExitCodes::SUCCESS);
        assert_eq!(exit_code(Outcome::Pass, true), ExitCodes::SUCCESS);
        assert_eq!(exit_code(Outcome::Fail, true), ExitCodes::VERDICT_FAIL);
        assert_eq!(exit_code(Outcome::Error, true), ExitCodes::VERDICT_ERROR);
    }
}
