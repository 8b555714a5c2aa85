//! Terraform runner on top of the tool runner.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use ksi_core::ValidatorSettings;
use ksi_runner::{ToolInvocation, ToolRunner};

use crate::error::IacResult;

pub const INIT_ARGS: &[&str] = &["init", "-backend=false", "-input=false", "-no-color"];
pub const VALIDATE_ARGS: &[&str] = &["validate", "-no-color"];

/// Result of a Terraform command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerraformResult {
    pub success: bool,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub command: String,
}

impl TerraformResult {
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Terraform runner that executes commands through a [`ToolRunner`].
pub struct TerraformRunner {
    runner: Arc<dyn ToolRunner>,
    settings: ValidatorSettings,
}

impl TerraformRunner {
    /// Create a new Terraform runner with default binary and timeouts.
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            settings: ValidatorSettings::default(),
        }
    }

    /// Use binary and timeouts from settings.
    pub fn with_settings(mut self, settings: &ValidatorSettings) -> Self {
        self.settings = settings.clone();
        self
    }

    pub fn binary(&self) -> &str {
        &self.settings.binary
    }

    /// Command line as logged and recorded for the given arguments.
    pub fn command_line(&self, args: &[&str]) -> String {
        ToolInvocation::new(&self.settings.binary)
            .args(args.iter().copied())
            .command_line()
    }

    /// Detect the installed version.
    ///
    /// Returns `Ok(None)` when the binary runs but its output carries no
    /// recognisable version; runner failures propagate.
    pub async fn version(&self) -> IacResult<Option<String>> {
        info!("Detecting {} version", self.settings.binary);
        let timeout = self.settings.version_timeout_secs;

        let json = self.run_command(None, &["version", "-json"], timeout).await?;
        if json.success {
            if let Some(version) = parse_version(&json.stdout) {
                return Ok(Some(version));
            }
        }

        let plain = self.run_command(None, &["version"], timeout).await?;
        Ok(parse_version(&plain.stdout))
    }

    /// Run terraform init without a backend.
    pub async fn init(&self, working_dir: &Path) -> IacResult<TerraformResult> {
        info!("Running terraform init in {:?}", working_dir);
        self.run_command(Some(working_dir), INIT_ARGS, self.settings.init_timeout_secs)
            .await
    }

    /// Run terraform validate.
    pub async fn validate(&self, working_dir: &Path) -> IacResult<TerraformResult> {
        info!("Running terraform validate in {:?}", working_dir);
        self.run_command(Some(working_dir), VALIDATE_ARGS, self.settings.validate_timeout_secs)
            .await
    }

    async fn run_command(
        &self,
        working_dir: Option<&Path>,
        args: &[&str],
        timeout: u64,
    ) -> IacResult<TerraformResult> {
        let mut invocation = ToolInvocation::new(&self.settings.binary)
            .args(args.iter().copied())
            .timeout(timeout);
        if let Some(dir) = working_dir {
            invocation = invocation.workdir(dir);
        }

        let command = invocation.command_line();
        debug!("Executing {}", command);

        let result = self.runner.run(&invocation).await?;

        Ok(TerraformResult {
            success: result.success(),
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
            command,
        })
    }
}

/// Version from `terraform version -json` output, or from the
/// `Terraform vX.Y.Z` line of the plain output.
pub fn parse_version(output: &str) -> Option<String> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(output) {
        if let Some(version) = json.get("terraform_version").and_then(|v| v.as_str()) {
            return Some(version.to_string());
        }
    }

    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Terraform v"))
        .filter_map(|rest| rest.split_whitespace().next())
        .find(|v| v.starts_with(|c: char| c.is_ascii_digit()))
        .map(str::to_string)
}
