//! External validation orchestration.
//!
//! Runs `terraform init` then `terraform validate` in every validation root.
//! A step that ran and exited non-zero is a legitimate negative result; a
//! step that could not run (missing binary, timeout) is a tooling failure.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use ksi_core::{RunConfig, SCHEMA_VERSION};
use ksi_runner::ToolRunner;

use crate::detect::DetectionResult;
use crate::error::{IacError, IacResult};
use crate::terraform::{TerraformResult, TerraformRunner, INIT_ARGS, VALIDATE_ARGS};

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed {
        exit_code: i64,
        stdout: String,
        stderr: String,
    },
    ToolingFailure {
        kind: String,
        message: String,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub command: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

impl StepRecord {
    fn from_result(step: &str, command: String, result: IacResult<TerraformResult>) -> Self {
        let outcome = match result {
            Ok(r) => StepOutcome::Completed {
                exit_code: r.exit_code,
                stdout: r.stdout,
                stderr: r.stderr,
            },
            Err(IacError::Runner(e)) => StepOutcome::ToolingFailure {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
            Err(e) => StepOutcome::ToolingFailure {
                kind: "execution_failed".to_string(),
                message: e.to_string(),
            },
        };
        Self {
            step: step.to_string(),
            command,
            outcome,
        }
    }

    fn skipped(step: &str, command: String, reason: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            command,
            outcome: StepOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, StepOutcome::Completed { exit_code: 0, .. })
    }
}

/// Steps run in one validation root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootValidation {
    pub root: String,
    pub steps: Vec<StepRecord>,
}

impl RootValidation {
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == name)
    }

    pub fn passed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(StepRecord::succeeded)
    }
}

/// A step that ran and exited non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub root: String,
    pub step: String,
    pub exit_code: i64,
    /// stderr verbatim, stdout when stderr is empty
    pub output: String,
}

/// Interpretation of a [`ValidationResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    /// init and validate exited 0 in every root
    Passed,
    Failed(Vec<StepFailure>),
    ToolingFailure(String),
    /// Nothing to validate
    NotRun,
}

/// `declared/terraform_validation.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub schema_version: String,
    pub validator: String,
    pub tool_version: Option<String>,
    pub requested_version: Option<String>,
    /// `None` when no version was requested or none could be detected
    pub version_satisfied: Option<bool>,
    pub roots: Vec<RootValidation>,
    /// Failure before any root could be validated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooling_error: Option<String>,
}

impl ValidationResult {
    fn empty(validator: &str, requested_version: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            validator: validator.to_string(),
            tool_version: None,
            requested_version,
            version_satisfied: None,
            roots: Vec::new(),
            tooling_error: None,
        }
    }

    /// Tooling failures anywhere take precedence over non-zero exits.
    pub fn verdict(&self) -> ValidationVerdict {
        if let Some(error) = &self.tooling_error {
            return ValidationVerdict::ToolingFailure(error.clone());
        }
        if self.roots.is_empty() {
            return ValidationVerdict::NotRun;
        }

        let tooling: Vec<String> = self
            .roots
            .iter()
            .flat_map(|root| {
                root.steps.iter().filter_map(move |step| match &step.outcome {
                    StepOutcome::ToolingFailure { message, .. } => {
                        Some(format!("{} ({}): {}", step.step, root.root, message))
                    }
                    _ => None,
                })
            })
            .collect();
        if !tooling.is_empty() {
            return ValidationVerdict::ToolingFailure(tooling.join("; "));
        }

        let failures: Vec<StepFailure> = self
            .roots
            .iter()
            .flat_map(|root| {
                root.steps.iter().filter_map(move |step| match &step.outcome {
                    StepOutcome::Completed {
                        exit_code,
                        stdout,
                        stderr,
                    } if *exit_code != 0 => Some(StepFailure {
                        root: root.root.clone(),
                        step: step.step.clone(),
                        exit_code: *exit_code,
                        output: if stderr.trim().is_empty() {
                            stdout.clone()
                        } else {
                            stderr.clone()
                        },
                    }),
                    _ => None,
                })
            })
            .collect();

        if failures.is_empty() {
            ValidationVerdict::Passed
        } else {
            ValidationVerdict::Failed(failures)
        }
    }
}

/// Runs the external validator over the detected surface.
pub struct ExternalValidator {
    terraform: TerraformRunner,
}

impl ExternalValidator {
    pub fn new(runner: Arc<dyn ToolRunner>, config: &RunConfig) -> Self {
        Self {
            terraform: TerraformRunner::new(runner).with_settings(&config.settings.validator),
        }
    }

    pub async fn validate(&self, config: &RunConfig, detection: &DetectionResult) -> ValidationResult {
        let binary = self.terraform.binary().to_string();
        let mut result = ValidationResult::empty(&binary, config.tool_version_pin.clone());

        let roots = detection.validation_roots();
        if roots.is_empty() {
            info!("No validation roots; skipping {}", binary);
            return result;
        }

        match self.terraform.version().await {
            Ok(version) => {
                if let (Some(detected), Some(pin)) = (&version, &config.tool_version_pin) {
                    let satisfied = detected == pin;
                    if !satisfied {
                        warn!("Requested {} {} but found {}", binary, pin, detected);
                    }
                    result.version_satisfied = Some(satisfied);
                }
                info!("Using {} {}", binary, version.as_deref().unwrap_or("(unknown version)"));
                result.tool_version = version;
            }
            Err(e) => {
                warn!("{} is not usable: {}", binary, e);
                result.tooling_error = Some(e.to_string());
                return result;
            }
        }

        for root in roots {
            let dir = config.workspace.join(&root);
            result.roots.push(self.validate_root(&root, &dir).await);
        }

        info!(
            "Validation finished: {}/{} root(s) passed",
            result.roots.iter().filter(|r| r.passed()).count(),
            result.roots.len()
        );
        result
    }

    async fn validate_root(&self, root: &str, dir: &Path) -> RootValidation {
        let init_command = self.terraform.command_line(INIT_ARGS);
        let validate_command = self.terraform.command_line(VALIDATE_ARGS);

        let init = StepRecord::from_result("init", init_command, self.terraform.init(dir).await);
        let validate = if init.succeeded() {
            StepRecord::from_result("validate", validate_command, self.terraform.validate(dir).await)
        } else {
            warn!("terraform init did not succeed in {}; skipping validate", root);
            StepRecord::skipped("validate", validate_command, "init did not succeed")
        };

        RootValidation {
            root: root.to_string(),
            steps: vec![init, validate],
        }
    }
}
