//! Policy evaluation.
//!
//! Every criterion is a pure function over artifacts that already exist;
//! none touches the filesystem. The evidence criterion (MLA05-D) is
//! evaluated separately, against the provisional evidence pack.

use serde_json::json;
use tracing::{debug, info};

use ksi_core::{CriterionResult, Outcome, TriggerContext};
use ksi_iac::{DetectionResult, Inventory, StepOutcome, ValidationResult, ValidationVerdict};

use crate::catalogue::{
    CriterionDefinition, CNA01_A, CNA01_B, CNA01_C, CNA01_D, MLA05_A, MLA05_B, MLA05_C, MLA05_D,
    MLA05_N,
};
use crate::network::{NetworkFindings, Violation, ViolationKind};

/// Artifacts the criteria read.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub detection: &'a DetectionResult,
    pub inventory: &'a Inventory,
    /// `None` when the validator was not run
    pub validation: Option<&'a ValidationResult>,
    /// `None` when network evaluation was not requested
    pub network: Option<&'a NetworkFindings>,
    pub trigger: &'a TriggerContext,
}

type Criterion = fn(&EvaluationContext<'_>) -> CriterionResult;

const MLA05_CRITERIA: &[Criterion] = &[surface_in_scope, evaluation_performed, persistent_cycle];
const CNA01_CRITERIA: &[Criterion] = &[
    ingress_restrictions,
    explicit_ingress,
    egress_restrictions,
    persistent_evaluation,
];

/// Runs the criterion batteries.
#[derive(Debug, Default)]
pub struct PolicyEvaluator;

impl PolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// MLA05-A..C, plus the advisory MLA05-N when network findings exist.
    /// MLA05-D comes from [`PolicyEvaluator::evidence_artifacts`].
    pub fn evaluate_mla05(&self, ctx: &EvaluationContext<'_>) -> Vec<CriterionResult> {
        let mut results = run(MLA05_CRITERIA, ctx);
        if let Some(findings) = ctx.network {
            results.push(network_advisory(findings));
        }
        log_results("ksi-mla-05", &results);
        results
    }

    /// CNA01-A..D.
    pub fn evaluate_cna01(&self, ctx: &EvaluationContext<'_>) -> Vec<CriterionResult> {
        let results = run(CNA01_CRITERIA, ctx);
        log_results("ksi-cna-01", &results);
        results
    }

    /// MLA05-D: every required file is present in the provisional pack.
    pub fn evidence_artifacts(&self, present: &[String], required: &[&str]) -> CriterionResult {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|r| !present.iter().any(|p| p == r))
            .collect();
        let evidence = json!({ "required": required, "present": present, "missing": missing });

        if missing.is_empty() {
            MLA05_D
                .pass(format!("{} required file(s) present.", required.len()))
                .with_evidence(evidence)
        } else {
            MLA05_D
                .fail(format!("Missing: {}.", missing.join(", ")))
                .with_evidence(evidence)
        }
    }
}

fn run(criteria: &[Criterion], ctx: &EvaluationContext<'_>) -> Vec<CriterionResult> {
    criteria.iter().map(|criterion| criterion(ctx)).collect()
}

fn log_results(set: &str, results: &[CriterionResult]) {
    for result in results {
        debug!("{} {}: {}", set, result.id, result.outcome);
    }
    let status = Outcome::reduce(results.iter().filter(|r| !r.advisory).map(|r| r.outcome));
    info!("Evaluated {} criteria for {}: {}", results.len(), set, status);
}

fn surface_in_scope(ctx: &EvaluationContext<'_>) -> CriterionResult {
    let detection = ctx.detection;
    let evidence = json!({
        "file_count": detection.file_count,
        "total_bytes": detection.total_bytes,
        "surface_paths": detection.surface_paths,
        "root_paths": detection.root_paths,
        "missing_roots": detection.missing_roots,
    });

    if detection.detected {
        MLA05_A
            .pass(format!(
                "{} file(s), {} byte(s) in {}.",
                detection.file_count,
                detection.total_bytes,
                detection.surface_paths.join(", ")
            ))
            .with_evidence(evidence)
    } else {
        MLA05_A
            .fail(format!("Scanned: {}.", detection.root_paths.join(", ")))
            .with_evidence(evidence)
    }
}

fn validation_evidence(validation: Option<&ValidationResult>, inventory: &Inventory) -> serde_json::Value {
    let roots: Vec<serde_json::Value> = validation
        .map(|v| {
            v.roots
                .iter()
                .map(|root| {
                    let steps: Vec<serde_json::Value> = root
                        .steps
                        .iter()
                        .map(|step| match &step.outcome {
                            StepOutcome::Completed { exit_code, .. } => {
                                json!({ "step": step.step, "status": "completed", "exit_code": exit_code })
                            }
                            StepOutcome::ToolingFailure { kind, .. } => {
                                json!({ "step": step.step, "status": "tooling_failure", "kind": kind })
                            }
                            StepOutcome::Skipped { .. } => json!({ "step": step.step, "status": "skipped" }),
                        })
                        .collect();
                    json!({ "root": root.root, "steps": steps })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "tool_version": validation.and_then(|v| v.tool_version.clone()),
        "roots": roots,
        "parse_errors": inventory.parse_errors,
        "blocking_diagnostics": inventory.diagnostics.iter().filter(|d| d.is_error()).collect::<Vec<_>>(),
    })
}

/// Tooling failures and unusable inventories are ERROR; a step that ran
/// and exited non-zero is FAIL.
fn evaluation_performed(ctx: &EvaluationContext<'_>) -> CriterionResult {
    let evidence = validation_evidence(ctx.validation, ctx.inventory);

    if !ctx.detection.detected {
        return MLA05_B
            .fail("No Terraform configuration to evaluate.")
            .with_evidence(evidence);
    }

    let verdict = ctx
        .validation
        .map(ValidationResult::verdict)
        .unwrap_or(ValidationVerdict::NotRun);

    if let ValidationVerdict::ToolingFailure(message) = &verdict {
        return MLA05_B.error(message).with_evidence(evidence);
    }

    if !ctx.inventory.is_usable() {
        let issues = ctx.inventory.blocking_issues();
        return MLA05_B
            .error(format!(
                "Inventory could not be extracted ({} issue(s)):\n{}",
                issues.len(),
                issues.join("\n")
            ))
            .with_evidence(evidence);
    }

    match verdict {
        ValidationVerdict::Passed => {
            let version = ctx
                .validation
                .and_then(|v| v.tool_version.as_deref())
                .unwrap_or("unknown version");
            MLA05_B
                .pass(format!("Terraform {}.", version))
                .with_evidence(evidence)
        }
        ValidationVerdict::Failed(failures) => {
            let detail: Vec<String> = failures
                .iter()
                .map(|f| format!("{} ({}) exited {}:\n{}", f.step, f.root, f.exit_code, f.output.trim_end()))
                .collect();
            MLA05_B.fail(detail.join("\n")).with_evidence(evidence)
        }
        ValidationVerdict::NotRun => MLA05_B
            .error("The validator was not run.")
            .with_evidence(evidence),
        ValidationVerdict::ToolingFailure(message) => MLA05_B.error(message).with_evidence(evidence),
    }
}

fn trigger_criterion(definition: &CriterionDefinition, trigger: &TriggerContext) -> CriterionResult {
    let event = trigger.event.as_str();
    let evidence = json!({ "trigger_event": event });
    if trigger.event.is_recurring() {
        definition.pass("").with_evidence(evidence)
    } else {
        definition
            .fail(format!("Triggered by '{}' instead of 'schedule'.", event))
            .with_evidence(evidence)
    }
}

fn persistent_cycle(ctx: &EvaluationContext<'_>) -> CriterionResult {
    trigger_criterion(&MLA05_C, ctx.trigger)
}

fn persistent_evaluation(ctx: &EvaluationContext<'_>) -> CriterionResult {
    trigger_criterion(&CNA01_D, ctx.trigger)
}

fn violation_lines(violations: &[&Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("- {} ({}:{}): {}", v.resource, v.file, v.line, v.message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Network criteria are ERROR when declaration files could not be parsed:
/// a violation may hide in the unparsed files.
fn network_criterion(
    definition: &CriterionDefinition,
    kinds: &[ViolationKind],
    ctx: &EvaluationContext<'_>,
) -> CriterionResult {
    let Some(findings) = ctx.network else {
        return definition.error("Network evaluation was not performed.");
    };
    let violations = findings.of_kind(kinds);
    let evidence = json!({
        "security_groups_evaluated": findings.security_groups_evaluated,
        "violations": violations,
    });

    if !ctx.inventory.parse_errors.is_empty() {
        let files: Vec<&str> = ctx.inventory.parse_errors.iter().map(|e| e.file.as_str()).collect();
        return definition
            .error(format!("Unparsed declaration file(s): {}.", files.join(", ")))
            .with_evidence(evidence);
    }

    if violations.is_empty() {
        definition
            .pass(format!("{} security group(s) evaluated.", findings.security_groups_evaluated))
            .with_evidence(evidence)
    } else {
        definition
            .fail(format!("{} violation(s):\n{}", violations.len(), violation_lines(&violations)))
            .with_evidence(evidence)
    }
}

fn ingress_restrictions(ctx: &EvaluationContext<'_>) -> CriterionResult {
    network_criterion(&CNA01_A, &[ViolationKind::SensitiveExposure], ctx)
}

fn explicit_ingress(ctx: &EvaluationContext<'_>) -> CriterionResult {
    network_criterion(&CNA01_B, &[ViolationKind::MissingIngress], ctx)
}

fn egress_restrictions(ctx: &EvaluationContext<'_>) -> CriterionResult {
    network_criterion(
        &CNA01_C,
        &[ViolationKind::UnrestrictedEgress, ViolationKind::ImplicitEgress],
        ctx,
    )
}

/// MLA05-N: the whole checker verdict, advisory.
fn network_advisory(findings: &NetworkFindings) -> CriterionResult {
    let evidence = json!({
        "security_groups_evaluated": findings.security_groups_evaluated,
        "security_groups_compliant": findings.security_groups_compliant,
        "violation_count": findings.violations.len(),
        "violations": findings.violations,
    });
    match findings.outcome() {
        Outcome::Pass => MLA05_N
            .pass(format!("{} security group(s) evaluated.", findings.security_groups_evaluated))
            .with_evidence(evidence),
        outcome => {
            let all: Vec<&Violation> = findings.violations.iter().collect();
            MLA05_N
                .result(outcome, format!("{} violation(s):\n{}", all.len(), violation_lines(&all)))
                .with_evidence(evidence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ksi_core::{EvaluationManifest, CriterionSet, TriggerKind, SCHEMA_VERSION};
    use ksi_iac::{ParseError, RootValidation, StepRecord};
    use std::collections::BTreeMap;

    fn detection(detected: bool) -> DetectionResult {
        DetectionResult {
            schema_version: SCHEMA_VERSION.to_string(),
            detected,
            file_count: usize::from(detected),
            total_bytes: if detected { 120 } else { 0 },
            files: Vec::new(),
            surface_paths: if detected { vec![".".to_string()] } else { Vec::new() },
            lockfile_present: false,
            root_paths: vec![".".to_string()],
            missing_roots: Vec::new(),
            unreadable: Vec::new(),
            scanned_at: Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap(),
        }
    }

    fn inventory() -> Inventory {
        Inventory {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap(),
            terraform_paths: vec![".".to_string()],
            files_analyzed: vec!["main.tf".to_string()],
            resource_count: 0,
            resources_by_type: BTreeMap::new(),
            resources: Vec::new(),
            data_sources: Vec::new(),
            providers: Vec::new(),
            modules: Vec::new(),
            variable_count: 0,
            output_count: 0,
            parse_errors: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn step(name: &str, outcome: StepOutcome) -> StepRecord {
        StepRecord {
            step: name.to_string(),
            command: format!("terraform {}", name),
            outcome,
        }
    }

    fn completed(exit_code: i64, stderr: &str) -> StepOutcome {
        StepOutcome::Completed {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn validation(steps: Vec<StepRecord>) -> ValidationResult {
        ValidationResult {
            schema_version: SCHEMA_VERSION.to_string(),
            validator: "terraform".to_string(),
            tool_version: Some("1.6.0".to_string()),
            requested_version: None,
            version_satisfied: None,
            roots: vec![RootValidation {
                root: ".".to_string(),
                steps,
            }],
            tooling_error: None,
        }
    }

    fn passing_validation() -> ValidationResult {
        validation(vec![step("init", completed(0, "")), step("validate", completed(0, ""))])
    }

    fn findings(violations: Vec<Violation>) -> NetworkFindings {
        NetworkFindings {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap(),
            security_groups_evaluated: 2,
            security_groups_compliant: 2 - violations.len().min(2),
            rules_evaluated: 4,
            violations,
        }
    }

    fn violation(kind: ViolationKind) -> Violation {
        Violation {
            kind,
            resource: "aws_security_group.bastion".to_string(),
            rule_resource: None,
            file: "main.tf".to_string(),
            line: 4,
            message: "Sensitive port(s) 22 (SSH) exposed to 0.0.0.0/0".to_string(),
            exposed_ports: Vec::new(),
            cidrs: vec!["0.0.0.0/0".to_string()],
            protocol: Some("tcp".to_string()),
            ports: Some("22".to_string()),
        }
    }

    fn schedule() -> TriggerContext {
        TriggerContext::new(TriggerKind::Schedule)
    }

    fn outcome_of<'a>(results: &'a [CriterionResult], id: &str) -> &'a CriterionResult {
        results.iter().find(|r| r.id == id).unwrap()
    }

    #[test]
    fn test_all_pass() {
        let detection = detection(true);
        let inventory = inventory();
        let validation = passing_validation();
        let trigger = schedule();
        let ctx = EvaluationContext {
            detection: &detection,
            inventory: &inventory,
            validation: Some(&validation),
            network: None,
            trigger: &trigger,
        };
        let results = PolicyEvaluator::new().evaluate_mla05(&ctx);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.outcome == Outcome::Pass));
        assert!(outcome_of(&results, "MLA05-B").rationale.contains("1.6.0"));
    }

    #[test]
    fn test_nothing_detected_fails_scope() {
        let detection = detection(false);
        let inventory = inventory();
        let trigger = schedule();
        let ctx = EvaluationContext {
            detection: &detection,
            inventory: &inventory,
            validation: None,
            network: None,
            trigger: &trigger,
        };
        let results = PolicyEvaluator::new().evaluate_mla05(&ctx);
        assert_eq!(outcome_of(&results, "MLA05-A").outcome, Outcome::Fail);
        assert_eq!(outcome_of(&results, "MLA05-B").outcome, Outcome::Fail);
    }

    #[test]
    fn test_validate_failure_carries_stderr() {
        let detection = detection(true);
        let inventory = inventory();
        let validation = validation(vec![
            step("init", completed(0, "")),
            step("validate", completed(1, "Error: Unsupported block type\n\n  on main.tf line 3")),
        ]);
        let trigger = schedule();
        let ctx = EvaluationContext {
            detection: &detection,
            inventory: &inventory,
            validation: Some(&validation),
            network: None,
            trigger: &trigger,
        };
        let results = PolicyEvaluator::new().evaluate_mla05(&ctx);
        let b = outcome_of(&results, "MLA05-B");
        assert_eq!(b.outcome, Outcome::Fail);
        assert!(b.rationale.contains("Error: Unsupported block type\n\n  on main.tf line 3"));
    }

    #[test]
    fn test_tooling_failure_is_error() {
        let detection = detection(true);
        let inventory = inventory();
        let mut validation = passing_validation();
        validation.roots.clear();
        validation.tooling_error = Some("Runner error: Tool not found: terraform".to_string());
        let trigger = schedule();
        let ctx = EvaluationContext {
            detection: &detection,
            inventory: &inventory,
            validation: Some(&validation),
            network: None,
            trigger: &trigger,
        };
        let results = PolicyEvaluator::new().evaluate_mla05(&ctx);
        let b = outcome_of(&results, "MLA05-B");
        assert_eq!(b.outcome, Outcome::Error);
        assert!(b.rationale.contains("Tool not found"));
    }

    #[test]
    fn test_parse_errors_are_error_even_if_validate_passes() {
        let detection = detection(true);
        let mut inventory = inventory();
        inventory.parse_errors.push(ParseError {
            file: "broken.tf".to_string(),
            line: 7,
            column: 3,
            message: "expected '}'".to_string(),
        });
        let validation = passing_validation();
        let trigger = schedule();
        let ctx = EvaluationContext {
            detection: &detection,
            inventory: &inventory,
            validation: Some(&validation),
            network: None,
            trigger: &trigger,
        };
        let results = PolicyEvaluator::new().evaluate_mla05(&ctx);
        let b = outcome_of(&results, "MLA05-B");
        assert_eq!(b.outcome, Outcome::Error);
        assert!(b.rationale.contains("broken.tf:7:3: expected '}'"));
    }

    #[test]
    fn test_manual_trigger_fails_persistent_cycle_only() {
        let detection = detection(true);
        let inventory = inventory();
        let validation = passing_validation();
        let trigger = TriggerContext::new(TriggerKind::WorkflowDispatch);
        let ctx = EvaluationContext {
            detection: &detection,
            inventory: &inventory,
            validation: Some(&validation),
            network: None,
            trigger: &trigger,
        };
        let results = PolicyEvaluator::new().evaluate_mla05(&ctx);
        let c = outcome_of(&results, "MLA05-C");
        assert_eq!(c.outcome, Outcome::Fail);
        assert!(c.rationale.contains("'workflow_dispatch'"));
        assert_eq!(
            results.iter().filter(|r| r.outcome == Outcome::Pass).count(),
            2
        );
    }

    #[test]
    fn test_network_advisory_does_not_change_status() {
        let detection = detection(true);
        let inventory = inventory();
        let validation = passing_validation();
        let findings = findings(vec![violation(ViolationKind::SensitiveExposure)]);
        let trigger = schedule();
        let ctx = EvaluationContext {
            detection: &detection,
            inventory: &inventory,
            validation: Some(&validation),
            network: Some(&findings),
            trigger: &trigger,
        };
        let evaluator = PolicyEvaluator::new();
        let mut results = evaluator.evaluate_mla05(&ctx);
        results.push(evaluator.evidence_artifacts(&["scope.json".to_string()], &["scope.json"]));

        let n = outcome_of(&results, "MLA05-N");
        assert_eq!(n.outcome, Outcome::Fail);
        assert!(n.advisory);

        let manifest = EvaluationManifest::new(CriterionSet::Mla05, results, Utc::now());
        assert_eq!(manifest.status, Outcome::Pass);
    }

    #[test]
    fn test_cna01_maps_violations_to_criteria() {
        let detection = detection(true);
        let inventory = inventory();
        let findings = findings(vec![
            violation(ViolationKind::SensitiveExposure),
            violation(ViolationKind::ImplicitEgress),
        ]);
        let trigger = schedule();
        let ctx = EvaluationContext {
            detection: &detection,
            inventory: &inventory,
            validation: None,
            network: Some(&findings),
            trigger: &trigger,
        };
        let results = PolicyEvaluator::new().evaluate_cna01(&ctx);
        assert_eq!(results.len(), 4);
        assert_eq!(outcome_of(&results, "CNA01-A").outcome, Outcome::Fail);
        assert_eq!(outcome_of(&results, "CNA01-B").outcome, Outcome::Pass);
        assert_eq!(outcome_of(&results, "CNA01-C").outcome, Outcome::Fail);
        assert_eq!(outcome_of(&results, "CNA01-D").outcome, Outcome::Pass);

        let a = outcome_of(&results, "CNA01-A");
        let evidence = a.evidence.as_ref().unwrap();
        assert_eq!(evidence["violations"].as_array().unwrap().len(), 1);
        assert!(a.rationale.contains("aws_security_group.bastion (main.tf:4)"));
    }

    #[test]
    fn test_cna01_error_on_unparsed_files() {
        let detection = detection(true);
        let mut inventory = inventory();
        inventory.parse_errors.push(ParseError::unreadable("bad.tf", "stream did not contain valid UTF-8"));
        let findings = findings(Vec::new());
        let trigger = schedule();
        let ctx = EvaluationContext {
            detection: &detection,
            inventory: &inventory,
            validation: None,
            network: Some(&findings),
            trigger: &trigger,
        };
        let results = PolicyEvaluator::new().evaluate_cna01(&ctx);
        assert_eq!(outcome_of(&results, "CNA01-A").outcome, Outcome::Error);
        assert_eq!(outcome_of(&results, "CNA01-D").outcome, Outcome::Pass);
    }

    #[test]
    fn test_evidence_artifacts() {
        let evaluator = PolicyEvaluator::new();
        let present = vec!["collected_at.json".to_string(), "scope.json".to_string()];
        let pass = evaluator.evidence_artifacts(&present, &["collected_at.json", "scope.json"]);
        assert_eq!(pass.outcome, Outcome::Pass);

        let fail = evaluator.evidence_artifacts(&present, &["collected_at.json", "tools.json"]);
        assert_eq!(fail.outcome, Outcome::Fail);
        assert!(fail.rationale.contains("tools.json"));
    }
}
