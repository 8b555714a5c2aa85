//! End-to-end runs over the Terraform fixtures with a mocked validator.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use ksi_core::{CriterionSet, Outcome, RunConfig, TriggerContext, TriggerKind};
use ksi_engine::{Engine, EngineError, RunReport};
use ksi_evidence::{verify_archive, ResultsSummary};
use ksi_runner::{MockResponse, MockRunner};
use tempfile::{tempdir, TempDir};
use zip::ZipArchive;

const VALIDATE_ERROR: &str = "Error: Reference to undeclared resource\n\n  on main.tf line 3, in resource \"aws_security_group\" \"app\":\n   3:   vpc_id = aws_vpc.missing.id\n";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Copy a fixture into a scratch workspace.
fn workspace(name: &str) -> TempDir {
    let dir = tempdir().unwrap();
    let infra = dir.path().join("infra");
    fs::create_dir_all(&infra).unwrap();
    for entry in fs::read_dir(fixture(name)).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), infra.join(entry.file_name())).unwrap();
    }
    dir
}

fn config(workspace: &Path, event: TriggerKind) -> RunConfig {
    RunConfig::new(workspace)
        .with_root_paths_csv("infra")
        .with_output_dir(workspace.join("out"))
        .with_collected_at(Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap())
        .with_trigger(
            TriggerContext::new(event)
                .repository("acme/infra")
                .commit_sha("4f2c9a1b7e3d5c6a"),
        )
}

fn passing_runner() -> Arc<MockRunner> {
    Arc::new(
        MockRunner::new()
            .respond_to("version", MockResponse::success(r#"{"terraform_version":"1.6.6"}"#))
            .respond_to("init", MockResponse::success("Terraform has been successfully initialized!"))
            .respond_to("validate", MockResponse::success("Success! The configuration is valid.")),
    )
}

async fn run(fixture_name: &str, event: TriggerKind, runner: Arc<MockRunner>) -> (TempDir, RunReport) {
    let dir = workspace(fixture_name);
    let report = Engine::new(runner).run(&config(dir.path(), event)).await.unwrap();
    (dir, report)
}

fn outcome(report: &RunReport, set: CriterionSet, id: &str) -> Outcome {
    report.set(set).unwrap().manifest.criterion(id).unwrap().outcome
}

fn read_entry(archive: &Path, name: &str) -> String {
    let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    let mut contents = String::new();
    zip.by_name(name).unwrap().read_to_string(&mut contents).unwrap();
    contents
}

#[tokio::test]
async fn test_compliant_three_tier_passes_everything() {
    let (_dir, report) = run("compliant_network", TriggerKind::Schedule, passing_runner()).await;

    assert_eq!(report.status, Outcome::Pass);
    assert_eq!(report.sets.len(), 2);

    let mla05 = report.set(CriterionSet::Mla05).unwrap();
    assert_eq!(mla05.archive_name, "evidence_ksi-mla-05_4f2c9a1_20240115T060000Z.zip");
    assert_eq!(mla05.manifest.criteria.len(), 5);
    assert!(mla05.manifest.criterion("MLA05-N").unwrap().advisory);
    assert_eq!(mla05.summary.conclusion.as_str(), "success");

    let cna01 = report.set(CriterionSet::Cna01).unwrap();
    assert_eq!(cna01.status, Outcome::Pass);
    assert_eq!(cna01.archive_name, "evidence_ksi-cna-01_4f2c9a1_20240115T060000Z.zip");

    for set in &report.sets {
        let verification = verify_archive(&set.archive_path).unwrap();
        assert!(verification.is_valid(), "{:?}", verification.problems());
    }

    let results = ResultsSummary::load(&report.results_path).unwrap();
    assert_eq!(results.overall_status, Outcome::Pass);
    assert_eq!(results.criterion_sets.len(), 2);
}

#[tokio::test]
async fn test_noncompliant_network_counts_rule_violations() {
    let (_dir, report) = run("noncompliant_network", TriggerKind::Schedule, passing_runner()).await;

    let cna01 = report.set(CriterionSet::Cna01).unwrap();
    assert_eq!(cna01.status, Outcome::Fail);
    assert_eq!(cna01.summary.conclusion.as_str(), "failure");

    let violations = |id: &str| -> usize {
        cna01.manifest.criterion(id).unwrap().evidence.as_ref().unwrap()["violations"]
            .as_array()
            .unwrap()
            .len()
    };
    // ssh, rdp, two database ports, redis
    assert_eq!(violations("CNA01-A"), 5);
    assert_eq!(violations("CNA01-B"), 1);
    assert_eq!(violations("CNA01-C"), 5);

    let findings: serde_json::Value = serde_json::from_str(&read_entry(
        &cna01.archive_path,
        "ksi-cna-01/declared/network_findings.json",
    ))
    .unwrap();
    assert_eq!(findings["security_groups_evaluated"], 6);
    assert_eq!(findings["violations"].as_array().unwrap().len(), 11);

    let rationale = &cna01.manifest.criterion("CNA01-A").unwrap().rationale;
    assert!(rationale.contains("aws_security_group.ssh_open"));
    assert!(rationale.contains("22 (SSH)"));
    assert!(rationale.contains("3389 (RDP)"));

    // the advisory copy does not change the configuration verdict
    let mla05 = report.set(CriterionSet::Mla05).unwrap();
    assert_eq!(mla05.status, Outcome::Pass);
    assert_eq!(outcome(&report, CriterionSet::Mla05, "MLA05-N"), Outcome::Fail);
    assert_eq!(report.status, Outcome::Fail);
}

#[tokio::test]
async fn test_malformed_declaration_is_error_with_diagnostics_in_pack() {
    let runner = Arc::new(
        MockRunner::new()
            .respond_to("version", MockResponse::success(r#"{"terraform_version":"1.6.6"}"#))
            .respond_to("init", MockResponse::success(""))
            .respond_to("validate", MockResponse::failure(1, VALIDATE_ERROR)),
    );
    let (_dir, report) = run("malformed", TriggerKind::Schedule, runner).await;

    let mla05 = report.set(CriterionSet::Mla05).unwrap();
    assert_eq!(mla05.status, Outcome::Error);
    assert_eq!(mla05.summary.conclusion.as_str(), "error");

    let b = mla05.manifest.criterion("MLA05-B").unwrap();
    assert_eq!(b.outcome, Outcome::Error);
    assert!(b.rationale.contains("reference to undeclared resource 'aws_vpc.missing'"));

    // pack still produced, with the captured validator output
    assert!(mla05.archive_path.is_file());
    let validation = read_entry(&mla05.archive_path, "ksi-mla-05/declared/terraform_validation.json");
    assert!(validation.contains("Reference to undeclared resource"));
    assert_eq!(outcome(&report, CriterionSet::Mla05, "MLA05-D"), Outcome::Pass);
}

#[tokio::test]
async fn test_manual_trigger_fails_only_persistent_cycle() {
    let (_dir, report) = run("minimal", TriggerKind::WorkflowDispatch, passing_runner()).await;

    let mla05 = report.set(CriterionSet::Mla05).unwrap();
    assert_eq!(mla05.status, Outcome::Fail);
    for id in ["MLA05-A", "MLA05-B", "MLA05-D"] {
        assert_eq!(outcome(&report, CriterionSet::Mla05, id), Outcome::Pass, "{}", id);
    }
    assert_eq!(outcome(&report, CriterionSet::Mla05, "MLA05-C"), Outcome::Fail);
    assert_eq!(outcome(&report, CriterionSet::Cna01, "CNA01-D"), Outcome::Fail);
}

#[tokio::test]
async fn test_missing_terraform_is_error_not_fail() {
    let runner = Arc::new(MockRunner::new().simulate_not_found());
    let (_dir, report) = run("minimal", TriggerKind::Schedule, runner.clone()).await;

    assert_eq!(outcome(&report, CriterionSet::Mla05, "MLA05-B"), Outcome::Error);
    assert_eq!(report.set(CriterionSet::Mla05).unwrap().status, Outcome::Error);
    assert!(!runner.was_called("init"));
    assert!(report.set(CriterionSet::Mla05).unwrap().archive_path.is_file());
}

#[tokio::test]
async fn test_empty_repository_fails_scope_without_running_terraform() {
    let dir = tempdir().unwrap();
    let runner = passing_runner();
    let mut config = config(dir.path(), TriggerKind::Schedule).with_root_paths_csv(".");
    config.settings.network.enabled = false;

    let report = Engine::new(runner.clone()).run(&config).await.unwrap();
    assert_eq!(report.sets.len(), 1);
    assert_eq!(outcome(&report, CriterionSet::Mla05, "MLA05-A"), Outcome::Fail);
    assert_eq!(outcome(&report, CriterionSet::Mla05, "MLA05-B"), Outcome::Fail);
    assert_eq!(report.status, Outcome::Fail);
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn test_unwritable_output_aborts_run() {
    let dir = workspace("minimal");
    let blocker = dir.path().join("not-a-directory");
    fs::write(&blocker, "occupied").unwrap();
    let config = config(dir.path(), TriggerKind::Schedule).with_output_dir(&blocker);

    let err = Engine::new(passing_runner()).run(&config).await.unwrap_err();
    assert!(matches!(err, EngineError::Evidence(_)));
    assert!(err.is_evidence_failure());
}
