//! Integration tests for evidence pack assembly and verification.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{TimeZone, Utc};
use ksi_core::{
    CriterionResult, CriterionSet, EvaluationManifest, Outcome, RunConfig, TriggerContext, TriggerKind,
};
use ksi_evidence::documents::{DETECTION, INVENTORY, VALIDATION};
use ksi_evidence::{
    verify_archive, verify_pack, EvidencePackBuilder, HashListing, ResultsSummary, ToolsDocument,
};
use serde_json::json;
use tempfile::tempdir;
use zip::ZipArchive;

fn config(workspace: &Path) -> RunConfig {
    RunConfig::new(workspace)
        .with_output_dir(workspace.join("evidence"))
        .with_collected_at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap())
        .with_trigger(
            TriggerContext::new(TriggerKind::Schedule)
                .repository("acme/platform")
                .commit_sha("9f8e7d6c5b4a"),
        )
}

fn manifest(config: &RunConfig, outcome: Outcome) -> EvaluationManifest {
    EvaluationManifest::new(
        CriterionSet::Mla05,
        vec![
            CriterionResult::pass("MLA05-A", "Configuration Surface in Scope", "ok"),
            CriterionResult::new("MLA05-B", "Machine-Based Evaluation Performed", outcome, "validate"),
        ],
        config.collected_at,
    )
}

fn build(config: &RunConfig, outcome: Outcome) -> ksi_evidence::EvidencePack {
    let tools = ToolsDocument::new("terraform").with_tool_version(Some("1.6.0".to_string()));
    let mut pack = EvidencePackBuilder::new(config, CriterionSet::Mla05)
        .begin(&["infra".to_string()], &tools)
        .unwrap();
    pack.write_document(DETECTION, "Terraform surface detection", &json!({ "detected": true, "file_count": 2 }))
        .unwrap();
    pack.write_document(INVENTORY, "Terraform resource inventory", &json!({ "resource_count": 4 }))
        .unwrap();
    pack.write_document(VALIDATION, "Terraform validation output", &json!({ "stderr": "Error: bad" }))
        .unwrap();
    assert!(pack.missing_required().is_empty());
    pack.finalize(&manifest(config, outcome)).unwrap()
}

#[test]
fn test_pack_layout_and_listing() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let pack = build(&config, Outcome::Fail);

    assert_eq!(pack.archive_name, "evidence_ksi-mla-05_9f8e7d6_20240301T123045Z.zip");
    assert!(pack.archive_path.is_file());
    assert_eq!(pack.status, Outcome::Fail);

    let listing = fs::read_to_string(pack.staging_dir.join("hashes.sha256")).unwrap();
    let paths: Vec<&str> = listing.lines().filter_map(|l| l.split_once("  ").map(|(_, p)| p)).collect();
    assert_eq!(
        paths,
        vec![
            "collected_at.json",
            "declared/terraform_detection.json",
            "declared/terraform_inventory.json",
            "declared/terraform_validation.json",
            "evaluation_manifest.json",
            "manifest.json",
            "scope.json",
            "tools.json",
        ]
    );

    let index: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(pack.staging_dir.join("manifest.json")).unwrap()).unwrap();
    let indexed: Vec<&str> = index["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["path"].as_str().unwrap())
        .collect();
    assert!(indexed.contains(&"evaluation_manifest.json"));
    assert!(!indexed.contains(&"hashes.sha256"));

    let evaluation: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(pack.staging_dir.join("evaluation_manifest.json")).unwrap())
            .unwrap();
    assert_eq!(evaluation["status"], "FAIL");
    assert_eq!(evaluation["criteria"][1]["rationale"], "validate");
}

#[test]
fn test_archive_round_trips_listing() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let pack = build(&config, Outcome::Pass);

    let report = verify_archive(&pack.archive_path).unwrap();
    assert!(report.is_valid(), "{:?}", report.problems());
    assert_eq!(report.verified, 8);
    assert!(verify_pack(&pack.staging_dir).unwrap().is_valid());

    let mut archive = ZipArchive::new(File::open(&pack.archive_path).unwrap()).unwrap();
    let mut listing = String::new();
    archive
        .by_name("ksi-mla-05/hashes.sha256")
        .unwrap()
        .read_to_string(&mut listing)
        .unwrap();
    assert_eq!(HashListing::parse(&listing).unwrap(), pack.hashes);
}

#[test]
fn test_identical_runs_produce_identical_archives() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    let a = build(&config(first.path()), Outcome::Pass);
    let b = build(&config(second.path()), Outcome::Pass);
    assert_eq!(a.archive_name, b.archive_name);
    assert_eq!(fs::read(&a.archive_path).unwrap(), fs::read(&b.archive_path).unwrap());
}

#[test]
fn test_tampered_archive_fails_verification() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let pack = build(&config, Outcome::Pass);

    // rebuild the archive with one document altered
    let tampered = dir.path().join("tampered.zip");
    let mut source = ZipArchive::new(File::open(&pack.archive_path).unwrap()).unwrap();
    let mut writer = zip::ZipWriter::new(File::create(&tampered).unwrap());
    for i in 0..source.len() {
        let mut entry = source.by_index(i).unwrap();
        let name = entry.name().to_string();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).unwrap();
        if name.ends_with("scope.json") {
            bytes = b"{\"repository\":\"someone/else\"}".to_vec();
        }
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&bytes).unwrap();
    }
    writer.finish().unwrap();

    let report = verify_archive(&tampered).unwrap();
    assert!(!report.is_valid());
    assert_eq!(report.mismatched, vec!["scope.json"]);
}

#[test]
fn test_results_summary_written() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let pack = build(&config, Outcome::Error);

    let summary = ResultsSummary::from_packs(config.collected_at, &[pack]);
    let path = summary.write(&config.output_dir).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["overall_status"], "ERROR");
    assert_eq!(json["criterion_sets"][0]["criterion_set"], "ksi-mla-05");
    assert_eq!(json["criterion_sets"][0]["criteria_summary"]["error"], 1);
}
