//! Integration tests for the IaC crate.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use ksi_core::RunConfig;
use ksi_iac::{
    DiagnosticKind, Direction, ExternalValidator, InventoryExtractor, NetworkInventory, Specifier, SurfaceDetector,
    ValidationVerdict,
};
use ksi_runner::{MockResponse, MockRunner};
use tempfile::tempdir;

const NETWORK_TF: &str = r#"
resource "aws_vpc" "main" {
  cidr_block = "10.0.0.0/16"
}

resource "aws_security_group" "lb" {
  name   = "lb"
  vpc_id = aws_vpc.main.id

  ingress {
    from_port   = 443
    to_port     = 443
    protocol    = "tcp"
    cidr_blocks = ["0.0.0.0/0"]
  }
}

resource "aws_security_group" "app" {
  name   = "app"
  vpc_id = aws_vpc.main.id
}

resource "aws_security_group_rule" "app_from_lb" {
  type                     = "ingress"
  security_group_id        = aws_security_group.app.id
  from_port                = 8080
  to_port                  = 8080
  protocol                 = "tcp"
  source_security_group_id = aws_security_group.lb.id
}

resource "aws_security_group_rule" "lb_to_app" {
  type                     = "egress"
  security_group_id        = aws_security_group.lb.id
  from_port                = 8080
  to_port                  = 8080
  protocol                 = "tcp"
  source_security_group_id = aws_security_group.app.id
}
"#;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

#[test]
fn test_detect_extract_and_group_rules() {
    let dir = tempdir().unwrap();
    write(dir.path(), "infra/network.tf", NETWORK_TF);
    write(dir.path(), "infra/.terraform/modules/ignored.tf", "garbage {{{");
    write(dir.path(), "README.md", "# not terraform");

    let config = RunConfig::new(dir.path()).with_root_paths_csv("infra");
    let detection = SurfaceDetector::from_config(&config)
        .unwrap()
        .detect(&config)
        .unwrap();
    assert!(detection.detected);
    assert_eq!(detection.file_count, 1);
    assert_eq!(detection.surface_paths, vec!["infra"]);

    let inventory = InventoryExtractor::new().extract(&detection);
    assert!(inventory.is_usable(), "{:?}", inventory.blocking_issues());
    assert_eq!(inventory.resource_count, 5);
    assert_eq!(inventory.files_analyzed, vec!["infra/network.tf"]);

    // rules declared after their group and before it both attach
    let network = NetworkInventory::from_inventory(&inventory);
    assert_eq!(network.security_groups.len(), 2);
    assert!(network.unattached_rules.is_empty());
    assert_eq!(network.vpcs.len(), 1);

    let app = network.group("aws_security_group.app").unwrap();
    let ingress: Vec<_> = app.ingress().collect();
    assert_eq!(ingress.len(), 1);
    assert_eq!(
        ingress[0].specifier,
        Specifier::SecurityGroups {
            groups: vec!["aws_security_group.lb".to_string()]
        }
    );

    let lb = network.group("aws_security_group.lb").unwrap();
    assert_eq!(lb.egress().count(), 1);
    assert!(lb.rules.iter().any(|r| r.direction == Direction::Ingress));
}

#[test]
fn test_malformed_file_is_isolated() {
    let dir = tempdir().unwrap();
    write(dir.path(), "good.tf", NETWORK_TF);
    write(dir.path(), "bad.tf", "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"logs\"\n");

    let config = RunConfig::new(dir.path());
    let detection = SurfaceDetector::from_config(&config)
        .unwrap()
        .detect(&config)
        .unwrap();
    let inventory = InventoryExtractor::new().extract(&detection);

    assert_eq!(inventory.parse_errors.len(), 1);
    assert_eq!(inventory.parse_errors[0].file, "bad.tf");
    assert_eq!(inventory.resource_count, 5);
    assert!(!inventory.is_usable());

    let json = serde_json::to_value(&inventory).unwrap();
    assert_eq!(json["parse_errors"][0]["file"], "bad.tf");
    assert_eq!(json["resources_by_type"]["aws_security_group"]["count"], 2);
}

#[test]
fn test_empty_repository() {
    let dir = tempdir().unwrap();
    write(dir.path(), "docs/index.md", "nothing here");

    let config = RunConfig::new(dir.path());
    let detection = SurfaceDetector::from_config(&config)
        .unwrap()
        .detect(&config)
        .unwrap();
    assert!(!detection.detected);

    let inventory = InventoryExtractor::new().extract(&detection);
    assert_eq!(inventory.resource_count, 0);
    assert!(inventory.is_usable());
}

#[tokio::test]
async fn test_validator_runs_in_detected_root() {
    let dir = tempdir().unwrap();
    write(dir.path(), "terraform/main.tf", NETWORK_TF);
    write(dir.path(), "terraform/modules/sg/main.tf", "variable \"name\" {}\n");

    let config = RunConfig::new(dir.path()).with_root_paths_csv("terraform");
    let detection = SurfaceDetector::from_config(&config)
        .unwrap()
        .detect(&config)
        .unwrap();

    let mock = Arc::new(
        MockRunner::new()
            .respond_to("version", MockResponse::success("Terraform v1.6.2\non linux_amd64"))
            .respond_to("init", MockResponse::success("Terraform has been successfully initialized!"))
            .respond_to("validate", MockResponse::failure(1, "Error: Reference to undeclared resource")),
    );
    let validator = ExternalValidator::new(mock.clone(), &config);
    let result = validator.validate(&config, &detection).await;

    assert_eq!(result.tool_version.as_deref(), Some("1.6.2"));
    assert_eq!(mock.get_subcommand_calls("init").len(), 1);
    assert_eq!(
        mock.get_subcommand_calls("init")[0].workdir.as_deref(),
        Some(dir.path().join("terraform").as_path())
    );

    match result.verdict() {
        ValidationVerdict::Failed(failures) => {
            assert_eq!(failures[0].step, "validate");
            assert_eq!(failures[0].output, "Error: Reference to undeclared resource");
        }
        other => panic!("unexpected verdict {:?}", other),
    }
}

#[test]
fn test_standalone_rules_attach_within_their_root() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "envs/dev/main.tf",
        r#"
resource "aws_vpc" "main" {
  cidr_block = "10.0.0.0/16"
}

resource "aws_security_group" "web" {
  name   = "web-dev"
  vpc_id = aws_vpc.main.id
}

resource "aws_security_group_rule" "web_egress" {
  type              = "egress"
  security_group_id = aws_security_group.web.id
  from_port         = 443
  to_port           = 443
  protocol          = "tcp"
  cidr_blocks       = ["10.0.0.0/8"]
}
"#,
    );
    write(
        dir.path(),
        "envs/prod/main.tf",
        r#"
resource "aws_security_group" "web" {
  name   = "web-prod"
  vpc_id = aws_vpc.main.id
}
"#,
    );

    let config = RunConfig::new(dir.path()).with_root_paths_csv("envs");
    let detection = SurfaceDetector::from_config(&config)
        .unwrap()
        .detect(&config)
        .unwrap();
    let inventory = InventoryExtractor::new().extract(&detection);

    // prod has no aws_vpc.main of its own
    assert!(!inventory.is_usable());
    let dangling: Vec<_> = inventory
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::DanglingReference)
        .collect();
    assert_eq!(dangling.len(), 1);
    assert_eq!(dangling[0].file, "envs/prod/main.tf");

    let network = NetworkInventory::from_inventory(&inventory);
    assert_eq!(network.security_groups.len(), 2);
    assert!(network.unattached_rules.is_empty());
    let by_file = |file: &str| {
        network
            .security_groups
            .iter()
            .find(|g| g.file == file)
            .unwrap()
            .egress()
            .count()
    };
    assert_eq!(by_file("envs/dev/main.tf"), 1);
    assert_eq!(by_file("envs/prod/main.tf"), 0);
}
