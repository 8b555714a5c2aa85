//! # ksi_iac
//!
//! Terraform surface detection, inventory extraction and external
//! validation for KSI evidence collection.
//!
//! ## Features
//!
//! - Read-only surface detection over configured root paths
//! - HCL-lite parsing into a tagged [`Value`] model
//! - Resource, provider and module inventory with reference resolution
//! - Flat security-group rule model for AWS, Azure and GCP
//! - `terraform init` / `terraform validate` through a [`ksi_runner::ToolRunner`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ksi_core::RunConfig;
//! use ksi_iac::{ExternalValidator, InventoryExtractor, SurfaceDetector};
//! use ksi_runner::ProcessRunner;
//!
//! # async fn run() -> ksi_iac::IacResult<()> {
//! let config = RunConfig::new("./repo").with_root_paths_csv("infra");
//! let detection = SurfaceDetector::from_config(&config)?.detect(&config)?;
//! let inventory = InventoryExtractor::new().extract(&detection);
//!
//! let validator = ExternalValidator::new(Arc::new(ProcessRunner::new()), &config);
//! let validation = validator.validate(&config, &detection).await;
//! println!("{} resources, verdict {:?}", inventory.resource_count, validation.verdict());
//! # Ok(())
//! # }
//! ```

pub mod detect;
pub mod error;
pub mod hcl;
pub mod inventory;
pub mod network;
pub mod provider;
pub mod terraform;
pub mod validator;

pub use detect::{DeclarationFile, DeclarationFormat, DetectionResult, SurfaceDetector, UnreadableFile};
pub use error::{IacError, IacResult, ParseError};
pub use hcl::{Reference, Scalar, Value};
pub use inventory::{
    module_dir, DataSource, Diagnostic, DiagnosticKind, Inventory, InventoryExtractor, Module, Provider,
    ResourceDeclaration, ResourceIndex, Severity,
};
pub use network::{
    Direction, NetworkInventory, PortRange, RuleBlock, SecurityGroup, SecurityGroupKind, Specifier,
};
pub use provider::CloudProvider;
pub use terraform::{TerraformResult, TerraformRunner};
pub use validator::{
    ExternalValidator, RootValidation, StepFailure, StepOutcome, StepRecord, ValidationResult,
    ValidationVerdict,
};
