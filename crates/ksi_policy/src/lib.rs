//! # ksi_policy
//!
//! Criterion definitions and evaluation for the KSI criterion sets.
//!
//! ## Features
//!
//! - Fixed catalogue for MLA05 (configuration evaluation) and CNA01
//!   (network isolation)
//! - Pure evaluation over detection, inventory, validation and network
//!   findings
//! - Security-group rule checks for sensitive port exposure, missing
//!   ingress and unrestricted egress
//!
//! ## Example
//!
//! ```rust,no_run
//! use ksi_core::{RunConfig, TriggerContext, TriggerKind};
//! use ksi_iac::{InventoryExtractor, NetworkInventory, SurfaceDetector};
//! use ksi_policy::{EvaluationContext, NetworkRuleChecker, PolicyEvaluator};
//!
//! # fn run() -> ksi_iac::IacResult<()> {
//! let config = RunConfig::new("./repo");
//! let detection = SurfaceDetector::from_config(&config)?.detect(&config)?;
//! let inventory = InventoryExtractor::new().extract(&detection);
//! let findings = NetworkRuleChecker::new().check(&NetworkInventory::from_inventory(&inventory));
//! let trigger = TriggerContext::new(TriggerKind::Schedule);
//!
//! let ctx = EvaluationContext {
//!     detection: &detection,
//!     inventory: &inventory,
//!     validation: None,
//!     network: Some(&findings),
//!     trigger: &trigger,
//! };
//! for result in PolicyEvaluator::new().evaluate_cna01(&ctx) {
//!     println!("{} {}", result.id, result.outcome);
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalogue;
pub mod error;
pub mod evaluator;
pub mod network;

pub use catalogue::{definition, definitions, CriterionDefinition};
pub use error::{PolicyError, PolicyResult};
pub use evaluator::{EvaluationContext, PolicyEvaluator};
pub use network::{
    ExposedPort, NetworkFindings, NetworkRuleChecker, Violation, ViolationKind, SENSITIVE_PORTS,
};
