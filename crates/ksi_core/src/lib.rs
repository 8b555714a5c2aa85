//! # ksi_core
//!
//! Shared model for KSI evidence collection.
//!
//! This crate holds the types every pipeline stage agrees on: criterion
//! outcomes and their precedence, the evaluation manifest, the trigger
//! context of a run, and the immutable [`RunConfig`] threaded through every
//! component call.
//!
//! # Architecture
//!
//! - **Outcome**: PASS / FAIL / ERROR with strict ERROR > FAIL > PASS reduction
//! - **CriterionResult**: one named check, immutable once produced
//! - **EvaluationManifest**: the canonical machine-readable verdict of a run
//! - **RunConfig / EngineSettings**: explicit configuration, optionally from YAML
//! - **CheckRunSummary**: renders a manifest into a terminal check state
//!
//! # Example
//!
//! ```rust
//! use ksi_core::{CriterionResult, CriterionSet, EvaluationManifest, Outcome};
//!
//! let criteria = vec![
//!     CriterionResult::pass("MLA05-A", "Configuration Surface in Scope", "3 files"),
//!     CriterionResult::error("MLA05-B", "Machine-Based Evaluation Performed", "terraform not found"),
//! ];
//! let manifest = EvaluationManifest::new(CriterionSet::Mla05, criteria, chrono::Utc::now());
//! assert_eq!(manifest.status, Outcome::Error);
//! ```

pub mod context;
pub mod criterion;
pub mod error;
pub mod manifest;
pub mod outcome;
pub mod report;
pub mod settings;

pub use context::{RunConfig, TriggerContext, TriggerKind};
pub use criterion::CriterionSet;
pub use error::{CoreError, CoreResult};
pub use manifest::{EvaluationManifest, ManifestScope, ManifestTools, SCHEMA_VERSION};
pub use outcome::{CriterionResult, Outcome, OutcomeCounts};
pub use report::{CheckConclusion, CheckRunSummary};
pub use settings::{DetectionSettings, EngineSettings, NetworkSettings, ValidatorSettings};
