//! # ksi_engine
//!
//! One KSI evaluation run, end to end.
//!
//! [`Engine::run`] detects the Terraform surface, extracts the inventory,
//! runs `terraform init` and `terraform validate` through a
//! [`ksi_runner::ToolRunner`], checks declared security groups, and writes
//! one evidence pack per criterion set plus `results.json`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ksi_core::{RunConfig, TriggerContext, TriggerKind};
//! use ksi_engine::Engine;
//! use ksi_runner::ProcessRunner;
//!
//! # async fn run() -> ksi_engine::EngineResult<()> {
//! let config = RunConfig::new("./repo")
//!     .with_root_paths_csv("infra")
//!     .with_trigger(TriggerContext::new(TriggerKind::Schedule));
//! let report = Engine::new(Arc::new(ProcessRunner::new())).run(&config).await?;
//! println!("{}", report.summary_text());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod pipeline;
pub mod report;

pub use error::{EngineError, EngineResult};
pub use pipeline::{Artifacts, Engine};
pub use report::{RunReport, SetReport};
