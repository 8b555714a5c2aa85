//! # ksi_runner
//!
//! External tool execution for KSI evidence collection.
//!
//! Every call to a third-party binary (Terraform and friends) goes through the
//! [`ToolRunner`] trait so the pipeline can be exercised without the tool
//! installed.
//!
//! # Features
//!
//! - **Bounded execution**: every invocation carries a timeout; on expiry the
//!   child process is killed and [`RunnerError::Timeout`] is returned
//! - **Tooling failure taxonomy**: missing binary, non-executable binary and
//!   timeout are distinct errors, never confused with a non-zero exit
//! - **Mock Runner**: scripted responses and call capture for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use ksi_runner::{ProcessRunner, ToolInvocation, ToolRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::new();
//!     let invocation = ToolInvocation::new("terraform")
//!         .arg("validate")
//!         .arg("-no-color")
//!         .workdir("infra")
//!         .timeout(120);
//!
//!     let result = runner.run(&invocation).await?;
//!     println!("Exit code: {}", result.exit_code);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod process;
pub mod runner;

pub use config::ToolInvocation;
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockOutcome, MockResponse, MockRunner};
pub use process::ProcessRunner;
pub use runner::{ExecutionResult, ToolRunner};
