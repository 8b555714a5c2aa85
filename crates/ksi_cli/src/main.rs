//! ksi CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success (any verdict unless `--strict`)
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Evidence pack could not be written
//! - 4: Verdict FAIL under `--strict`
//! - 5: Verdict ERROR under `--strict`
//! - 6: Evidence verification mismatch

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod github;

use commands::{Cli, Commands, LogFormat};
use ksi_core::CoreError;
use ksi_engine::EngineError;
use ksi_evidence::EvidenceError;
use ksi_iac::IacError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const EVIDENCE_ERROR: u8 = 3;
    pub const VERDICT_FAIL: u8 = 4;
    pub const VERDICT_ERROR: u8 = 5;
    pub const VERIFICATION_MISMATCH: u8 = 6;
}

fn init_logging(verbose: bool, format: LogFormat) {
    let default = if verbose { "ksi=debug,info" } else { "ksi=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);

    let log_result = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let result = match cli.command {
        Commands::Evaluate(args) => commands::evaluate::execute(args).await,
        Commands::Verify(args) => commands::verify::execute(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Map an error chain onto an exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(engine) = cause.downcast_ref::<EngineError>() {
            return match engine {
                EngineError::Evidence(_) => ExitCodes::EVIDENCE_ERROR,
                EngineError::Detection(IacError::InvalidPattern { .. }) => ExitCodes::INVALID_ARGS,
                EngineError::Detection(_) => ExitCodes::GENERAL_ERROR,
            };
        }
        if let Some(evidence) = cause.downcast_ref::<EvidenceError>() {
            return match evidence {
                EvidenceError::NotAPack(_) => ExitCodes::INVALID_ARGS,
                _ => ExitCodes::EVIDENCE_ERROR,
            };
        }
        if cause.downcast_ref::<CoreError>().is_some() {
            return ExitCodes::INVALID_ARGS;
        }
    }
    ExitCodes::GENERAL_ERROR
}
