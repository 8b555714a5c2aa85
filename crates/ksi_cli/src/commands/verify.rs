//! Verify command - recompute an evidence pack's hash listing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ksi_evidence::{verify_archive, verify_pack, VerificationReport};

use super::OutputFormat;
use crate::ExitCodes;

#[derive(Args)]
pub struct VerifyArgs {
    /// Evidence archive (.zip) or unpacked pack directory
    pub path: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub fn execute(args: VerifyArgs) -> Result<u8> {
    let report = verify_path(&args.path)
        .with_context(|| format!("Failed to verify {}", args.path.display()))?;

    match args.format {
        OutputFormat::Text => print_report(&args.path, &report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.is_valid() {
        Ok(ExitCodes::SUCCESS)
    } else {
        Ok(ExitCodes::VERIFICATION_MISMATCH)
    }
}

fn verify_path(path: &std::path::Path) -> ksi_evidence::EvidenceResult<VerificationReport> {
    if path.is_dir() {
        verify_pack(path)
    } else {
        verify_archive(path)
    }
}

fn print_report(path: &std::path::Path, report: &VerificationReport) {
    if report.is_valid() {
        println!("✅ {}: {} files match hashes.sha256", path.display(), report.verified);
        return;
    }
    println!("❌ {}: evidence does not match hashes.sha256", path.display());
    for problem in report.problems() {
        println!("   - {}", problem);
    }
}
