//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};

pub mod evaluate;
pub mod verify;

/// ksi - FedRAMP KSI evaluation and evidence collection for Terraform
#[derive(Parser)]
#[command(name = "ksi")]
#[command(version, about = "FedRAMP KSI evaluation and evidence collection for Terraform")]
#[command(long_about = r#"
ksi evaluates a Terraform repository against FedRAMP Key Security Indicators
and writes a tamper-evident evidence pack per criterion set.

CRITERION SETS:
  ksi-mla-05  → Configuration evaluation (surface, validation, schedule, evidence)
  ksi-cna-01  → Network isolation (ingress, explicit ingress, egress, schedule)

COMMANDS:
  evaluate    → Run the evaluation and build evidence packs
  verify      → Recompute the hash listing of an evidence pack

EXIT CODES:
  0 - Success (any verdict unless --strict)
  1 - General error
  2 - Invalid arguments
  3 - Evidence pack could not be written
  4 - Verdict FAIL (--strict)
  5 - Verdict ERROR (--strict)
  6 - Evidence verification mismatch
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate the repository and build evidence packs
    Evaluate(evaluate::EvaluateArgs),

    /// Verify an evidence archive or unpacked pack directory
    Verify(verify::VerifyArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Format of the command's own stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
