//! Criterion sets evaluated by the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A named battery of criteria that produces one evidence pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CriterionSet {
    /// Continuous machine-based configuration evaluation.
    #[serde(rename = "ksi-mla-05")]
    Mla05,
    /// Network isolation of declared security groups.
    #[serde(rename = "ksi-cna-01")]
    Cna01,
}

impl CriterionSet {
    /// Identifier used in archive names and folder names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mla05 => "ksi-mla-05",
            Self::Cna01 => "ksi-cna-01",
        }
    }

    /// Display label, e.g. `KSI-MLA-05`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mla05 => "KSI-MLA-05",
            Self::Cna01 => "KSI-CNA-01",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Mla05 => "Configuration Evaluation",
            Self::Cna01 => "Network Isolation",
        }
    }

    /// Text of the requirement the set demonstrates.
    pub fn requirement(&self) -> &'static str {
        match self {
            Self::Mla05 => {
                "Perform persistent, machine-based evaluation of infrastructure configuration \
                 declared as code, and retain evidence of each evaluation."
            }
            Self::Cna01 => {
                "Restrict network ingress and egress to explicitly declared, least-privilege \
                 rules, with no sensitive service exposed to unrestricted addresses."
            }
        }
    }

    pub fn all() -> &'static [CriterionSet] {
        &[Self::Mla05, Self::Cna01]
    }
}

impl fmt::Display for CriterionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CriterionSet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ksi-mla-05" | "mla-05" | "mla05" => Ok(Self::Mla05),
            "ksi-cna-01" | "cna-01" | "cna01" => Ok(Self::Cna01),
            other => Err(CoreError::UnknownCriterionSet(other.to_string())),
        }
    }
}
