//! Criterion catalogue.
//!
//! Fixed definitions for every criterion the engine evaluates. Rationale
//! text always starts with the definition's reason for the outcome.

use ksi_core::{CriterionResult, CriterionSet, Outcome};

use crate::error::{PolicyError, PolicyResult};

/// Static description of one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriterionDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub pass_reason: &'static str,
    pub fail_reason: &'static str,
    pub error_reason: &'static str,
    /// Reported with the set but excluded from its status
    pub advisory: bool,
}

impl CriterionDefinition {
    fn reason(&self, outcome: Outcome) -> &'static str {
        match outcome {
            Outcome::Pass => self.pass_reason,
            Outcome::Fail => self.fail_reason,
            Outcome::Error => self.error_reason,
        }
    }

    /// Build a result; `detail` is appended to the outcome's reason.
    pub fn result(&self, outcome: Outcome, detail: impl AsRef<str>) -> CriterionResult {
        let detail = detail.as_ref().trim();
        let rationale = if detail.is_empty() {
            self.reason(outcome).to_string()
        } else {
            format!("{} {}", self.reason(outcome), detail)
        };
        let result = CriterionResult::new(self.id, self.name, outcome, rationale);
        if self.advisory {
            result.advisory()
        } else {
            result
        }
    }

    pub fn pass(&self, detail: impl AsRef<str>) -> CriterionResult {
        self.result(Outcome::Pass, detail)
    }

    pub fn fail(&self, detail: impl AsRef<str>) -> CriterionResult {
        self.result(Outcome::Fail, detail)
    }

    pub fn error(&self, detail: impl AsRef<str>) -> CriterionResult {
        self.result(Outcome::Error, detail)
    }
}

pub const MLA05_A: CriterionDefinition = CriterionDefinition {
    id: "MLA05-A",
    name: "Configuration Surface in Scope",
    description: "Terraform configuration surface detected and in scope for evaluation.",
    pass_reason: "Terraform configuration files detected in repository.",
    fail_reason: "No Terraform configuration files detected in repository.",
    error_reason: "Configuration surface could not be determined.",
    advisory: false,
};

pub const MLA05_B: CriterionDefinition = CriterionDefinition {
    id: "MLA05-B",
    name: "Machine-Based Evaluation Performed",
    description: "Machine-based evaluation of Terraform configuration completed successfully.",
    pass_reason: "Terraform init and validate completed successfully.",
    fail_reason: "Terraform validation failed.",
    error_reason: "Terraform evaluation could not be completed due to tooling error.",
    advisory: false,
};

pub const MLA05_C: CriterionDefinition = CriterionDefinition {
    id: "MLA05-C",
    name: "Persistent Cycle Configured",
    description: "Evaluation is configured to run as part of a persistent (scheduled) cycle.",
    pass_reason: "Workflow triggered by scheduled event, confirming persistent cycle.",
    fail_reason: "Workflow not triggered by schedule. Persistent cycle not demonstrated.",
    error_reason: "Trigger context could not be determined.",
    advisory: false,
};

pub const MLA05_D: CriterionDefinition = CriterionDefinition {
    id: "MLA05-D",
    name: "Evidence Artifacts Generated",
    description: "Required evidence artifacts have been generated and are available.",
    pass_reason: "Evidence pack generated with all required files.",
    fail_reason: "Evidence pack could not be generated or is incomplete.",
    error_reason: "Evidence generation failed due to an internal error.",
    advisory: false,
};

pub const MLA05_N: CriterionDefinition = CriterionDefinition {
    id: "MLA05-N",
    name: "Network Isolation (advisory)",
    description: "Declared security groups satisfy the network isolation rules.",
    pass_reason: "No network isolation violations found in declared security groups.",
    fail_reason: "Network isolation violations found in declared security groups.",
    error_reason: "Network isolation could not be fully evaluated.",
    advisory: true,
};

pub const CNA01_A: CriterionDefinition = CriterionDefinition {
    id: "CNA01-A",
    name: "Ingress Restrictions",
    description: "No unrestricted inbound access on sensitive ports (SSH, RDP, database ports, etc.)",
    pass_reason: "No sensitive ports are exposed to unrestricted internet access (0.0.0.0/0).",
    fail_reason: "One or more sensitive ports are exposed to unrestricted internet access (0.0.0.0/0).",
    error_reason: "Ingress rules could not be fully evaluated.",
    advisory: false,
};

pub const CNA01_B: CriterionDefinition = CriterionDefinition {
    id: "CNA01-B",
    name: "Explicit Ingress Rules",
    description: "All security groups have explicitly defined ingress rules.",
    pass_reason: "All security groups have at least one explicitly defined ingress rule.",
    fail_reason: "One or more security groups have no ingress rules defined.",
    error_reason: "Ingress rules could not be fully evaluated.",
    advisory: false,
};

pub const CNA01_C: CriterionDefinition = CriterionDefinition {
    id: "CNA01-C",
    name: "Egress Restrictions",
    description: "Outbound traffic is explicitly limited (no unrestricted egress to 0.0.0.0/0 on all ports).",
    pass_reason: "All security groups have restricted egress (port-limited, CIDR-limited, or SG-referenced).",
    fail_reason: "One or more security groups have unrestricted egress (0.0.0.0/0 on all ports).",
    error_reason: "Egress rules could not be fully evaluated.",
    advisory: false,
};

pub const CNA01_D: CriterionDefinition = CriterionDefinition {
    id: "CNA01-D",
    name: "Persistent Evaluation",
    description: "Evaluation is triggered by scheduled automation.",
    pass_reason: "Workflow triggered by scheduled event, confirming persistent evaluation cycle.",
    fail_reason: "Workflow not triggered by schedule. Persistent evaluation cycle not demonstrated.",
    error_reason: "Trigger context could not be determined.",
    advisory: false,
};

const MLA05: &[CriterionDefinition] = &[MLA05_A, MLA05_B, MLA05_C, MLA05_D, MLA05_N];
const CNA01: &[CriterionDefinition] = &[CNA01_A, CNA01_B, CNA01_C, CNA01_D];

/// Every criterion of a set, in report order.
pub fn definitions(set: CriterionSet) -> &'static [CriterionDefinition] {
    match set {
        CriterionSet::Mla05 => MLA05,
        CriterionSet::Cna01 => CNA01,
    }
}

/// Look up a criterion by ID, e.g. `MLA05-B`.
pub fn definition(id: &str) -> PolicyResult<&'static CriterionDefinition> {
    CriterionSet::all()
        .iter()
        .flat_map(|set| definitions(*set).iter())
        .find(|d| d.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| PolicyError::UnknownCriterion(id.to_string()))
}
