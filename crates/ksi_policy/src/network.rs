//! Network rule checker.
//!
//! Inspects every security-group-like resource of a [`NetworkInventory`]
//! for sensitive ports exposed to unrestricted addresses, missing explicit
//! ingress, and unrestricted egress. One violation is recorded per
//! offending rule, plus one per group for the group-level checks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use ksi_core::{Outcome, SCHEMA_VERSION};
use ksi_iac::{NetworkInventory, RuleBlock, SecurityGroup};

/// Well-known remote administration and data-store ports.
pub const SENSITIVE_PORTS: &[(u16, &str)] = &[
    (22, "SSH"),
    (23, "Telnet"),
    (3389, "RDP"),
    (3306, "MySQL"),
    (5432, "PostgreSQL"),
    (1433, "MSSQL"),
    (1521, "Oracle"),
    (27017, "MongoDB"),
    (6379, "Redis"),
    (9200, "Elasticsearch"),
    (5900, "VNC"),
    (5901, "VNC"),
    (5902, "VNC"),
    (11211, "Memcached"),
    (2379, "etcd"),
    (2380, "etcd"),
];

/// Addresses meaning "anywhere".
pub const UNRESTRICTED_ADDRESSES: &[&str] = &["0.0.0.0/0", "::/0", "*", "internet", "any"];

/// Protocol values meaning "every protocol".
pub const ALL_PROTOCOLS: &[&str] = &["-1", "all", "*", "any"];

/// Protocols without ports; their port fields carry ICMP type and code.
const PORTLESS_PROTOCOLS: &[&str] = &["icmp", "icmpv6", "1", "58"];

pub fn service_name(port: u16) -> Option<&'static str> {
    SENSITIVE_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, service)| *service)
}

pub fn is_unrestricted_address(address: &str) -> bool {
    let address = address.trim();
    UNRESTRICTED_ADDRESSES
        .iter()
        .any(|u| u.eq_ignore_ascii_case(address))
}

fn protocol_in(rule: &RuleBlock, set: &[&str]) -> bool {
    rule.protocol
        .as_deref()
        .map(|p| set.iter().any(|s| s.eq_ignore_ascii_case(p.trim())))
        .unwrap_or(false)
}

pub fn allows_all_protocols(rule: &RuleBlock) -> bool {
    protocol_in(rule, ALL_PROTOCOLS)
}

/// All ports on all protocols, or the full port range.
pub fn covers_all_ports(rule: &RuleBlock) -> bool {
    allows_all_protocols(rule) || rule.ports.map(|p| p.is_all()).unwrap_or(false)
}

fn unrestricted_cidrs(rule: &RuleBlock) -> Vec<String> {
    rule.cidrs()
        .iter()
        .filter(|c| is_unrestricted_address(c))
        .cloned()
        .collect()
}

/// Sensitive ports a rule opens, ignoring its specifier.
pub fn sensitive_ports(rule: &RuleBlock) -> Vec<u16> {
    if allows_all_protocols(rule) {
        return SENSITIVE_PORTS.iter().map(|(p, _)| *p).collect();
    }
    if protocol_in(rule, PORTLESS_PROTOCOLS) {
        return Vec::new();
    }
    match rule.ports {
        Some(range) => SENSITIVE_PORTS
            .iter()
            .map(|(p, _)| *p)
            .filter(|p| range.contains(*p))
            .collect(),
        None => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    SensitiveExposure,
    MissingIngress,
    UnrestrictedEgress,
    /// AWS groups without egress rules allow all egress
    ImplicitEgress,
}

impl ViolationKind {
    /// Criterion of the network isolation set that reports this kind.
    pub fn criterion_id(&self) -> &'static str {
        match self {
            Self::SensitiveExposure => "CNA01-A",
            Self::MissingIngress => "CNA01-B",
            Self::UnrestrictedEgress | Self::ImplicitEgress => "CNA01-C",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExposedPort {
    pub port: u16,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Security group the rule belongs to; the rule's own address for
    /// standalone rules whose group is not declared
    pub resource: String,
    /// Resource declaring the offending rule, when it is not the group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_resource: Option<String>,
    pub file: String,
    pub line: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exposed_ports: Vec<ExposedPort>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cidrs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
}

impl Violation {
    fn for_rule(kind: ViolationKind, group: Option<&SecurityGroup>, rule: &RuleBlock, message: String) -> Self {
        let resource = group.map(|g| g.address.clone()).unwrap_or_else(|| rule.resource.clone());
        Self {
            kind,
            rule_resource: (rule.resource != resource).then(|| rule.resource.clone()),
            resource,
            file: rule.file.clone(),
            line: rule.line,
            message,
            exposed_ports: Vec::new(),
            cidrs: unrestricted_cidrs(rule),
            protocol: rule.protocol.clone(),
            ports: rule.ports.map(|p| p.to_string()),
        }
    }

    fn for_group(kind: ViolationKind, group: &SecurityGroup, message: impl Into<String>) -> Self {
        Self {
            kind,
            resource: group.address.clone(),
            rule_resource: None,
            file: group.file.clone(),
            line: group.line,
            message: message.into(),
            exposed_ports: Vec::new(),
            cidrs: Vec::new(),
            protocol: None,
            ports: None,
        }
    }
}

/// `declared/network_findings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkFindings {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub security_groups_evaluated: usize,
    pub security_groups_compliant: usize,
    pub rules_evaluated: usize,
    pub violations: Vec<Violation>,
}

impl NetworkFindings {
    /// PASS iff there are no violations.
    pub fn outcome(&self) -> Outcome {
        if self.violations.is_empty() {
            Outcome::Pass
        } else {
            Outcome::Fail
        }
    }

    pub fn of_kind(&self, kinds: &[ViolationKind]) -> Vec<&Violation> {
        self.violations
            .iter()
            .filter(|v| kinds.contains(&v.kind))
            .collect()
    }

    pub fn for_criterion(&self, criterion_id: &str) -> Vec<&Violation> {
        self.violations
            .iter()
            .filter(|v| v.kind.criterion_id() == criterion_id)
            .collect()
    }
}

/// Checks a network inventory against the isolation rules.
#[derive(Debug, Default)]
pub struct NetworkRuleChecker;

impl NetworkRuleChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, network: &NetworkInventory) -> NetworkFindings {
        let mut violations = Vec::new();
        let mut compliant = 0;

        for group in &network.security_groups {
            let before = violations.len();
            self.check_group(group, &mut violations);
            if violations.len() == before {
                compliant += 1;
            }
        }

        // rules whose parent group is not declared: no group-level checks
        for rule in &network.unattached_rules {
            self.check_rule(None, rule, &mut violations);
        }

        info!(
            "Network rule check: {} group(s), {} violation(s)",
            network.security_groups.len(),
            violations.len()
        );

        NetworkFindings {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: network.generated_at,
            security_groups_evaluated: network.security_groups.len(),
            security_groups_compliant: compliant,
            rules_evaluated: network.rule_count(),
            violations,
        }
    }

    fn check_group(&self, group: &SecurityGroup, violations: &mut Vec<Violation>) {
        debug!("Checking {} ({} rule(s))", group.address, group.rules.len());

        if group.kind.requires_explicit_ingress() && group.ingress().next().is_none() {
            violations.push(Violation::for_group(
                ViolationKind::MissingIngress,
                group,
                "No ingress rules defined. Security groups must have explicitly configured ingress restrictions.",
            ));
        }

        for rule in &group.rules {
            self.check_rule(Some(group), rule, violations);
        }

        if group.kind.implicit_egress_allow_all() && group.egress().next().is_none() {
            violations.push(Violation::for_group(
                ViolationKind::ImplicitEgress,
                group,
                "No egress rules defined. AWS defaults to allow all egress, which violates the requirement to limit outbound traffic.",
            ));
        }
    }

    fn check_rule(&self, group: Option<&SecurityGroup>, rule: &RuleBlock, violations: &mut Vec<Violation>) {
        let open = unrestricted_cidrs(rule);
        if open.is_empty() {
            return;
        }

        if rule.is_ingress() {
            let exposed: Vec<ExposedPort> = sensitive_ports(rule)
                .into_iter()
                .filter_map(|port| {
                    service_name(port).map(|service| ExposedPort {
                        port,
                        service: service.to_string(),
                    })
                })
                .collect();
            if !exposed.is_empty() {
                let listed: Vec<String> = exposed
                    .iter()
                    .map(|e| format!("{} ({})", e.port, e.service))
                    .collect();
                let message = format!(
                    "Sensitive port(s) {} exposed to {}",
                    listed.join(", "),
                    open.join(", ")
                );
                let mut violation = Violation::for_rule(ViolationKind::SensitiveExposure, group, rule, message);
                violation.exposed_ports = exposed;
                violations.push(violation);
            }
        } else if covers_all_ports(rule) {
            let message = format!(
                "Unrestricted egress to {} on protocol {} ports {}",
                open.join(", "),
                rule.protocol.as_deref().unwrap_or("(unspecified)"),
                rule.ports.map(|p| p.to_string()).unwrap_or_else(|| "all".to_string())
            );
            violations.push(Violation::for_rule(ViolationKind::UnrestrictedEgress, group, rule, message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ksi_iac::{Direction, PortRange, SecurityGroupKind, Specifier};

    fn rule(direction: Direction, ports: Option<(i64, i64)>, protocol: &str, specifier: Specifier) -> RuleBlock {
        RuleBlock {
            resource: "aws_security_group.sg".to_string(),
            file: "main.tf".to_string(),
            direction,
            ports: ports.map(|(f, t)| PortRange::new(f, t)),
            protocol: Some(protocol.to_string()),
            specifier,
            description: None,
            line: 3,
            dynamic: false,
        }
    }

    fn cidrs(list: &[&str]) -> Specifier {
        Specifier::Cidrs {
            cidrs: list.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn group(address: &str, kind: SecurityGroupKind, rules: Vec<RuleBlock>) -> SecurityGroup {
        SecurityGroup {
            address: address.to_string(),
            kind,
            name: None,
            file: "main.tf".to_string(),
            line: 1,
            rules: rules
                .into_iter()
                .map(|mut r| {
                    r.resource = address.to_string();
                    r
                })
                .collect(),
        }
    }

    fn network(groups: Vec<SecurityGroup>) -> NetworkInventory {
        NetworkInventory {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap(),
            source_files: vec!["main.tf".to_string()],
            security_groups: groups,
            unattached_rules: Vec::new(),
            vpcs: Vec::new(),
            subnets: Vec::new(),
            route_tables: Vec::new(),
            internet_gateways: Vec::new(),
            nat_gateways: Vec::new(),
            load_balancers: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn restricted_egress() -> RuleBlock {
        rule(Direction::Egress, Some((443, 443)), "tcp", cidrs(&["10.0.0.0/8"]))
    }

    #[test]
    fn test_no_groups_passes() {
        let findings = NetworkRuleChecker::new().check(&network(Vec::new()));
        assert_eq!(findings.outcome(), Outcome::Pass);
        assert!(findings.violations.is_empty());
    }

    #[test]
    fn test_ssh_open_to_world() {
        let sg = group(
            "aws_security_group.bastion",
            SecurityGroupKind::AwsSecurityGroup,
            vec![
                rule(Direction::Ingress, Some((22, 22)), "tcp", cidrs(&["0.0.0.0/0"])),
                restricted_egress(),
            ],
        );
        let findings = NetworkRuleChecker::new().check(&network(vec![sg]));
        assert_eq!(findings.outcome(), Outcome::Fail);
        assert_eq!(findings.violations.len(), 1);
        let v = &findings.violations[0];
        assert_eq!(v.kind, ViolationKind::SensitiveExposure);
        assert_eq!(v.resource, "aws_security_group.bastion");
        assert_eq!(v.exposed_ports[0].service, "SSH");
        assert_eq!(v.cidrs, vec!["0.0.0.0/0"]);
    }

    #[test]
    fn test_web_ports_open_to_world_are_fine() {
        let sg = group(
            "aws_security_group.web",
            SecurityGroupKind::AwsSecurityGroup,
            vec![
                rule(Direction::Ingress, Some((443, 443)), "tcp", cidrs(&["0.0.0.0/0", "::/0"])),
                rule(Direction::Ingress, Some((80, 80)), "tcp", cidrs(&["0.0.0.0/0"])),
                restricted_egress(),
            ],
        );
        let findings = NetworkRuleChecker::new().check(&network(vec![sg]));
        assert!(findings.violations.is_empty());
        assert_eq!(findings.security_groups_compliant, 1);
    }

    #[test]
    fn test_range_and_all_protocols() {
        let ranged = rule(Direction::Ingress, Some((3000, 6000)), "tcp", cidrs(&["::/0"]));
        let ports = sensitive_ports(&ranged);
        assert!(ports.contains(&3306));
        assert!(ports.contains(&5432));
        assert!(ports.contains(&5900));
        assert!(!ports.contains(&22));

        let everything = rule(Direction::Ingress, Some((0, 0)), "-1", cidrs(&["0.0.0.0/0"]));
        assert_eq!(sensitive_ports(&everything).len(), SENSITIVE_PORTS.len());

        let icmp = rule(Direction::Ingress, Some((-1, -1)), "icmp", cidrs(&["0.0.0.0/0"]));
        assert!(sensitive_ports(&icmp).is_empty());
    }

    #[test]
    fn test_empty_ingress_flagged_regardless_of_egress() {
        let sg = group(
            "aws_security_group.empty",
            SecurityGroupKind::AwsSecurityGroup,
            vec![restricted_egress()],
        );
        let findings = NetworkRuleChecker::new().check(&network(vec![sg]));
        assert_eq!(findings.violations.len(), 1);
        assert_eq!(findings.violations[0].kind, ViolationKind::MissingIngress);
        assert_eq!(findings.for_criterion("CNA01-B").len(), 1);
    }

    #[test]
    fn test_gcp_firewall_needs_no_ingress() {
        let fw = group(
            "google_compute_firewall.egress_only",
            SecurityGroupKind::GcpFirewall,
            vec![rule(Direction::Egress, Some((443, 443)), "tcp", cidrs(&["0.0.0.0/0"]))],
        );
        let findings = NetworkRuleChecker::new().check(&network(vec![fw]));
        assert!(findings.violations.is_empty());
    }

    #[test]
    fn test_unrestricted_egress() {
        let sg = group(
            "aws_security_group.app",
            SecurityGroupKind::AwsSecurityGroup,
            vec![
                rule(Direction::Ingress, Some((8080, 8080)), "tcp", Specifier::SecurityGroups {
                    groups: vec!["aws_security_group.lb".to_string()],
                }),
                rule(Direction::Egress, Some((0, 0)), "-1", cidrs(&["0.0.0.0/0"])),
                rule(Direction::Egress, Some((0, 65535)), "tcp", cidrs(&["::/0"])),
            ],
        );
        let findings = NetworkRuleChecker::new().check(&network(vec![sg]));
        assert_eq!(findings.violations.len(), 2);
        assert!(findings
            .violations
            .iter()
            .all(|v| v.kind == ViolationKind::UnrestrictedEgress));
        assert_eq!(findings.security_groups_compliant, 0);
    }

    #[test]
    fn test_reference_and_self_egress_never_flagged() {
        let sg = group(
            "aws_security_group.db",
            SecurityGroupKind::AwsSecurityGroup,
            vec![
                rule(Direction::Ingress, Some((5432, 5432)), "tcp", Specifier::SelfRef),
                rule(Direction::Egress, Some((0, 0)), "-1", Specifier::SecurityGroups {
                    groups: vec!["aws_security_group.app".to_string()],
                }),
                rule(Direction::Egress, Some((0, 0)), "-1", Specifier::SelfRef),
            ],
        );
        let findings = NetworkRuleChecker::new().check(&network(vec![sg]));
        assert!(findings.violations.is_empty(), "{:?}", findings.violations);
    }

    #[test]
    fn test_implicit_egress_for_aws_only() {
        let aws = group(
            "aws_security_group.no_egress",
            SecurityGroupKind::AwsSecurityGroup,
            vec![rule(Direction::Ingress, Some((443, 443)), "tcp", cidrs(&["10.0.0.0/8"]))],
        );
        let azure = group(
            "azurerm_network_security_group.nsg",
            SecurityGroupKind::AzureNetworkSecurityGroup,
            vec![rule(Direction::Ingress, Some((443, 443)), "Tcp", cidrs(&["VirtualNetwork"]))],
        );
        let findings = NetworkRuleChecker::new().check(&network(vec![aws, azure]));
        assert_eq!(findings.violations.len(), 1);
        assert_eq!(findings.violations[0].kind, ViolationKind::ImplicitEgress);
        assert_eq!(findings.violations[0].resource, "aws_security_group.no_egress");
    }

    #[test]
    fn test_azure_internet_tag_is_unrestricted() {
        let azure = group(
            "azurerm_network_security_group.nsg",
            SecurityGroupKind::AzureNetworkSecurityGroup,
            vec![rule(Direction::Ingress, Some((3389, 3389)), "Tcp", cidrs(&["Internet"]))],
        );
        let findings = NetworkRuleChecker::new().check(&network(vec![azure]));
        assert_eq!(findings.violations.len(), 1);
        assert_eq!(findings.violations[0].exposed_ports[0].service, "RDP");
    }

    #[test]
    fn test_unattached_rule_still_checked() {
        let mut inventory = network(Vec::new());
        let mut orphan = rule(Direction::Ingress, Some((6379, 6379)), "tcp", cidrs(&["0.0.0.0/0"]));
        orphan.resource = "aws_security_group_rule.redis".to_string();
        inventory.unattached_rules.push(orphan);

        let findings = NetworkRuleChecker::new().check(&inventory);
        assert_eq!(findings.violations.len(), 1);
        assert_eq!(findings.violations[0].resource, "aws_security_group_rule.redis");
        assert!(findings.violations[0].rule_resource.is_none());
    }
}
