//! Security-group rule model and network inventory.
//!
//! Every security-group-like resource is flattened into [`RuleBlock`]s,
//! whatever the provider syntax: repeated inline blocks, `dynamic` blocks,
//! Azure `security_rule` blocks, GCP `allow` blocks, and standalone rule
//! resources attached to their parent group.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use ksi_core::SCHEMA_VERSION;

use crate::hcl::{Body, Value};
use crate::inventory::{Diagnostic, Inventory, ResourceDeclaration};

/// Standalone rule resources that attach to a parent group.
pub const STANDALONE_RULE_TYPES: &[&str] = &[
    "aws_security_group_rule",
    "aws_vpc_security_group_ingress_rule",
    "aws_vpc_security_group_egress_rule",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        }
    }

    /// Accepts the AWS, Azure and GCP spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ingress" | "inbound" => Some(Direction::Ingress),
            "egress" | "outbound" => Some(Direction::Egress),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortRange {
    pub from: i64,
    pub to: i64,
}

impl PortRange {
    pub const ALL: PortRange = PortRange { from: 0, to: 65535 };

    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    pub fn single(port: i64) -> Self {
        Self { from: port, to: port }
    }

    /// `0-0` and `-1` are the "all ports" sentinels.
    pub fn is_all(&self) -> bool {
        (self.from == 0 && (self.to == 0 || self.to == 65535)) || self.from == -1 || self.to == -1
    }

    pub fn contains(&self, port: u16) -> bool {
        let port = i64::from(port);
        self.is_all() || (self.from <= port && port <= self.to)
    }

    /// Parse `22`, `8000-8100` or `*`.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if spec == "*" {
            return Some(Self::ALL);
        }
        match spec.split_once('-') {
            Some((from, to)) if !from.is_empty() => {
                Some(Self::new(from.trim().parse().ok()?, to.trim().parse().ok()?))
            }
            _ => spec.parse().ok().map(Self::single),
        }
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

/// Where a rule's traffic comes from (ingress) or goes to (egress).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Specifier {
    Cidrs { cidrs: Vec<String> },
    SecurityGroups { groups: Vec<String> },
    #[serde(rename = "self")]
    SelfRef,
}

/// One flattened rule of a security-group-like resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleBlock {
    /// Address of the resource declaring the rule
    pub resource: String,
    pub file: String,
    pub direction: Direction,
    /// Absent when not declared or not a literal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<PortRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub specifier: Specifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub line: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dynamic: bool,
}

impl RuleBlock {
    pub fn cidrs(&self) -> &[String] {
        match &self.specifier {
            Specifier::Cidrs { cidrs } => cidrs,
            _ => &[],
        }
    }

    pub fn is_ingress(&self) -> bool {
        self.direction == Direction::Ingress
    }

    pub fn is_egress(&self) -> bool {
        self.direction == Direction::Egress
    }
}

/// Resource types whose semantics are an allow-list of network rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityGroupKind {
    AwsSecurityGroup,
    AzureNetworkSecurityGroup,
    GcpFirewall,
}

impl SecurityGroupKind {
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "aws_security_group" => Some(Self::AwsSecurityGroup),
            "azurerm_network_security_group" => Some(Self::AzureNetworkSecurityGroup),
            "google_compute_firewall" => Some(Self::GcpFirewall),
            _ => None,
        }
    }

    /// A firewall resource is a single rule, so an empty ingress set is
    /// simply an egress rule.
    pub fn requires_explicit_ingress(&self) -> bool {
        !matches!(self, Self::GcpFirewall)
    }

    /// AWS allows all egress when a group declares none.
    pub fn implicit_egress_allow_all(&self) -> bool {
        matches!(self, Self::AwsSecurityGroup)
    }
}

/// Whether the resource type carries rule blocks.
pub fn is_rule_bearing(resource_type: &str) -> bool {
    SecurityGroupKind::from_resource_type(resource_type).is_some()
        || STANDALONE_RULE_TYPES.contains(&resource_type)
}

/// Parent group address of a standalone rule resource.
pub(crate) fn parent_group(resource_type: &str, body: &Body) -> Option<String> {
    if !STANDALONE_RULE_TYPES.contains(&resource_type) {
        return None;
    }
    body.attribute("security_group_id").map(group_ref).and_then(|g| g.into_iter().next())
}

/// Flatten the rules of one resource. Returns the rules plus
/// `missing_attribute` warnings.
pub(crate) fn extract_rules(
    resource_type: &str,
    address: &str,
    file: &str,
    line: usize,
    body: &Body,
) -> (Vec<RuleBlock>, Vec<Diagnostic>) {
    let mut extraction = RuleExtraction {
        address,
        file,
        rules: Vec::new(),
        diagnostics: Vec::new(),
    };

    match resource_type {
        "aws_security_group" => {
            for direction in [Direction::Ingress, Direction::Egress] {
                for (rule, rule_line, dynamic) in rule_bodies(body, direction.as_str()) {
                    extraction.aws_rule(direction, rule, rule_line, dynamic, &AWS_INLINE);
                }
            }
        }
        "aws_security_group_rule" => {
            match body.attribute("type").and_then(Value::as_str).and_then(Direction::parse) {
                Some(direction) => extraction.aws_rule(direction, body, line, false, &AWS_RULE),
                None => extraction.missing(line, "type"),
            }
        }
        "aws_vpc_security_group_ingress_rule" => {
            extraction.aws_rule(Direction::Ingress, body, line, false, &AWS_VPC_RULE)
        }
        "aws_vpc_security_group_egress_rule" => {
            extraction.aws_rule(Direction::Egress, body, line, false, &AWS_VPC_RULE)
        }
        "azurerm_network_security_group" => {
            for (rule, rule_line, dynamic) in rule_bodies(body, "security_rule") {
                extraction.azure_rule(rule, rule_line, dynamic);
            }
        }
        "google_compute_firewall" => extraction.gcp_firewall(body, line),
        _ => {}
    }

    debug!("Extracted {} rule(s) from {}", extraction.rules.len(), address);
    (extraction.rules, extraction.diagnostics)
}

/// Attribute names of one AWS rule syntax.
struct AwsFields {
    protocol: &'static str,
    cidrs: &'static [&'static str],
    groups: &'static [&'static str],
    self_flag: Option<&'static str>,
}

const AWS_INLINE: AwsFields = AwsFields {
    protocol: "protocol",
    cidrs: &["cidr_blocks", "ipv6_cidr_blocks"],
    groups: &["security_groups"],
    self_flag: Some("self"),
};

const AWS_RULE: AwsFields = AwsFields {
    protocol: "protocol",
    cidrs: &["cidr_blocks", "ipv6_cidr_blocks"],
    groups: &["source_security_group_id"],
    self_flag: Some("self"),
};

const AWS_VPC_RULE: AwsFields = AwsFields {
    protocol: "ip_protocol",
    cidrs: &["cidr_ipv4", "cidr_ipv6"],
    groups: &["referenced_security_group_id"],
    self_flag: None,
};

const AZURE_SOURCE_PREFIXES: &[&str] = &["source_address_prefix", "source_address_prefixes"];
const AZURE_SOURCE_GROUPS: &[&str] = &["source_application_security_group_ids"];
const AZURE_DESTINATION_PREFIXES: &[&str] =
    &["destination_address_prefix", "destination_address_prefixes"];
const AZURE_DESTINATION_GROUPS: &[&str] = &["destination_application_security_group_ids"];

const GCP_SOURCE_RANGES: &[&str] = &["source_ranges"];
const GCP_SOURCE_TAGS: &[&str] = &["source_tags", "source_service_accounts"];
const GCP_DESTINATION_RANGES: &[&str] = &["destination_ranges"];

struct RuleExtraction<'a> {
    address: &'a str,
    file: &'a str,
    rules: Vec<RuleBlock>,
    diagnostics: Vec<Diagnostic>,
}

/// Fields shared by every specifier split of one source rule.
struct RuleShape {
    direction: Direction,
    ports: Option<PortRange>,
    protocol: Option<String>,
    description: Option<String>,
    line: usize,
    dynamic: bool,
}

impl RuleExtraction<'_> {
    fn missing(&mut self, line: usize, attribute: &str) {
        self.diagnostics.push(Diagnostic::missing_attribute(
            self.address,
            self.file,
            line,
            attribute,
        ));
    }

    fn aws_rule(&mut self, direction: Direction, body: &Body, line: usize, dynamic: bool, fields: &AwsFields) {
        let protocol = self.text(body, fields.protocol, line);
        let ports = match (body.attribute("from_port"), body.attribute("to_port")) {
            (Some(from), Some(to)) => from.as_i64().zip(to.as_i64()).map(|(f, t)| PortRange::new(f, t)),
            _ => {
                // ip_protocol = "-1" carries no ports
                if protocol.as_deref() != Some("-1") {
                    self.missing(line, "from_port/to_port");
                }
                None
            }
        };

        let cidrs = collect(body, fields.cidrs, value_strings);
        let groups = collect(body, fields.groups, group_ref);
        let self_ref = fields
            .self_flag
            .and_then(|attr| body.attribute(attr))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let shape = RuleShape {
            direction,
            ports,
            protocol,
            description: body.attribute("description").and_then(Value::scalar_text),
            line,
            dynamic,
        };
        self.push(shape, cidrs, groups, self_ref);
    }

    fn azure_rule(&mut self, body: &Body, line: usize, dynamic: bool) {
        match body.attribute("access") {
            None => {
                self.missing(line, "access");
                return;
            }
            Some(access) => {
                if let Some(access) = access.as_str() {
                    if !access.eq_ignore_ascii_case("allow") {
                        return;
                    }
                }
            }
        }

        let direction = match body.attribute("direction").and_then(Value::as_str) {
            Some(d) => match Direction::parse(d) {
                Some(direction) => direction,
                None => return,
            },
            None => {
                self.missing(line, "direction");
                return;
            }
        };

        let protocol = self.text(body, "protocol", line);
        let mut ranges: Vec<Option<PortRange>> = ["destination_port_range", "destination_port_ranges"]
            .iter()
            .filter_map(|attr| body.attribute(attr))
            .flat_map(value_strings)
            .map(|spec| PortRange::parse(&spec))
            .collect();
        if ranges.is_empty() {
            self.missing(line, "destination_port_range");
            ranges.push(None);
        }

        let (prefixes, group_ids) = match direction {
            Direction::Ingress => (AZURE_SOURCE_PREFIXES, AZURE_SOURCE_GROUPS),
            Direction::Egress => (AZURE_DESTINATION_PREFIXES, AZURE_DESTINATION_GROUPS),
        };
        let cidrs = collect(body, prefixes, value_strings);
        let groups = collect(body, group_ids, group_ref);
        let description = body.attribute("description").and_then(Value::scalar_text);

        for ports in ranges {
            let shape = RuleShape {
                direction,
                ports,
                protocol: protocol.clone(),
                description: description.clone(),
                line,
                dynamic,
            };
            self.push(shape, cidrs.clone(), groups.clone(), false);
        }
    }

    fn gcp_firewall(&mut self, body: &Body, line: usize) {
        let direction = match body.attribute("direction") {
            None => Direction::Ingress,
            Some(value) => match value.as_str().and_then(Direction::parse) {
                Some(direction) => direction,
                None => {
                    warn!("{}: direction is not a literal, skipping rules", self.address);
                    return;
                }
            },
        };

        let (ranges, tags) = match direction {
            Direction::Ingress => (GCP_SOURCE_RANGES, GCP_SOURCE_TAGS),
            Direction::Egress => (GCP_DESTINATION_RANGES, &[][..]),
        };
        let mut cidrs = collect(body, ranges, value_strings);
        let groups = collect(body, tags, value_strings);
        if cidrs.is_empty() && groups.is_empty() {
            // provider default
            cidrs.push("0.0.0.0/0".to_string());
        }
        let description = body.attribute("description").and_then(Value::scalar_text);

        for (allow, allow_line, dynamic) in rule_bodies(body, "allow") {
            let protocol = self.text(allow, "protocol", allow_line);
            let mut ports: Vec<Option<PortRange>> = allow
                .attribute("ports")
                .map(value_strings)
                .unwrap_or_default()
                .iter()
                .map(|spec| PortRange::parse(spec))
                .collect();
            if ports.is_empty() {
                ports.push(Some(PortRange::ALL));
            }
            for range in ports {
                let shape = RuleShape {
                    direction,
                    ports: range,
                    protocol: protocol.clone(),
                    description: description.clone(),
                    line: allow_line,
                    dynamic,
                };
                self.push(shape, cidrs.clone(), groups.clone(), false);
            }
        }
    }

    /// Split one source rule into a RuleBlock per specifier kind:
    /// CIDRs first, then group references, then self.
    fn push(&mut self, shape: RuleShape, cidrs: Vec<String>, groups: Vec<String>, self_ref: bool) {
        let mut specifiers = Vec::new();
        if !cidrs.is_empty() {
            specifiers.push(Specifier::Cidrs { cidrs });
        }
        if !groups.is_empty() {
            specifiers.push(Specifier::SecurityGroups { groups });
        }
        if self_ref {
            specifiers.push(Specifier::SelfRef);
        }
        if specifiers.is_empty() {
            self.missing(shape.line, "source/destination");
            specifiers.push(Specifier::Cidrs { cidrs: Vec::new() });
        }

        for specifier in specifiers {
            self.rules.push(RuleBlock {
                resource: self.address.to_string(),
                file: self.file.to_string(),
                direction: shape.direction,
                ports: shape.ports,
                protocol: shape.protocol.clone(),
                specifier,
                description: shape.description.clone(),
                line: shape.line,
                dynamic: shape.dynamic,
            });
        }
    }

    /// Literal text of an attribute; absent attributes are warned about.
    fn text(&mut self, body: &Body, attribute: &str, line: usize) -> Option<String> {
        match body.attribute(attribute) {
            Some(value) => value.scalar_text(),
            None => {
                self.missing(line, attribute);
                None
            }
        }
    }
}

/// Bodies of the `kind` blocks of a resource, static or `dynamic`.
fn rule_bodies<'a>(body: &'a Body, kind: &'a str) -> Vec<(&'a Body, usize, bool)> {
    let mut bodies: Vec<(&Body, usize, bool)> = body
        .blocks_of(kind)
        .map(|b| (&b.body, b.line, false))
        .collect();

    for dynamic in body.blocks_of("dynamic").filter(|d| d.label(0) == Some(kind)) {
        if let Some(content) = dynamic.body.blocks_of("content").next() {
            bodies.push((&content.body, dynamic.line, true));
        }
    }
    bodies
}

fn collect(body: &Body, attributes: &[&str], render: fn(&Value) -> Vec<String>) -> Vec<String> {
    attributes
        .iter()
        .filter_map(|attr| body.attribute(attr))
        .flat_map(render)
        .collect()
}

/// Text of every element of a value; references render as traversals.
pub(crate) fn value_strings(value: &Value) -> Vec<String> {
    match value {
        Value::List(items) => items.iter().flat_map(value_strings).collect(),
        Value::Reference(reference) => vec![reference.to_string()],
        Value::Expression(raw) => vec![raw.clone()],
        other => other.scalar_text().into_iter().collect(),
    }
}

/// Group references resolve to their `type.name` address.
fn group_ref(value: &Value) -> Vec<String> {
    match value {
        Value::List(items) => items.iter().flat_map(group_ref).collect(),
        Value::Reference(reference) => {
            vec![reference.resource_address().unwrap_or_else(|| reference.to_string())]
        }
        other => value_strings(other),
    }
}

/// A security-group-like resource with all of its rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityGroup {
    pub address: String,
    pub kind: SecurityGroupKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub file: String,
    pub line: usize,
    pub rules: Vec<RuleBlock>,
}

impl SecurityGroup {
    pub fn ingress(&self) -> impl Iterator<Item = &RuleBlock> {
        self.rules.iter().filter(|r| r.is_ingress())
    }

    pub fn egress(&self) -> impl Iterator<Item = &RuleBlock> {
        self.rules.iter().filter(|r| r.is_egress())
    }
}

/// Non-group network resource kept for context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextResource {
    pub address: String,
    pub file: String,
    pub line: usize,
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy)]
enum ContextCategory {
    Vpc,
    Subnet,
    RouteTable,
    InternetGateway,
    NatGateway,
    LoadBalancer,
}

fn context_category(resource_type: &str) -> Option<(ContextCategory, &'static [&'static str])> {
    let entry: (ContextCategory, &'static [&'static str]) = match resource_type {
        "aws_vpc" => (ContextCategory::Vpc, &["cidr_block"]),
        "azurerm_virtual_network" => (ContextCategory::Vpc, &["address_space"]),
        "google_compute_network" => (ContextCategory::Vpc, &["auto_create_subnetworks"]),
        "aws_subnet" => (
            ContextCategory::Subnet,
            &["vpc_id", "cidr_block", "map_public_ip_on_launch", "availability_zone"],
        ),
        "azurerm_subnet" => (ContextCategory::Subnet, &["virtual_network_name", "address_prefixes"]),
        "google_compute_subnetwork" => (ContextCategory::Subnet, &["network", "ip_cidr_range"]),
        "aws_route_table" => (ContextCategory::RouteTable, &["vpc_id", "route"]),
        "aws_internet_gateway" => (ContextCategory::InternetGateway, &["vpc_id"]),
        "aws_nat_gateway" => (ContextCategory::NatGateway, &["subnet_id", "allocation_id"]),
        "aws_lb" | "aws_alb" => (
            ContextCategory::LoadBalancer,
            &["internal", "load_balancer_type", "security_groups", "subnets"],
        ),
        _ => return None,
    };
    Some(entry)
}

/// `declared/network_inventory.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkInventory {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub source_files: Vec<String>,
    pub security_groups: Vec<SecurityGroup>,
    /// Standalone rules whose parent group is not declared
    pub unattached_rules: Vec<RuleBlock>,
    pub vpcs: Vec<ContextResource>,
    pub subnets: Vec<ContextResource>,
    pub route_tables: Vec<ContextResource>,
    pub internet_gateways: Vec<ContextResource>,
    pub nat_gateways: Vec<ContextResource>,
    pub load_balancers: Vec<ContextResource>,
    pub diagnostics: Vec<Diagnostic>,
}

impl NetworkInventory {
    /// Group every rule under its security group.
    ///
    /// Standalone rules are attached through the `type.name` index, built
    /// before any rule is placed so declaration order does not matter. A
    /// rule only attaches to a group declared in its own module directory.
    pub fn from_inventory(inventory: &Inventory) -> Self {
        let index = inventory.index();
        let mut groups: Vec<SecurityGroup> = Vec::new();
        let mut positions: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        let mut network = Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: inventory.generated_at,
            source_files: inventory.files_analyzed.clone(),
            security_groups: Vec::new(),
            unattached_rules: Vec::new(),
            vpcs: Vec::new(),
            subnets: Vec::new(),
            route_tables: Vec::new(),
            internet_gateways: Vec::new(),
            nat_gateways: Vec::new(),
            load_balancers: Vec::new(),
            diagnostics: Vec::new(),
        };

        for resource in &inventory.resources {
            if let Some(kind) = SecurityGroupKind::from_resource_type(&resource.resource_type) {
                positions
                    .entry((resource.directory(), resource.address.as_str()))
                    .or_insert(groups.len());
                groups.push(SecurityGroup {
                    address: resource.address.clone(),
                    kind,
                    name: resource.attributes.get("name").and_then(Value::scalar_text),
                    file: resource.file.clone(),
                    line: resource.line,
                    rules: resource.rule_blocks.clone(),
                });
            } else if let Some((category, attributes)) = context_category(&resource.resource_type) {
                network.push_context(category, context_resource(resource, attributes));
            }
        }

        for resource in inventory.resources.iter().filter(|r| r.attaches_to.is_some()) {
            let parent = resource.attaches_to.as_deref().unwrap_or_default();
            let position = index
                .get(resource.directory(), parent)
                .and_then(|p| positions.get(&(p.directory(), p.address.as_str())).copied());
            match position {
                Some(position) => groups[position].rules.extend(resource.rule_blocks.iter().cloned()),
                None => {
                    warn!("{}: parent group {} is not declared", resource.address, parent);
                    network.diagnostics.push(Diagnostic::unresolved_parent(
                        &resource.address,
                        &resource.file,
                        resource.line,
                        parent,
                    ));
                    network.unattached_rules.extend(resource.rule_blocks.iter().cloned());
                }
            }
        }

        network.security_groups = groups;
        network
    }

    fn push_context(&mut self, category: ContextCategory, resource: ContextResource) {
        let target = match category {
            ContextCategory::Vpc => &mut self.vpcs,
            ContextCategory::Subnet => &mut self.subnets,
            ContextCategory::RouteTable => &mut self.route_tables,
            ContextCategory::InternetGateway => &mut self.internet_gateways,
            ContextCategory::NatGateway => &mut self.nat_gateways,
            ContextCategory::LoadBalancer => &mut self.load_balancers,
        };
        target.push(resource);
    }

    pub fn group(&self, address: &str) -> Option<&SecurityGroup> {
        self.security_groups.iter().find(|g| g.address == address)
    }

    pub fn rule_count(&self) -> usize {
        self.security_groups.iter().map(|g| g.rules.len()).sum::<usize>() + self.unattached_rules.len()
    }
}

fn context_resource(resource: &ResourceDeclaration, attributes: &[&str]) -> ContextResource {
    ContextResource {
        address: resource.address.clone(),
        file: resource.file.clone(),
        line: resource.line,
        attributes: attributes
            .iter()
            .filter_map(|a| resource.attributes.get(*a).map(|v| (a.to_string(), v.clone())))
            .collect(),
    }
}
