//! Inventory extraction: parse declaration files into the resource,
//! provider and module graph.
//!
//! A malformed file is recorded as a [`ParseError`] and skipped; every other
//! file is still extracted. After all files are read, a resolution pass over
//! the `type.name` index records references to undeclared resources, data
//! sources and modules. Addresses are scoped to the module directory of the
//! declaring file, so `envs/dev` and `envs/prod` never see each other.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use ksi_core::SCHEMA_VERSION;

use crate::detect::DetectionResult;
use crate::error::ParseError;
use crate::hcl::{self, Block, Body, Reference, Scalar, Value};
use crate::network::{self, RuleBlock};
use crate::provider::CloudProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    DanglingReference,
    MissingAttribute,
    UnresolvedParent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A finding about the declarations that is not a syntax error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Address of the declaring block
    pub address: String,
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn dangling_reference(address: &str, file: &str, line: usize, target: &str) -> Self {
        Self {
            kind: DiagnosticKind::DanglingReference,
            severity: Severity::Error,
            address: address.to_string(),
            file: file.to_string(),
            line,
            message: format!("reference to undeclared {}", target),
        }
    }

    pub fn missing_attribute(address: &str, file: &str, line: usize, attribute: &str) -> Self {
        Self {
            kind: DiagnosticKind::MissingAttribute,
            severity: Severity::Warning,
            address: address.to_string(),
            file: file.to_string(),
            line,
            message: format!("missing attribute '{}'", attribute),
        }
    }

    pub fn unresolved_parent(address: &str, file: &str, line: usize, parent: &str) -> Self {
        Self {
            kind: DiagnosticKind::UnresolvedParent,
            severity: Severity::Warning,
            address: address.to_string(),
            file: file.to_string(),
            line,
            message: format!("parent group '{}' is not declared", parent),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}: {}", self.file, self.line, self.address, self.message)
    }
}

/// Module directory of a declaration file, `.` for the workspace itself.
pub fn module_dir(file: &str) -> &str {
    file.rsplit_once('/').map_or(".", |(dir, _)| dir)
}

/// A managed resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDeclaration {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    /// `type.name`
    pub address: String,
    pub file: String,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<CloudProvider>,
    /// Attributes and nested blocks; absent attributes are not defaulted
    pub attributes: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rule_blocks: Vec<RuleBlock>,
    /// Parent group of a standalone rule resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attaches_to: Option<String>,
}

impl ResourceDeclaration {
    /// Module directory whose namespace the address belongs to.
    pub fn directory(&self) -> &str {
        module_dir(&self.file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSource {
    #[serde(rename = "type")]
    pub data_type: String,
    pub name: String,
    pub address: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provider {
    pub name: String,
    pub source: Option<String>,
    pub version_constraint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub declared_in: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    pub name: String,
    pub source: Option<String>,
    pub version: Option<String>,
    pub declared_in: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceTypeSummary {
    pub count: usize,
    pub files: Vec<String>,
}

/// `declared/terraform_inventory.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inventory {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub terraform_paths: Vec<String>,
    pub files_analyzed: Vec<String>,
    pub resource_count: usize,
    pub resources_by_type: BTreeMap<String, ResourceTypeSummary>,
    pub resources: Vec<ResourceDeclaration>,
    pub data_sources: Vec<DataSource>,
    pub providers: Vec<Provider>,
    pub modules: Vec<Module>,
    pub variable_count: usize,
    pub output_count: usize,
    pub parse_errors: Vec<ParseError>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Inventory {
    /// Parse errors and dangling references make the inventory unusable;
    /// warnings do not.
    pub fn is_usable(&self) -> bool {
        self.parse_errors.is_empty() && !self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Every parse error and error diagnostic, rendered.
    pub fn blocking_issues(&self) -> Vec<String> {
        self.parse_errors
            .iter()
            .map(ToString::to_string)
            .chain(
                self.diagnostics
                    .iter()
                    .filter(|d| d.is_error())
                    .map(ToString::to_string),
            )
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error()).collect()
    }

    pub fn index(&self) -> ResourceIndex<'_> {
        ResourceIndex::new(&self.resources, &self.data_sources, &self.modules)
    }

    pub fn resource(&self, address: &str) -> Option<&ResourceDeclaration> {
        self.resources.iter().find(|r| r.address == address)
    }

    /// Resource declared at `address` in module directory `dir`.
    pub fn resource_in(&self, dir: &str, address: &str) -> Option<&ResourceDeclaration> {
        self.resources
            .iter()
            .find(|r| r.address == address && r.directory() == dir)
    }
}

/// Lookup of declared addresses, built once before any cross-resource
/// resolution. Keys are `(module directory, address)`.
pub struct ResourceIndex<'a> {
    resources: HashMap<(&'a str, &'a str), &'a ResourceDeclaration>,
    data_sources: HashSet<(&'a str, &'a str)>,
    modules: HashSet<(&'a str, &'a str)>,
}

impl<'a> ResourceIndex<'a> {
    pub fn new(
        resources: &'a [ResourceDeclaration],
        data_sources: &'a [DataSource],
        modules: &'a [Module],
    ) -> Self {
        let mut by_address = HashMap::new();
        for resource in resources {
            // first declaration wins; terraform rejects duplicates anyway
            by_address
                .entry((resource.directory(), resource.address.as_str()))
                .or_insert(resource);
        }
        Self {
            resources: by_address,
            data_sources: data_sources
                .iter()
                .map(|d| (module_dir(&d.file), d.address.as_str()))
                .collect(),
            modules: modules
                .iter()
                .map(|m| (module_dir(&m.declared_in), m.name.as_str()))
                .collect(),
        }
    }

    /// Resource `address` as seen from module directory `dir`.
    pub fn get(&self, dir: &str, address: &str) -> Option<&'a ResourceDeclaration> {
        self.resources.get(&(dir, address)).copied()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Description of the missing target, when a reference made from
    /// module directory `dir` points at a resource, data source or module
    /// that directory does not declare.
    pub fn unresolved(&self, dir: &str, reference: &Reference) -> Option<String> {
        if let Some(address) = reference.resource_address() {
            return (!self.resources.contains_key(&(dir, address.as_str())))
                .then(|| format!("resource '{}'", address));
        }
        if let Some(address) = reference.data_address() {
            return (!self.data_sources.contains(&(dir, address.as_str())))
                .then(|| format!("data source '{}'", address));
        }
        if let Some(name) = reference.module_name() {
            return (!self.modules.contains(&(dir, name))).then(|| format!("module '{}'", name));
        }
        None
    }
}

/// Builds an [`Inventory`] from a detection result.
#[derive(Debug, Default)]
pub struct InventoryExtractor;

impl InventoryExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, detection: &DetectionResult) -> Inventory {
        let mut builder = InventoryBuilder::default();

        for unreadable in &detection.unreadable {
            builder
                .parse_errors
                .push(ParseError::unreadable(&unreadable.path, &unreadable.error));
        }

        for file in &detection.files {
            match hcl::parse(&file.text) {
                Ok(body) => {
                    debug!("Parsed {} ({} blocks)", file.path, body.blocks.len());
                    builder.add_file(&file.path, &body);
                    builder.parsed.push((file.path.clone(), body));
                }
                Err(err) => {
                    warn!("Failed to parse {}: {}", file.path, err);
                    builder.parse_errors.push(ParseError::from_syntax(&file.path, err));
                }
            }
        }

        let inventory = builder.finish(detection);
        info!(
            "Inventory: {} resource(s), {} provider(s), {} module(s), {} parse error(s), {} diagnostic(s)",
            inventory.resource_count,
            inventory.providers.len(),
            inventory.modules.len(),
            inventory.parse_errors.len(),
            inventory.diagnostics.len()
        );
        inventory
    }
}

#[derive(Default)]
struct InventoryBuilder {
    resources: Vec<ResourceDeclaration>,
    data_sources: Vec<DataSource>,
    providers: Vec<Provider>,
    modules: Vec<Module>,
    variable_count: usize,
    output_count: usize,
    parse_errors: Vec<ParseError>,
    diagnostics: Vec<Diagnostic>,
    parsed: Vec<(String, Body)>,
}

impl InventoryBuilder {
    fn add_file(&mut self, file: &str, body: &Body) {
        for block in &body.blocks {
            match block.kind.as_str() {
                "resource" => self.add_resource(file, block),
                "data" => self.add_data_source(file, block),
                "provider" => self.add_provider_block(file, block),
                "terraform" => self.add_required_providers(file, block),
                "module" => self.add_module(file, block),
                "variable" => self.variable_count += 1,
                "output" => self.output_count += 1,
                _ => {}
            }
        }
    }

    fn label_error(&mut self, file: &str, block: &Block, expected: usize) {
        self.parse_errors.push(ParseError {
            file: file.to_string(),
            line: block.line,
            column: 1,
            message: format!(
                "{} block requires {} label(s), found {}",
                block.kind,
                expected,
                block.labels.len()
            ),
        });
    }

    fn add_resource(&mut self, file: &str, block: &Block) {
        let (Some(resource_type), Some(name), 2) = (block.label(0), block.label(1), block.labels.len())
        else {
            self.label_error(file, block, 2);
            return;
        };

        let address = format!("{}.{}", resource_type, name);
        let rule_blocks = if network::is_rule_bearing(resource_type) {
            let (rules, warnings) =
                network::extract_rules(resource_type, &address, file, block.line, &block.body);
            self.diagnostics.extend(warnings);
            rules
        } else {
            Vec::new()
        };

        self.resources.push(ResourceDeclaration {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            address,
            file: file.to_string(),
            line: block.line,
            provider: CloudProvider::from_resource_type(resource_type),
            attributes: block.body.to_value_map(),
            rule_blocks,
            attaches_to: network::parent_group(resource_type, &block.body),
        });
    }

    fn add_data_source(&mut self, file: &str, block: &Block) {
        let (Some(data_type), Some(name), 2) = (block.label(0), block.label(1), block.labels.len())
        else {
            self.label_error(file, block, 2);
            return;
        };
        self.data_sources.push(DataSource {
            data_type: data_type.to_string(),
            name: name.to_string(),
            address: format!("data.{}.{}", data_type, name),
            file: file.to_string(),
            line: block.line,
        });
    }

    fn add_provider_block(&mut self, file: &str, block: &Block) {
        let (Some(name), 1) = (block.label(0), block.labels.len()) else {
            self.label_error(file, block, 1);
            return;
        };
        let alias = block.body.attribute("alias").and_then(Value::scalar_text);
        let version = block.body.attribute("version").and_then(Value::scalar_text);
        self.merge_provider(Provider {
            name: name.to_string(),
            source: None,
            version_constraint: version,
            aliases: alias.into_iter().collect(),
            declared_in: file.to_string(),
        });
    }

    fn add_required_providers(&mut self, file: &str, block: &Block) {
        for required in block.body.blocks_of("required_providers") {
            for attribute in &required.body.attributes {
                let (source, version) = match &attribute.value {
                    Value::Block(config) => (
                        config.get("source").and_then(Value::scalar_text),
                        config.get("version").and_then(Value::scalar_text),
                    ),
                    // legacy `aws = "~> 4.0"`
                    other => (None, other.scalar_text()),
                };
                self.merge_provider(Provider {
                    name: attribute.name.clone(),
                    source,
                    version_constraint: version,
                    aliases: Vec::new(),
                    declared_in: file.to_string(),
                });
            }
        }
    }

    /// Providers are de-duplicated by name; the first declaration keeps its
    /// file, later ones fill in missing details and aliases.
    fn merge_provider(&mut self, provider: Provider) {
        match self.providers.iter_mut().find(|p| p.name == provider.name) {
            Some(existing) => {
                if existing.source.is_none() {
                    existing.source = provider.source;
                }
                if existing.version_constraint.is_none() {
                    existing.version_constraint = provider.version_constraint;
                }
                for alias in provider.aliases {
                    if !existing.aliases.contains(&alias) {
                        existing.aliases.push(alias);
                    }
                }
            }
            None => self.providers.push(provider),
        }
    }

    fn add_module(&mut self, file: &str, block: &Block) {
        let (Some(name), 1) = (block.label(0), block.labels.len()) else {
            self.label_error(file, block, 1);
            return;
        };
        self.modules.push(Module {
            name: name.to_string(),
            source: block.body.attribute("source").and_then(Value::scalar_text),
            version: block.body.attribute("version").and_then(Value::scalar_text),
            declared_in: file.to_string(),
        });
    }

    fn resolve_references(&mut self) {
        let index = ResourceIndex::new(&self.resources, &self.data_sources, &self.modules);
        let mut dangling = Vec::new();

        for (file, body) in &self.parsed {
            for block in &body.blocks {
                let Some(address) = block_address(block) else {
                    continue;
                };
                let mut uses = Vec::new();
                collect_body(&block.body, &mut Vec::new(), &mut uses);

                let dir = module_dir(file);
                let mut reported = BTreeSet::new();
                for (reference, line) in uses {
                    if let Some(target) = index.unresolved(dir, &reference) {
                        if reported.insert(target.clone()) {
                            debug!("{}: dangling reference {}", address, reference);
                            dangling.push(Diagnostic::dangling_reference(&address, file, line, &target));
                        }
                    }
                }
            }
        }

        if !dangling.is_empty() {
            warn!("{} dangling reference(s) found", dangling.len());
        }
        self.diagnostics.extend(dangling);
    }

    fn finish(mut self, detection: &DetectionResult) -> Inventory {
        self.resolve_references();

        let mut resources_by_type: BTreeMap<String, ResourceTypeSummary> = BTreeMap::new();
        for resource in &self.resources {
            let summary = resources_by_type.entry(resource.resource_type.clone()).or_default();
            summary.count += 1;
            if !summary.files.contains(&resource.file) {
                summary.files.push(resource.file.clone());
                summary.files.sort();
            }
        }

        let mut files_analyzed: Vec<String> = detection
            .files
            .iter()
            .map(|f| f.path.clone())
            .chain(detection.unreadable.iter().map(|u| u.path.clone()))
            .collect();
        files_analyzed.sort();

        Inventory {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: detection.scanned_at,
            terraform_paths: detection.surface_paths.clone(),
            files_analyzed,
            resource_count: self.resources.len(),
            resources_by_type,
            resources: self.resources,
            data_sources: self.data_sources,
            providers: self.providers,
            modules: self.modules,
            variable_count: self.variable_count,
            output_count: self.output_count,
            parse_errors: self.parse_errors,
            diagnostics: self.diagnostics,
        }
    }
}

/// Address used in diagnostics for blocks whose references are resolved.
fn block_address(block: &Block) -> Option<String> {
    let address = match (block.kind.as_str(), block.label(0), block.label(1)) {
        ("resource", Some(t), Some(n)) => format!("{}.{}", t, n),
        ("data", Some(t), Some(n)) => format!("data.{}.{}", t, n),
        ("module", Some(n), _) => format!("module.{}", n),
        ("output", Some(n), _) => format!("output.{}", n),
        ("provider", Some(n), _) => format!("provider.{}", n),
        ("locals", _, _) => "locals".to_string(),
        _ => return None,
    };
    Some(address)
}

/// Collect every reference in a body with the line it appears on.
/// `scoped` holds iterator names of enclosing `dynamic` blocks.
fn collect_body(body: &Body, scoped: &mut Vec<String>, out: &mut Vec<(Reference, usize)>) {
    for attribute in &body.attributes {
        let mut found = Vec::new();
        attribute.value.walk(&mut |value| match value {
            Value::Reference(reference) => found.push(reference.clone()),
            Value::Expression(raw) => found.extend(scan_expression(raw)),
            Value::Scalar(Scalar::String(text)) if text.contains("${") => {
                found.extend(scan_template(text))
            }
            _ => {}
        });
        out.extend(
            found
                .into_iter()
                .filter(|r| !scoped.iter().any(|s| s == r.root()))
                .map(|r| (r, attribute.line)),
        );
    }

    for block in &body.blocks {
        let iterator = if block.kind == "dynamic" {
            block
                .body
                .attribute("iterator")
                .and_then(Value::as_reference)
                .map(|r| r.root().to_string())
                .or_else(|| block.label(0).map(str::to_string))
        } else {
            None
        };

        match iterator {
            Some(name) => {
                scoped.push(name);
                collect_body(&block.body, scoped, out);
                scoped.pop();
            }
            None => collect_body(&block.body, scoped, out),
        }
    }
}

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn string_literal() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, r#""(?:[^"\\]|\\.)*""#)
}

fn interpolation() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, r"(?:^|[^$])\$\{([^}]*)\}")
}

fn traversal() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&CELL, r"(?:^|[^\w.\-])([A-Za-z_][\w-]*(?:\.[\w*-]+)+)")
}

fn for_iterator() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    cached(
        &CELL,
        r"\bfor\s+([A-Za-z_][\w-]*)(?:\s*,\s*([A-Za-z_][\w-]*))?\s+in\b",
    )
}

/// References inside raw expression text. String literals are blanked
/// first; their interpolations are scanned separately.
fn scan_expression(raw: &str) -> Vec<Reference> {
    let mut references = Vec::new();
    let stripped = match string_literal() {
        Some(literal) => {
            for m in literal.find_iter(raw) {
                references.extend(scan_template(m.as_str()));
            }
            literal.replace_all(raw, "\"\"").into_owned()
        }
        None => raw.to_string(),
    };

    let iterators: HashSet<&str> = for_iterator()
        .map(|re| {
            re.captures_iter(&stripped)
                .flat_map(|c| [c.get(1), c.get(2)])
                .flatten()
                .map(|m| m.as_str())
                .collect()
        })
        .unwrap_or_default();

    if let Some(re) = traversal() {
        for capture in re.captures_iter(&stripped) {
            if let Some(m) = capture.get(1) {
                let reference = Reference::new(m.as_str().split('.'));
                if !iterators.contains(reference.root()) {
                    references.push(reference);
                }
            }
        }
    }
    references
}

/// References inside the `${...}` sequences of a template string.
fn scan_template(text: &str) -> Vec<Reference> {
    let Some(re) = interpolation() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .flat_map(|m| scan_expression(m.as_str()))
        .collect()
}
