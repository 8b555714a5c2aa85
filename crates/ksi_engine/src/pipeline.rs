//! The evaluation pipeline.
//!
//! Stages run strictly in order: detect, extract, validate, check the
//! network, then one evidence pack per criterion set. Only detection
//! configuration errors and evidence I/O failures abort a run.

use std::sync::Arc;

use tracing::{debug, error, info};

use ksi_core::{CriterionSet, EvaluationManifest, ManifestScope, RunConfig};
use ksi_evidence::documents::{
    required_files, DETECTION, INVENTORY, NETWORK_FINDINGS, NETWORK_INVENTORY, VALIDATION,
};
use ksi_evidence::{EvidencePack, ProvisionalPack, ResultsSummary, ToolsDocument};
use ksi_evidence::EvidencePackBuilder;
use ksi_iac::{
    DetectionResult, ExternalValidator, Inventory, InventoryExtractor, NetworkInventory,
    SurfaceDetector, ValidationResult,
};
use ksi_policy::{EvaluationContext, NetworkFindings, NetworkRuleChecker, PolicyEvaluator};
use ksi_runner::ToolRunner;

use crate::error::EngineResult;
use crate::report::{RunReport, SetReport};

/// Everything the stages before packaging produced.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub detection: DetectionResult,
    pub inventory: Inventory,
    pub validation: ValidationResult,
    /// Present when network evaluation is enabled
    pub network: Option<(NetworkInventory, NetworkFindings)>,
}

impl Artifacts {
    fn context<'a>(&'a self, config: &'a RunConfig) -> EvaluationContext<'a> {
        EvaluationContext {
            detection: &self.detection,
            inventory: &self.inventory,
            validation: Some(&self.validation),
            network: self.network.as_ref().map(|(_, findings)| findings),
            trigger: &config.trigger,
        }
    }

    fn tools(&self) -> ToolsDocument {
        ToolsDocument::new(self.validation.validator.clone())
            .with_tool_version(self.validation.tool_version.clone())
            .with_requested_version(self.validation.requested_version.clone())
            .with_version_satisfied(self.validation.version_satisfied)
    }
}

/// Runs the pipeline against a [`ToolRunner`].
pub struct Engine {
    runner: Arc<dyn ToolRunner>,
    evaluator: PolicyEvaluator,
}

impl Engine {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            evaluator: PolicyEvaluator::new(),
        }
    }

    /// Run every stage and write one pack per criterion set plus
    /// `results.json`.
    pub async fn run(&self, config: &RunConfig) -> EngineResult<RunReport> {
        info!(
            "Starting KSI evaluation of {:?} (trigger: {})",
            config.workspace, config.trigger.event
        );
        let artifacts = self.collect(config).await?;

        let mut packs = Vec::new();
        let mut sets = Vec::new();
        for set in config.criterion_sets() {
            let (pack, manifest) = match self.package(config, set, &artifacts) {
                Ok(built) => built,
                Err(e) => {
                    error!("Could not write {} evidence pack: {}", set, e);
                    return Err(e);
                }
            };
            sets.push(SetReport::new(&pack, manifest));
            packs.push(pack);
        }

        let results = ResultsSummary::from_packs(config.collected_at, &packs);
        let results_path = results.write(&config.output_dir)?;

        let report = RunReport::new(sets, results_path);
        info!("KSI evaluation finished: {}", report.status);
        Ok(report)
    }

    /// Detection, extraction, validation and network checks.
    pub async fn collect(&self, config: &RunConfig) -> EngineResult<Artifacts> {
        let detection = SurfaceDetector::from_config(config)?.detect(config)?;
        info!(
            "Detected {} declaration file(s) in {} surface path(s)",
            detection.file_count,
            detection.surface_paths.len()
        );

        let inventory = InventoryExtractor::new().extract(&detection);
        info!(
            "Inventory: {} resource(s), {} parse error(s)",
            inventory.resource_count,
            inventory.parse_errors.len()
        );

        let validation = ExternalValidator::new(self.runner.clone(), config)
            .validate(config, &detection)
            .await;
        debug!("Validation verdict: {:?}", validation.verdict());

        let network = config.settings.network.enabled.then(|| {
            let network = NetworkInventory::from_inventory(&inventory);
            let findings = NetworkRuleChecker::new().check(&network);
            (network, findings)
        });

        Ok(Artifacts {
            detection,
            inventory,
            validation,
            network,
        })
    }

    fn package(
        &self,
        config: &RunConfig,
        set: CriterionSet,
        artifacts: &Artifacts,
    ) -> EngineResult<(EvidencePack, EvaluationManifest)> {
        let tools = artifacts.tools();
        let mut pack =
            EvidencePackBuilder::new(config, set).begin(&artifacts.detection.surface_paths, &tools)?;
        pack.write_document(DETECTION, "Terraform configuration surface detection", &artifacts.detection)?;

        let ctx = artifacts.context(config);
        let criteria = match set {
            CriterionSet::Mla05 => {
                pack.write_document(INVENTORY, "Terraform resource inventory", &artifacts.inventory)?;
                pack.write_document(
                    VALIDATION,
                    "Terraform init and validate output",
                    &artifacts.validation,
                )?;
                let mut criteria = self.evaluator.evaluate_mla05(&ctx);
                // evidence criterion runs against the provisional file list
                criteria.push(self.evidence_criterion(&pack));
                criteria
            }
            CriterionSet::Cna01 => {
                if let Some((network, findings)) = &artifacts.network {
                    pack.write_document(NETWORK_INVENTORY, "Declared network resources", network)?;
                    pack.write_document(NETWORK_FINDINGS, "Network isolation violations", findings)?;
                }
                self.evaluator.evaluate_cna01(&ctx)
            }
        };

        let manifest = EvaluationManifest::new(set, criteria, config.collected_at)
            .with_scope(scope(config))
            .with_tools(tools.manifest_tools());
        let pack = pack.finalize(&manifest)?;
        Ok((pack, manifest))
    }

    fn evidence_criterion(&self, pack: &ProvisionalPack) -> ksi_core::CriterionResult {
        self.evaluator
            .evidence_artifacts(&pack.present_files(), required_files(pack.criterion_set()))
    }
}

fn scope(config: &RunConfig) -> ManifestScope {
    ManifestScope {
        repository: config.trigger.repository.clone(),
        commit_sha: config.trigger.commit_sha.clone(),
        root_paths: config.root_paths.clone(),
        trigger_event: config.trigger.event.as_str().to_string(),
    }
}
