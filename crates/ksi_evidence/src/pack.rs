//! Two-phase evidence pack assembly.
//!
//! [`EvidencePackBuilder::begin`] creates the staging directory and writes
//! the fixed scope documents. The caller adds declared artifacts to the
//! returned [`ProvisionalPack`], evaluates whatever depends on the file list,
//! then calls [`ProvisionalPack::finalize`] with the complete manifest. Only
//! finalization writes the index and the hash listing, so nothing is hashed
//! before the pack stops changing.

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use ksi_core::{CriterionSet, EvaluationManifest, Outcome, OutcomeCounts, RunConfig, SCHEMA_VERSION};

use crate::archive::write_archive;
use crate::documents::{
    required_files, ArtifactIndex, CollectedAt, FileEntry, ScopeDocument, ToolsDocument,
    ARTIFACT_INDEX, COLLECTED_AT, EVALUATION_MANIFEST, HASHES, SCOPE, TOOLS,
};
use crate::error::{EvidenceError, EvidenceResult};
use crate::hashes::HashListing;

/// `evidence_<set>_<shortsha>_<timestamp>`
pub fn archive_stem(set: CriterionSet, short_sha: &str, timestamp_slug: &str) -> String {
    format!("evidence_{}_{}_{}", set.as_str(), short_sha, timestamp_slug)
}

/// Starts evidence packs for one run.
#[derive(Debug, Clone)]
pub struct EvidencePackBuilder<'a> {
    config: &'a RunConfig,
    set: CriterionSet,
}

impl<'a> EvidencePackBuilder<'a> {
    pub fn new(config: &'a RunConfig, set: CriterionSet) -> Self {
        Self { config, set }
    }

    pub fn stem(&self) -> String {
        archive_stem(self.set, &self.config.trigger.short_sha(), &self.config.timestamp_slug())
    }

    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.stem())
    }

    /// Create the staging directory and write the scope documents.
    pub fn begin(&self, surface_paths: &[String], tools: &ToolsDocument) -> EvidenceResult<ProvisionalPack> {
        let output_dir = &self.config.output_dir;
        let staging_dir = output_dir.join(self.stem());
        if staging_dir.exists() {
            return Err(EvidenceError::StagingExists(staging_dir));
        }
        fs::create_dir_all(&staging_dir).map_err(|e| EvidenceError::io(&staging_dir, e))?;
        info!("Assembling {} pack in {:?}", self.set, staging_dir);

        let mut pack = ProvisionalPack {
            set: self.set,
            staging_dir,
            archive_path: output_dir.join(self.archive_name()),
            archive_name: self.archive_name(),
            collected_at: self.config.collected_at,
            repository: self.config.trigger.repository.clone(),
            commit_sha: self.config.trigger.commit_sha.clone(),
            tools: tools.clone(),
            files: Vec::new(),
        };
        pack.write_document(COLLECTED_AT, "Timestamp of evidence collection", &CollectedAt::new(self.config.collected_at))?;
        pack.write_document(
            SCOPE,
            "Scope of the evaluation",
            &ScopeDocument::new(self.config, self.set, surface_paths),
        )?;
        pack.write_document(TOOLS, "Tools and versions used for evaluation", tools)?;
        Ok(pack)
    }
}

/// A pack being assembled; its documents are not hashed yet.
#[derive(Debug)]
pub struct ProvisionalPack {
    set: CriterionSet,
    staging_dir: PathBuf,
    archive_path: PathBuf,
    archive_name: String,
    collected_at: DateTime<Utc>,
    repository: Option<String>,
    commit_sha: Option<String>,
    tools: ToolsDocument,
    files: Vec<FileEntry>,
}

impl ProvisionalPack {
    pub fn criterion_set(&self) -> CriterionSet {
        self.set
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    pub fn tools(&self) -> &ToolsDocument {
        &self.tools
    }

    /// Serialize `document` as pretty JSON at `path` inside the pack.
    pub fn write_document<T: Serialize + ?Sized>(
        &mut self,
        path: &str,
        description: &str,
        document: &T,
    ) -> EvidenceResult<()> {
        let target = self.resolve(path)?;
        if self.files.iter().any(|f| f.path == path) {
            return Err(EvidenceError::DuplicateDocument(path.to_string()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| EvidenceError::io(parent, e))?;
        }

        let mut content = serde_json::to_string_pretty(document)?;
        content.push('\n');
        fs::write(&target, content).map_err(|e| EvidenceError::io(&target, e))?;
        debug!("Wrote {}", path);

        self.files.push(FileEntry {
            path: path.to_string(),
            description: description.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
        });
        Ok(())
    }

    fn resolve(&self, path: &str) -> EvidenceResult<PathBuf> {
        let relative = Path::new(path);
        let inside = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !inside || path == HASHES || path == ARTIFACT_INDEX {
            return Err(EvidenceError::InvalidPath(path.to_string()));
        }
        Ok(self.staging_dir.join(relative))
    }

    /// Documents written so far that exist on disk, in write order.
    pub fn present_files(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| self.staging_dir.join(&f.path).is_file())
            .map(|f| f.path.clone())
            .collect()
    }

    /// Required documents not present yet.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let present = self.present_files();
        required_files(self.set)
            .iter()
            .copied()
            .filter(|r| !present.iter().any(|p| p == r))
            .collect()
    }

    /// Write the manifest, the index and the hash listing, then archive.
    ///
    /// On failure the staging directory is removed, so the same run can
    /// `begin` again.
    pub fn finalize(mut self, manifest: &EvaluationManifest) -> EvidenceResult<EvidencePack> {
        let sealed = if manifest.criterion_set != self.set {
            Err(EvidenceError::SetMismatch {
                expected: self.set.to_string(),
                found: manifest.criterion_set.to_string(),
            })
        } else {
            self.seal(manifest)
        };
        let hashes = match sealed {
            Ok(hashes) => hashes,
            Err(e) => {
                self.discard();
                return Err(e);
            }
        };

        info!(
            "Evidence pack {} finalized: {} ({} file(s))",
            self.archive_name,
            manifest.status,
            hashes.len() + 1
        );

        Ok(EvidencePack {
            criterion_set: self.set,
            archive_name: self.archive_name,
            archive_path: self.archive_path,
            staging_dir: self.staging_dir,
            status: manifest.status,
            counts: manifest.counts(),
            hashes,
        })
    }

    fn seal(&mut self, manifest: &EvaluationManifest) -> EvidenceResult<HashListing> {
        let missing = self.missing_required();
        if !missing.is_empty() {
            warn!("{} pack finalized without: {}", self.set, missing.join(", "));
        }

        self.write_document(
            EVALUATION_MANIFEST,
            "Primary evaluation manifest with PASS/FAIL/ERROR status",
            manifest,
        )?;

        let mut files = self.files.clone();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let index = ArtifactIndex {
            schema_version: SCHEMA_VERSION.to_string(),
            criterion_set: self.set,
            generated_at: self.collected_at,
            repository: self.repository.clone(),
            commit_sha: self.commit_sha.clone(),
            files,
        };
        let index_path = self.staging_dir.join(ARTIFACT_INDEX);
        let mut content = serde_json::to_string_pretty(&index)?;
        content.push('\n');
        fs::write(&index_path, content).map_err(|e| EvidenceError::io(&index_path, e))?;

        // listing last, over final bytes
        let hashes = HashListing::from_dir(&self.staging_dir)?;
        let hashes_path = self.staging_dir.join(HASHES);
        fs::write(&hashes_path, hashes.to_string()).map_err(|e| EvidenceError::io(&hashes_path, e))?;

        write_archive(&self.staging_dir, self.set.as_str(), &self.archive_path, self.collected_at)?;
        Ok(hashes)
    }

    fn discard(&self) {
        if let Err(e) = fs::remove_dir_all(&self.staging_dir) {
            warn!("Failed to remove staging directory {:?}: {}", self.staging_dir, e);
        }
    }
}

/// A finalized, archived pack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidencePack {
    pub criterion_set: CriterionSet,
    pub archive_name: String,
    pub archive_path: PathBuf,
    pub staging_dir: PathBuf,
    pub status: Outcome,
    pub counts: OutcomeCounts,
    /// Digests of every file except `hashes.sha256`
    pub hashes: HashListing,
}
