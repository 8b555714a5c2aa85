//! Surface detection: find Terraform declaration files under the root paths.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use ksi_core::{DetectionSettings, RunConfig, SCHEMA_VERSION};

use crate::error::{IacError, IacResult};

/// Extension of Terraform declaration files.
pub const TF_EXTENSION: &str = "tf";

/// Dependency lock file written by `terraform init`.
pub const LOCKFILE_NAME: &str = ".terraform.lock.hcl";

/// Format marker of a declaration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationFormat {
    Terraform,
}

/// One declaration file found during detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclarationFile {
    /// Path relative to the workspace, `/`-separated
    pub path: String,
    pub format: DeclarationFormat,
    pub size_bytes: u64,
    #[serde(skip)]
    pub absolute_path: PathBuf,
    #[serde(skip)]
    pub text: String,
}

impl DeclarationFile {
    /// Directory holding the file, `.` for the workspace itself.
    pub fn directory(&self) -> String {
        parent_dir(&self.path)
    }
}

/// A matching file that exists but could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadableFile {
    pub path: String,
    pub error: String,
}

/// Output of the surface detector; `declared/terraform_detection.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub schema_version: String,
    pub detected: bool,
    pub file_count: usize,
    pub total_bytes: u64,
    pub files: Vec<DeclarationFile>,
    /// Unique directories containing declaration files
    pub surface_paths: Vec<String>,
    pub lockfile_present: bool,
    pub root_paths: Vec<String>,
    pub missing_roots: Vec<String>,
    pub unreadable: Vec<UnreadableFile>,
    pub scanned_at: DateTime<Utc>,
}

impl DetectionResult {
    /// Top-most surface directories; nested module directories are
    /// validated through their parent.
    pub fn validation_roots(&self) -> Vec<String> {
        if self.surface_paths.iter().any(|p| p == ".") {
            return vec![".".to_string()];
        }
        let mut roots: Vec<String> = Vec::new();
        for dir in &self.surface_paths {
            let covered = roots
                .iter()
                .any(|root| Path::new(dir).starts_with(Path::new(root)));
            if !covered {
                roots.push(dir.clone());
            }
        }
        roots
    }

    pub fn file(&self, path: &str) -> Option<&DeclarationFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Read-only walker over the configured root paths.
pub struct SurfaceDetector {
    exclude_dirs: Vec<String>,
    exclude_patterns: Vec<Pattern>,
}

impl SurfaceDetector {
    pub fn new(settings: &DetectionSettings) -> IacResult<Self> {
        let exclude_patterns = settings
            .exclude_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| IacError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<IacResult<Vec<_>>>()?;

        Ok(Self {
            exclude_dirs: settings.exclude_dirs.clone(),
            exclude_patterns,
        })
    }

    pub fn from_config(config: &RunConfig) -> IacResult<Self> {
        Self::new(&config.settings.detection)
    }

    /// Scan every root path. An empty result is not an error.
    pub fn detect(&self, config: &RunConfig) -> IacResult<DetectionResult> {
        let mut scan = SurfaceScan::default();
        let mut root_paths = Vec::new();
        let mut missing_roots = Vec::new();

        for (root, configured) in config.resolved_roots().iter().zip(&config.root_paths) {
            let display = relative_display(&config.workspace, root);
            root_paths.push(display.clone());

            if !root.is_dir() {
                warn!("Root path {:?} does not exist, skipping", configured);
                missing_roots.push(display);
                continue;
            }

            info!("Scanning {:?} for Terraform files", root);
            let canonical_root = root.canonicalize()?;
            self.scan_root(root, &canonical_root, &config.workspace, &mut scan);
        }

        scan.files.sort_by(|a, b| a.path.cmp(&b.path));
        scan.unreadable.sort_by(|a, b| a.path.cmp(&b.path));

        let surface_paths: BTreeSet<String> = scan
            .files
            .iter()
            .map(DeclarationFile::directory)
            .chain(scan.unreadable.iter().map(|u| parent_dir(&u.path)))
            .collect();

        let file_count = scan.files.len() + scan.unreadable.len();
        let total_bytes = scan.files.iter().map(|f| f.size_bytes).sum();

        info!(
            "Detected {} Terraform file(s) in {} director(ies)",
            file_count,
            surface_paths.len()
        );

        Ok(DetectionResult {
            schema_version: SCHEMA_VERSION.to_string(),
            detected: file_count > 0,
            file_count,
            total_bytes,
            files: scan.files,
            surface_paths: surface_paths.into_iter().collect(),
            lockfile_present: scan.lockfile_present,
            root_paths,
            missing_roots,
            unreadable: scan.unreadable,
            scanned_at: config.collected_at,
        })
    }

    fn scan_root(&self, root: &Path, canonical_root: &Path, workspace: &Path, scan: &mut SurfaceScan) {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_excluded(e, root));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable path: {}", err);
                    let declaration = err
                        .path()
                        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(TF_EXTENSION));
                    if let Some(path) = declaration {
                        scan.unreadable.push(UnreadableFile {
                            path: relative_display(workspace, path),
                            error: err.to_string(),
                        });
                    }
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }
            if entry.file_name().to_str() == Some(LOCKFILE_NAME) {
                scan.lockfile_present = true;
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some(TF_EXTENSION) {
                continue;
            }

            if entry.file_type().is_symlink() {
                match entry.path().canonicalize() {
                    Ok(target) if target.starts_with(canonical_root) && target.is_file() => {}
                    _ => {
                        warn!("Skipping symlink {:?}: target outside scanned root", entry.path());
                        continue;
                    }
                }
            }

            let relative = relative_display(workspace, entry.path());
            if !scan.seen.insert(relative.clone()) {
                continue;
            }

            match read_text(entry.path()) {
                Ok(text) => {
                    debug!("Found {} ({} bytes)", relative, text.len());
                    scan.files.push(DeclarationFile {
                        path: relative,
                        format: DeclarationFormat::Terraform,
                        size_bytes: text.len() as u64,
                        absolute_path: entry.path().to_path_buf(),
                        text,
                    });
                }
                Err(error) => {
                    warn!("Cannot read {}: {}", relative, error);
                    scan.unreadable.push(UnreadableFile { path: relative, error });
                }
            }
        }
    }

    fn is_excluded(&self, entry: &DirEntry, root: &Path) -> bool {
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir()
            && (name.starts_with('.') || self.exclude_dirs.iter().any(|d| *d == name))
        {
            return true;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        self.exclude_patterns
            .iter()
            .any(|p| p.matches_path(relative) || p.matches(&name))
    }
}

#[derive(Default)]
struct SurfaceScan {
    files: Vec<DeclarationFile>,
    unreadable: Vec<UnreadableFile>,
    lockfile_present: bool,
    /// Overlapping roots must not report a file twice
    seen: BTreeSet<String>,
}

fn read_text(path: &Path) -> Result<String, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|_| "file is not valid UTF-8".to_string())
}

/// Workspace-relative, `/`-separated rendering of a path.
pub(crate) fn relative_display(workspace: &Path, path: &Path) -> String {
    match path.strip_prefix(workspace) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}

fn parent_dir(relative: &str) -> String {
    match relative.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => ".".to_string(),
    }
}
