//! Engine settings, optionally loaded from a YAML file.
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Top-level engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub validator: ValidatorSettings,
    pub detection: DetectionSettings,
    pub network: NetworkSettings,
}

impl EngineSettings {
    /// Load settings from a YAML file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::SettingsNotFound(path.to_path_buf()));
        }
        debug!("Loading engine settings from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> CoreResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize the settings to YAML.
    pub fn to_yaml(&self) -> CoreResult<String> {
        serde_yaml::to_string(self).map_err(CoreError::from)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.validator.binary.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "validator.binary must not be empty".to_string(),
            ));
        }
        if self.validator.init_timeout_secs == 0 || self.validator.validate_timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "validator timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// External validator invocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSettings {
    /// Binary name or path
    pub binary: String,
    pub init_timeout_secs: u64,
    pub validate_timeout_secs: u64,
    pub version_timeout_secs: u64,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
            init_timeout_secs: 300,
            validate_timeout_secs: 120,
            version_timeout_secs: 30,
        }
    }
}

/// Surface detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Directory names never descended into (hidden directories are always skipped)
    pub exclude_dirs: Vec<String>,
    /// Glob patterns matched against paths relative to the scanned root
    pub exclude_patterns: Vec<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            exclude_dirs: [".terraform", ".git", "node_modules", "__pycache__", ".venv", "venv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Network isolation evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub enabled: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}
