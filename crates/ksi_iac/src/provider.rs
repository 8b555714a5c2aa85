//! Cloud provider definitions.

use serde::{Deserialize, Serialize};

/// Cloud providers whose resource types the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Azure => "azure",
            CloudProvider::Gcp => "gcp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aws" => Some(CloudProvider::Aws),
            "azure" | "azurerm" => Some(CloudProvider::Azure),
            "gcp" | "google" | "google-beta" => Some(CloudProvider::Gcp),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![CloudProvider::Aws, CloudProvider::Azure, CloudProvider::Gcp]
    }

    /// Get the Terraform provider name.
    pub fn provider_name(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Azure => "azurerm",
            CloudProvider::Gcp => "google",
        }
    }

    /// Provider owning a resource type, from its type prefix.
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        let prefix = resource_type.split('_').next()?;
        Self::parse(prefix)
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
