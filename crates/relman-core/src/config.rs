//! Configuration structures for release promotion.
//!
//! Defines the platform table, the default environment and how a
//! malformed published manifest is handled.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReleaseError, Result};
use crate::platform::{default_platforms, Platform};

/// What to do when the currently published manifest cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedManifestPolicy {
    /// Abort the promotion with a decode error
    #[default]
    Fail,
    /// Log a warning and promote as if nothing were published
    TreatAsMissing,
}

/// Main release configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Manifest environment (e.g. prod, staging)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Handling of undecodable published manifests
    #[serde(default)]
    pub malformed_manifest: MalformedManifestPolicy,

    /// Platform layout
    #[serde(default = "default_platforms")]
    pub platforms: Vec<Platform>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            malformed_manifest: MalformedManifestPolicy::default(),
            platforms: default_platforms(),
        }
    }
}

impl ReleaseConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ReleaseError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ReleaseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the platform table.
    pub fn validate(&self) -> Result<()> {
        if self.environment.is_empty() {
            return Err(ReleaseError::Config("environment must not be empty".to_string()));
        }
        if self.platforms.is_empty() {
            return Err(ReleaseError::Config("at least one platform is required".to_string()));
        }

        let mut names = HashSet::new();
        for platform in &self.platforms {
            if platform.name.is_empty() {
                return Err(ReleaseError::Config("platform name must not be empty".to_string()));
            }
            if !names.insert(platform.name.as_str()) {
                return Err(ReleaseError::Config(format!(
                    "duplicate platform {}",
                    platform.name
                )));
            }
            if platform.prefix.is_empty() {
                return Err(ReleaseError::Config(format!(
                    "platform {} needs a prefix",
                    platform.name
                )));
            }
            if let Some(policy) = &platform.promotion {
                if policy.cutoff_hour > 23 {
                    return Err(ReleaseError::Config(format!(
                        "platform {} cutoff_hour must be 0-23",
                        platform.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn platform(&self, name: &str) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.name == name)
    }

    /// Resolve a platform selection (see [`crate::platform::select`]).
    pub fn select(&self, name: &str) -> Result<Vec<&Platform>> {
        crate::platform::select(&self.platforms, name)
    }
}

fn default_environment() -> String {
    "prod".to_string()
}
