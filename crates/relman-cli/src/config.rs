//! Configuration management for relman
//!
//! This module handles loading and validating configuration for the relman
//! CLI. Configuration is stored in TOML format.
//!
//! # Configuration File Locations
//!
//! - Linux: `~/.config/relman/relman.toml`
//! - macOS: `~/Library/Application Support/io.relman.relman/relman.toml`
//! - Windows: `%APPDATA%\relman\relman\config\relman.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use relman_core::ReleaseConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::github::DEFAULT_API_URL;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// CLI configuration
///
/// # Example TOML
///
/// ```toml
/// [release]
/// environment = "prod"
/// malformed_manifest = "fail"  # "fail" | "treat-as-missing"
///
/// [[release.platforms]]
/// name = "darwin"
/// family = "darwin"
/// prefix = "darwin/"
/// suffix = ".dmg"
/// latest_name = "App.dmg"
///
/// [storage]
/// root = "/srv/releases"
///
/// [github]
/// owner = "example"
/// api_url = "https://api.github.com"
///
/// [network]
/// timeout_seconds = 30
///
/// [output]
/// format = "table"  # "table" | "json" | "quiet"
/// verbose = false
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Environment, manifest policy and platform layout
    #[serde(default)]
    pub release: ReleaseConfig,

    /// Bucket location
    #[serde(default)]
    pub storage: StorageConfig,

    /// GitHub API settings
    #[serde(default)]
    pub github: GithubConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Directory used as the release bucket
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// GitHub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// Default repository owner
    #[serde(default)]
    pub owner: String,

    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            api_url: default_api_url(),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Output format: "table", "json", "quiet"
    #[serde(default = "default_format")]
    pub format: String,

    /// Verbose output
    #[serde(default)]
    pub verbose: bool,
}

fn default_format() -> String {
    "table".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            verbose: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Commented configuration written on first run.
const SAMPLE_CONFIG: &str = r#"# relman configuration

[release]
# Manifest environment
environment = "prod"
# Undecodable published manifest: "fail" or "treat-as-missing"
malformed_manifest = "fail"

# Platform tables replace the built-in darwin/deb/rpm/windows layout
# [[release.platforms]]
# name = "darwin"
# family = "darwin"
# prefix = "darwin/"
# support_prefix = "darwin-support/"
# suffix = ".dmg"
# latest_name = "App.dmg"
# promotion = { min_delay_hours = 27, cutoff_hour = 10 }

[storage]
# Directory used as the release bucket
# root = "/srv/releases"

[github]
# Default repository owner
owner = ""
api_url = "https://api.github.com"

[network]
# Request timeout in seconds
timeout_seconds = 30

[output]
# Output format: "table", "json", "quiet"
format = "table"
verbose = false

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
level = "warn"
"#;

impl Config {
    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from the default location when none is given.
    ///
    /// A missing default file yields the built-in configuration; a missing
    /// explicit file is an error.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "relman", "relman")
            .map(|dirs| dirs.config_dir().join("relman.toml"))
    }

    /// Write the sample configuration to the default path on first run.
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        match Self::default_path() {
            Some(path) => write_sample_if_missing(&path),
            None => Ok(false),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.release
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let valid_formats = ["table", "json", "quiet"];
        if !valid_formats.contains(&self.output.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid output format '{}'. Valid values: {:?}",
                self.output.format, valid_formats
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        if self.network.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if !self.github.api_url.starts_with("http://") && !self.github.api_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError(format!(
                "Invalid GitHub API URL '{}': must start with http:// or https://",
                self.github.api_url
            )));
        }

        Ok(())
    }
}

fn write_sample_if_missing(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, SAMPLE_CONFIG)?;
    Ok(true)
}

/// CLI configuration overrides
///
/// Command-line arguments take precedence over config file values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Output format override
    pub output_format: Option<String>,
    /// Verbose flag override
    pub verbose: Option<bool>,
    /// Debug flag override
    pub debug: Option<bool>,
    /// Bucket directory override
    pub bucket: Option<PathBuf>,
    /// Manifest environment override
    pub environment: Option<String>,
}

impl Config {
    /// Apply CLI overrides to configuration
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref format) = overrides.output_format {
            self.output.format = format.clone();
        }
        if let Some(verbose) = overrides.verbose {
            self.output.verbose = verbose;
        }
        if let Some(debug) = overrides.debug {
            if debug {
                self.logging.level = "debug".to_string();
            }
        }
        if let Some(ref bucket) = overrides.bucket {
            self.storage.root = Some(bucket.clone());
        }
        if let Some(ref env) = overrides.environment {
            if !env.is_empty() {
                self.release.environment = env.clone();
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relman_core::MalformedManifestPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.release.environment, "prod");
        assert_eq!(config.release.platforms.len(), 4);
        assert!(config.storage.root.is_none());
        assert!(config.github.owner.is_empty());
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.network.timeout_seconds, 30);
        assert_eq!(config.output.format, "table");
        assert!(!config.output.verbose);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_output_format() {
        let mut config = Config::default();
        config.output.format = "xml".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Invalid output format"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.network.timeout_seconds = 0;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("timeout_seconds"));
    }

    #[test]
    fn test_validate_invalid_api_url() {
        let mut config = Config::default();
        config.github.api_url = "api.github.com".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Invalid GitHub API URL"));
    }

    #[test]
    fn test_validate_release_section() {
        let mut config = Config::default();
        config.release.environment.clear();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("environment"));
    }

    #[test]
    fn test_sample_written_once() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("relman.toml");

        assert!(write_sample_if_missing(&config_path).unwrap());
        std::fs::write(&config_path, "[output]\nformat = \"json\"\n").unwrap();
        assert!(!write_sample_if_missing(&config_path).unwrap());

        // An existing file is never overwritten
        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded.output.format, "json");
    }

    #[test]
    fn test_cli_overrides() {
        let overrides = CliOverrides {
            output_format: Some("json".to_string()),
            verbose: Some(true),
            debug: Some(true),
            bucket: Some(PathBuf::from("/tmp/bucket")),
            environment: Some("staging".to_string()),
        };

        let config = Config::default().with_overrides(&overrides);

        assert_eq!(config.output.format, "json");
        assert!(config.output.verbose);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage.root, Some(PathBuf::from("/tmp/bucket")));
        assert_eq!(config.release.environment, "staging");
    }

    #[test]
    fn test_cli_overrides_empty_environment() {
        let overrides = CliOverrides {
            environment: Some(String::new()),
            ..Default::default()
        };

        let config = Config::default().with_overrides(&overrides);
        assert_eq!(config.release.environment, "prod");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_content = r#"
[release]
environment = "staging"
malformed_manifest = "treat-as-missing"

[[release.platforms]]
name = "darwin"
family = "darwin"
prefix = "darwin/"
suffix = ".dmg"
latest_name = "App.dmg"
promotion = { min_delay_hours = 2, cutoff_hour = 9 }

[storage]
root = "/srv/releases"

[github]
owner = "example"

[network]
timeout_seconds = 60

[output]
format = "json"
verbose = true

[logging]
level = "debug"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();

        assert_eq!(config.release.environment, "staging");
        assert_eq!(
            config.release.malformed_manifest,
            MalformedManifestPolicy::TreatAsMissing
        );
        assert_eq!(config.release.platforms.len(), 1);
        let darwin = &config.release.platforms[0];
        assert_eq!(darwin.promotion.unwrap().cutoff_hour, 9);
        assert_eq!(config.storage.root, Some(PathBuf::from("/srv/releases")));
        assert_eq!(config.github.owner, "example");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.network.timeout_seconds, 60);
        assert_eq!(config.output.format, "json");
        assert!(config.output.verbose);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let config: Config = toml::from_str(SAMPLE_CONFIG).unwrap();
        assert!(config.validate().is_ok());

        let defaults = Config::default();
        assert_eq!(config.release, defaults.release);
        assert_eq!(config.storage.root, None);
        assert_eq!(config.github.api_url, defaults.github.api_url);
        assert_eq!(config.network.timeout_seconds, defaults.network.timeout_seconds);
        assert_eq!(config.output.format, defaults.output.format);
        assert_eq!(config.logging.level, defaults.logging.level);
    }

    #[test]
    fn test_default_path() {
        let path = Config::default_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("relman.toml"));
    }

    #[test]
    fn test_load_from_custom_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("custom.toml");
        std::fs::write(&config_path, "[github]\nowner = \"example\"\n").unwrap();

        let loaded = Config::load_from(Some(&config_path)).unwrap();
        assert_eq!(loaded.github.owner, "example");
        assert_eq!(loaded.github.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_load_from_missing_custom_path() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");

        assert!(matches!(
            Config::load_from(Some(&missing)),
            Err(ConfigError::ReadError(_))
        ));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        std::fs::write(&config_path, "[output]\nformat = \"xml\"\n").unwrap();

        assert!(matches!(
            Config::load(&config_path),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
