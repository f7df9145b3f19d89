//! Platform layout in the release bucket.
//!
//! A platform describes where its artifacts live, which manifest name it
//! publishes under and how it is promoted. The built-in set covers
//! darwin, deb, rpm and windows; deployments override it from config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{Release, ReleaseSelector};
use crate::channel::support_manifest_key;
use crate::error::{ReleaseError, Result};

/// Prefix under which broken artifacts are parked.
pub const BROKEN_PREFIX: &str = "broken/";

/// Time-based promotion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionPolicy {
    /// Minimum build age before promotion
    #[serde(default)]
    pub min_delay_hours: u64,
    /// Builds made at or after this local hour are skipped (0 disables)
    #[serde(default)]
    pub cutoff_hour: u32,
}

impl PromotionPolicy {
    pub fn selector(&self) -> ReleaseSelector {
        ReleaseSelector::FirstEligible {
            min_delay: Duration::from_secs(self.min_delay_hours * 3600),
            cutoff_hour: self.cutoff_hour,
        }
    }
}

/// How test builds reach the test channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestPromotion {
    /// Promote the most recent catalog build with no delay or cutoff
    Catalog,
    /// Copy the public manifest to the test channel
    #[default]
    MirrorPublic,
}

/// Storage layout and promotion settings for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,
    /// Grouping used for selection (darwin, linux, windows)
    pub family: String,
    /// Platform component of manifest keys, defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_name: Option<String>,
    /// Key prefix of the artifacts
    pub prefix: String,
    /// Key prefix of the per-version support manifests
    #[serde(default)]
    pub support_prefix: String,
    /// Only keys with this suffix are releases
    #[serde(default)]
    pub suffix: String,
    /// Key the "latest" pointer is copied to
    pub latest_name: String,
    /// Artifact name template resolved from the public manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_source: Option<String>,
    /// Associated keys moved along with a broken release
    #[serde(default)]
    pub broken_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromotionPolicy>,
    #[serde(default)]
    pub test_promotion: TestPromotion,
}

impl Platform {
    pub fn manifest_name(&self) -> &str {
        self.manifest_name.as_deref().unwrap_or(&self.name)
    }

    pub fn support_manifest_key(&self, env: &str, version: &str) -> String {
        support_manifest_key(&self.support_prefix, self.manifest_name(), env, version)
    }

    /// Every key belonging to a release: the artifact itself, then the
    /// rendered `broken_files` templates.
    pub fn release_files(&self, release: &Release, env: &str) -> Vec<String> {
        std::iter::once(release.key.clone())
            .chain(
                self.broken_files
                    .iter()
                    .map(|template| render_template(template, &release.version, env)),
            )
            .collect()
    }

    /// Key of the artifact named by `latest_source` for a version.
    pub fn latest_source_key(&self, version: &str, env: &str) -> Option<String> {
        self.latest_source
            .as_ref()
            .map(|template| format!("{}{}", self.prefix, render_template(template, version, env)))
    }
}

/// Substitute `{version}` and `{env}` placeholders.
pub fn render_template(template: &str, version: &str, env: &str) -> String {
    template.replace("{version}", version).replace("{env}", env)
}

/// Built-in platform set.
pub fn default_platforms() -> Vec<Platform> {
    vec![
        Platform {
            name: "darwin".to_string(),
            family: "darwin".to_string(),
            manifest_name: None,
            prefix: "darwin/".to_string(),
            support_prefix: "darwin-support/".to_string(),
            suffix: ".dmg".to_string(),
            latest_name: "App.dmg".to_string(),
            latest_source: Some("App-{version}.dmg".to_string()),
            broken_files: vec![
                "darwin-updates/App-{version}.zip".to_string(),
                "darwin-support/update-darwin-{env}-{version}.json".to_string(),
            ],
            promotion: Some(PromotionPolicy {
                min_delay_hours: 27,
                cutoff_hour: 10,
            }),
            test_promotion: TestPromotion::Catalog,
        },
        Platform {
            name: "deb".to_string(),
            family: "linux".to_string(),
            manifest_name: Some("linux".to_string()),
            prefix: "linux_binaries/deb/".to_string(),
            support_prefix: String::new(),
            suffix: "_amd64.deb".to_string(),
            latest_name: "app_amd64.deb".to_string(),
            latest_source: None,
            broken_files: Vec::new(),
            promotion: None,
            test_promotion: TestPromotion::MirrorPublic,
        },
        Platform {
            name: "rpm".to_string(),
            family: "linux".to_string(),
            manifest_name: Some("linux".to_string()),
            prefix: "linux_binaries/rpm/".to_string(),
            support_prefix: String::new(),
            suffix: ".x86_64.rpm".to_string(),
            latest_name: "app_amd64.rpm".to_string(),
            latest_source: None,
            broken_files: Vec::new(),
            promotion: None,
            test_promotion: TestPromotion::MirrorPublic,
        },
        Platform {
            name: "windows".to_string(),
            family: "windows".to_string(),
            manifest_name: None,
            prefix: "windows/".to_string(),
            support_prefix: String::new(),
            suffix: ".386.exe".to_string(),
            latest_name: "app_setup_386.exe".to_string(),
            latest_source: None,
            broken_files: Vec::new(),
            promotion: None,
            test_promotion: TestPromotion::MirrorPublic,
        },
    ]
}

/// Resolve a platform name against a platform set.
///
/// An empty name selects every platform; a family name (e.g. `linux`)
/// selects each member of the family.
pub fn select<'a>(platforms: &'a [Platform], name: &str) -> Result<Vec<&'a Platform>> {
    if name.is_empty() {
        return Ok(platforms.iter().collect());
    }
    if let Some(platform) = platforms.iter().find(|p| p.name == name) {
        return Ok(vec![platform]);
    }
    let family: Vec<&Platform> = platforms.iter().filter(|p| p.family == name).collect();
    if family.is_empty() {
        return Err(ReleaseError::InvalidPlatform(name.to_string()));
    }
    Ok(family)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(key: &str, prefix: &str) -> Release {
        Release::from_key(key, prefix)
    }

    #[test]
    fn test_select_all() {
        let platforms = default_platforms();
        assert_eq!(select(&platforms, "").unwrap().len(), 4);
    }

    #[test]
    fn test_select_family() {
        let platforms = default_platforms();
        let names: Vec<&str> = select(&platforms, "linux")
            .unwrap()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["deb", "rpm"]);
    }

    #[test]
    fn test_select_single() {
        let platforms = default_platforms();
        let selected = select(&platforms, "windows").unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "windows");
    }

    #[test]
    fn test_select_unknown() {
        let platforms = default_platforms();
        assert!(matches!(
            select(&platforms, "beos"),
            Err(ReleaseError::InvalidPlatform(_))
        ));
    }

    #[test]
    fn test_manifest_name_defaults_to_name() {
        let platforms = default_platforms();
        assert_eq!(platforms[0].manifest_name(), "darwin");
        assert_eq!(platforms[1].manifest_name(), "linux");
    }

    #[test]
    fn test_support_manifest_key() {
        let darwin = &default_platforms()[0];
        assert_eq!(
            darwin.support_manifest_key("prod", "1.3.0"),
            "darwin-support/update-darwin-prod-1.3.0.json"
        );
    }

    #[test]
    fn test_release_files() {
        let darwin = &default_platforms()[0];
        let r = release("darwin/App-1.3.0-20230102130000+def5678.dmg", "darwin/");
        assert_eq!(
            darwin.release_files(&r, "prod"),
            vec![
                "darwin/App-1.3.0-20230102130000+def5678.dmg",
                "darwin-updates/App-1.3.0.zip",
                "darwin-support/update-darwin-prod-1.3.0.json",
            ]
        );
    }

    #[test]
    fn test_release_files_without_templates() {
        let windows = &default_platforms()[3];
        let r = release("windows/app_setup_1.3.0-20230102130000+def5678.386.exe", "windows/");
        assert_eq!(windows.release_files(&r, "prod").len(), 1);
    }

    #[test]
    fn test_latest_source_key() {
        let platforms = default_platforms();
        assert_eq!(
            platforms[0].latest_source_key("1.3.0", "prod").as_deref(),
            Some("darwin/App-1.3.0.dmg")
        );
        assert!(platforms[1].latest_source_key("1.3.0", "prod").is_none());
    }

    #[test]
    fn test_policy_selector() {
        let policy = PromotionPolicy {
            min_delay_hours: 27,
            cutoff_hour: 10,
        };
        assert_eq!(
            policy.selector(),
            ReleaseSelector::FirstEligible {
                min_delay: Duration::from_secs(27 * 3600),
                cutoff_hour: 10,
            }
        );
    }
}
