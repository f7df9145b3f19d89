//! Promotion engine - decides which build becomes live.
//!
//! Promotion of one platform into one channel walks these states:
//!
//! ```text
//! Searching -> Found | NotFound
//! Found -> CompareToCurrent -> Equal | Older | Newer
//! Newer -> Write -> Done
//! ```
//!
//! `Searching` lists the platform prefix and applies a [`ReleaseSelector`].
//! `CompareToCurrent` reads the published manifest; a missing manifest is
//! a first publish. `Write` is a single copy of the per-version support
//! manifest onto the channel manifest key, so re-running is harmless.
//!
//! Every run re-reads the store. Nothing is cached between calls.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::catalog::{Release, ReleaseCatalog, ReleaseSelector};
use crate::channel::Channel;
use crate::config::{MalformedManifestPolicy, ReleaseConfig};
use crate::error::{ReleaseError, Result};
use crate::manifest::{self, UpdateManifest};
use crate::platform::{Platform, TestPromotion, BROKEN_PREFIX};
use crate::storage::{CopyOptions, ObjectStore, StorageError};
use crate::version;

/// Result of one promotion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PromotionOutcome {
    /// No release matched the selector
    NotFound,
    /// The selected release is already live
    Unchanged { release: Release, current: String },
    /// The selected release is older than what is live
    Older { release: Release, current: String },
    /// The channel manifest was (or in a dry run, would be) replaced
    Promoted {
        release: Release,
        source: String,
        destination: String,
        dry_run: bool,
    },
    /// The public manifest was mirrored into another channel
    Mirrored {
        source: String,
        destination: String,
        dry_run: bool,
    },
    /// The platform has no promotion policy
    Unsupported,
}

impl PromotionOutcome {
    pub fn release(&self) -> Option<&Release> {
        match self {
            Self::Unchanged { release, .. }
            | Self::Older { release, .. }
            | Self::Promoted { release, .. } => Some(release),
            _ => None,
        }
    }

    /// Whether the store was (or would have been) written.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Promoted { .. } | Self::Mirrored { .. })
    }

    /// Short state label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Unchanged { .. } => "unchanged",
            Self::Older { .. } => "older",
            Self::Promoted { .. } => "promoted",
            Self::Mirrored { .. } => "mirrored",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Outcome of a promotion for a named platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformOutcome {
    pub platform: String,
    pub outcome: PromotionOutcome,
}

/// A "latest" pointer copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestCopy {
    pub platform: String,
    pub source: String,
    pub destination: String,
    pub dry_run: bool,
}

/// Result of marking a release broken.
///
/// Individual copy or delete failures do not stop the remaining files
/// from being processed.
#[derive(Debug, Default)]
pub struct BrokenOutcome {
    /// Releases found under the given name
    pub releases: Vec<Release>,
    /// Keys moved under `broken/`
    pub removed: Vec<String>,
    pub errors: Vec<ReleaseError>,
}

impl BrokenOutcome {
    /// Fold collected errors, keeping the removed keys on success.
    pub fn into_result(self) -> Result<Vec<String>> {
        match ReleaseError::combine(self.errors) {
            Some(err) => Err(err),
            None => Ok(self.removed),
        }
    }
}

/// Promotion engine over an object store.
///
/// # Example
///
/// ```
/// use relman_core::{MemoryStore, Promoter, ReleaseConfig};
/// use relman_core::channel::Channel;
/// use relman_core::catalog::ReleaseSelector;
///
/// let store = MemoryStore::new();
/// let config = ReleaseConfig::default();
/// let promoter = Promoter::new(&store, &config).dry_run(true);
///
/// let darwin = config.platform("darwin").unwrap();
/// let outcome = promoter
///     .promote(darwin, &Channel::Public, &ReleaseSelector::latest())
///     .unwrap();
/// assert_eq!(outcome.label(), "not-found");
/// ```
pub struct Promoter<'a, S: ObjectStore> {
    store: S,
    config: &'a ReleaseConfig,
    env: String,
    dry_run: bool,
}

impl<'a, S: ObjectStore> Promoter<'a, S> {
    /// Create a promoter for the configured environment.
    pub fn new(store: S, config: &'a ReleaseConfig) -> Self {
        Self {
            store,
            env: config.environment.clone(),
            config,
            dry_run: false,
        }
    }

    /// Target another environment.
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Skip every store write, reporting what would have been done.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReleaseConfig {
        self.config
    }

    pub fn environment(&self) -> &str {
        &self.env
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// List a platform's releases, most recent first.
    pub fn catalog(&self, platform: &Platform, limit: usize) -> Result<ReleaseCatalog> {
        let keys = self.store.list(&platform.prefix)?;
        debug!(platform = %platform.name, count = keys.len(), "Listed platform prefix");
        Ok(ReleaseCatalog::load(
            keys,
            &platform.prefix,
            &platform.suffix,
            limit,
        ))
    }

    /// First release in the catalog matching `selector`.
    pub fn find_release(
        &self,
        platform: &Platform,
        selector: &ReleaseSelector,
        now: DateTime<Utc>,
    ) -> Result<Option<Release>> {
        let catalog = self.catalog(platform, 0)?;
        Ok(catalog.find(selector, now).cloned())
    }

    /// Published manifest for a channel, `None` if nothing is published.
    pub fn current_manifest(
        &self,
        channel: &Channel,
        manifest_name: &str,
    ) -> Result<Option<UpdateManifest>> {
        let key = channel.manifest_key(manifest_name, &self.env);
        let data = match self.store.get(&key) {
            Ok(data) => data,
            Err(StorageError::NotFound { .. }) => {
                debug!(key = %key, "No published manifest");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match manifest::decode(&data) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(err) => match self.config.malformed_manifest {
                MalformedManifestPolicy::Fail => Err(err),
                MalformedManifestPolicy::TreatAsMissing => {
                    warn!(key = %key, error = %err, "Ignoring malformed manifest");
                    Ok(None)
                }
            },
        }
    }

    /// Promote the release chosen by `selector` into `channel`.
    pub fn promote(
        &self,
        platform: &Platform,
        channel: &Channel,
        selector: &ReleaseSelector,
    ) -> Result<PromotionOutcome> {
        self.promote_at(platform, channel, selector, Utc::now())
    }

    /// [`Promoter::promote`] with an explicit clock.
    pub fn promote_at(
        &self,
        platform: &Platform,
        channel: &Channel,
        selector: &ReleaseSelector,
        now: DateTime<Utc>,
    ) -> Result<PromotionOutcome> {
        info!(
            platform = %platform.name,
            channel = %channel,
            selector = ?selector,
            "Finding release to promote"
        );
        let Some(release) = self.find_release(platform, selector, now)? else {
            info!(platform = %platform.name, "No matching release found");
            return Ok(PromotionOutcome::NotFound);
        };
        if !release.has_metadata() {
            return Err(ReleaseError::Parse(format!(
                "release {} has no version metadata",
                release.name
            )));
        }
        info!(
            release = %release.name,
            version = %release.version,
            date = %release.date,
            "Found release"
        );

        if let Some(current) = self.current_manifest(channel, platform.manifest_name())? {
            let current_version = current.semver()?;
            let release_version = version::parse_semver(&release.version)?;
            match version::compare_release(&release_version, &current_version) {
                Ordering::Equal => {
                    info!(version = %current.version, "Release is already live");
                    return Ok(PromotionOutcome::Unchanged {
                        release,
                        current: current.version,
                    });
                }
                Ordering::Less => {
                    warn!(
                        release = %release.version,
                        current = %current.version,
                        "Selected release is older than the live version"
                    );
                    return Ok(PromotionOutcome::Older {
                        release,
                        current: current.version,
                    });
                }
                Ordering::Greater => {}
            }
        }

        let source = platform.support_manifest_key(&self.env, &release.version);
        let destination = channel.manifest_key(platform.manifest_name(), &self.env);
        self.copy_object(&source, &destination)?;

        Ok(PromotionOutcome::Promoted {
            release,
            source,
            destination,
            dry_run: self.dry_run,
        })
    }

    /// Promote every platform with a policy into the public channel.
    pub fn promote_scheduled(
        &self,
        platforms: &[&Platform],
        now: DateTime<Utc>,
    ) -> Result<Vec<PlatformOutcome>> {
        let mut outcomes = Vec::with_capacity(platforms.len());
        for platform in platforms {
            let outcome = match &platform.promotion {
                Some(policy) => {
                    self.promote_at(platform, &Channel::Public, &policy.selector(), now)?
                }
                None => {
                    info!(platform = %platform.name, "Promoting releases is unsupported");
                    PromotionOutcome::Unsupported
                }
            };
            outcomes.push(PlatformOutcome {
                platform: platform.name.clone(),
                outcome,
            });
        }
        Ok(outcomes)
    }

    /// Bring the test channel up to date for each platform.
    ///
    /// Platforms sharing a manifest name are mirrored once.
    pub fn promote_test(
        &self,
        platforms: &[&Platform],
        now: DateTime<Utc>,
    ) -> Result<Vec<PlatformOutcome>> {
        let test = Channel::test();
        let mut mirrored = HashSet::new();
        let mut outcomes = Vec::with_capacity(platforms.len());

        for platform in platforms {
            let outcome = match platform.test_promotion {
                TestPromotion::Catalog => {
                    self.promote_at(platform, &test, &ReleaseSelector::latest(), now)?
                }
                TestPromotion::MirrorPublic => {
                    let source = Channel::Public.manifest_key(platform.manifest_name(), &self.env);
                    let destination = test.manifest_key(platform.manifest_name(), &self.env);
                    if !mirrored.insert(destination.clone()) {
                        debug!(key = %destination, "Already mirrored");
                        continue;
                    }
                    self.copy_object(&source, &destination)?;
                    PromotionOutcome::Mirrored {
                        source,
                        destination,
                        dry_run: self.dry_run,
                    }
                }
            };
            outcomes.push(PlatformOutcome {
                platform: platform.name.clone(),
                outcome,
            });
        }
        Ok(outcomes)
    }

    /// Copy each platform's current build to its "latest" key.
    pub fn copy_latest(&self, platforms: &[&Platform]) -> Result<Vec<LatestCopy>> {
        let mut copies = Vec::new();
        for platform in platforms {
            let source = if platform.latest_source.is_some() {
                let current = self
                    .current_manifest(&Channel::Public, platform.manifest_name())?
                    .ok_or_else(|| {
                        ReleaseError::NotFound(format!(
                            "no published manifest at {}",
                            Channel::Public.manifest_key(platform.manifest_name(), &self.env)
                        ))
                    })?;
                platform
                    .latest_source_key(&current.version, &self.env)
                    .ok_or_else(|| {
                        ReleaseError::Config(format!("no latest source for {}", platform.name))
                    })?
            } else {
                match self.find_release(platform, &ReleaseSelector::latest(), Utc::now())? {
                    Some(release) => release.key,
                    None => {
                        info!(platform = %platform.name, "No release to copy");
                        continue;
                    }
                }
            };

            self.copy_object(&source, &platform.latest_name)?;
            copies.push(LatestCopy {
                platform: platform.name.clone(),
                source,
                destination: platform.latest_name.clone(),
                dry_run: self.dry_run,
            });
        }
        Ok(copies)
    }

    /// Move a release and its associated files under `broken/`.
    pub fn mark_broken(&self, release_name: &str, platforms: &[&Platform]) -> BrokenOutcome {
        let selector = ReleaseSelector::ExactName(release_name.to_string());
        let mut outcome = BrokenOutcome::default();

        for platform in platforms {
            let release = match self.find_release(platform, &selector, Utc::now()) {
                Ok(Some(release)) => release,
                Ok(None) => continue,
                Err(err) => {
                    outcome.errors.push(err);
                    continue;
                }
            };
            info!(platform = %platform.name, release = %release.name, "Found release to mark broken");

            for key in platform.release_files(&release, &self.env) {
                let broken_key = format!("{BROKEN_PREFIX}{key}");
                if self.dry_run {
                    info!(from = %key, to = %broken_key, "Dry run, skipping move");
                    outcome.removed.push(key);
                    continue;
                }
                if let Err(err) = self.store.copy(&key, &broken_key, &CopyOptions::public_read()) {
                    warn!(key = %key, error = %err, "Failed to copy to broken");
                    outcome.errors.push(err.into());
                    continue;
                }
                info!(from = %key, to = %broken_key, "Copied");
                match self.store.delete(&key) {
                    Ok(()) => {
                        info!(key = %key, "Deleted");
                        outcome.removed.push(key);
                    }
                    Err(err) => {
                        warn!(key = %key, error = %err, "Failed to delete");
                        outcome.errors.push(err.into());
                    }
                }
            }
            outcome.releases.push(release);
        }
        outcome
    }

    fn copy_object(&self, source: &str, destination: &str) -> Result<()> {
        if self.dry_run {
            info!(from = %source, to = %destination, "Dry run, skipping copy");
            return Ok(());
        }
        self.store
            .copy(source, destination, &CopyOptions::public_read())?;
        info!(from = %source, to = %destination, store = %self.store.describe(), "Copied");
        Ok(())
    }
}
