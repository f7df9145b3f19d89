//! Release catalog built from an object-store listing.
//!
//! Every artifact under a platform prefix becomes a [`Release`]. Names that
//! do not carry version metadata are kept (with a warning) so that they can
//! still be addressed by name, but time-based selection never picks them.

use std::time::{Duration, UNIX_EPOCH};

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use semver::Version;
use tracing::{debug, warn};

use crate::version;

/// Timezone used for release dates and cutoff hours.
pub const REFERENCE_TZ: Tz = chrono_tz::America::New_York;

/// Listing entry that is never an artifact.
pub const INDEX_PAGE: &str = "index.html";

/// One discovered build artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    /// File name, relative to the platform prefix
    pub name: String,
    /// Full storage key
    pub key: String,
    /// `major.minor.patch`, empty when the name could not be parsed
    pub version: String,
    /// Build time in the reference timezone; the epoch when unparsed
    pub date: DateTime<Tz>,
    pub commit: Option<String>,
}

impl Release {
    /// Build a release from its storage key.
    pub fn from_key(key: &str, prefix: &str) -> Self {
        let name = key.strip_prefix(prefix).unwrap_or(key).to_string();
        match version::parse(&name) {
            Ok(parsed) => Self {
                version: parsed.version,
                date: parsed.published_at.with_timezone(&REFERENCE_TZ),
                commit: parsed.commit,
                key: key.to_string(),
                name,
            },
            Err(err) => {
                warn!(name = %name, error = %err, "Couldn't get version from name");
                Self {
                    version: String::new(),
                    date: DateTime::<Utc>::from(UNIX_EPOCH).with_timezone(&REFERENCE_TZ),
                    commit: None,
                    key: key.to_string(),
                    name,
                }
            }
        }
    }

    /// Whether version metadata was recovered from the name.
    pub fn has_metadata(&self) -> bool {
        !self.version.is_empty()
    }

    pub fn semver(&self) -> Option<Version> {
        version::parse_semver(&self.version).ok()
    }

    /// Time since the build, zero for builds dated in the future.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.date.with_timezone(&Utc))
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Hour of day the build was made, in the reference timezone.
    pub fn local_hour(&self) -> u32 {
        self.date.hour()
    }
}

/// How a release is picked out of a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseSelector {
    /// Most recent release old enough and built before the cutoff hour.
    /// Zero values disable either check.
    FirstEligible { min_delay: Duration, cutoff_hour: u32 },
    ExactName(String),
    /// Most recent release with this `major.minor.patch`
    ExactVersion(String),
}

impl ReleaseSelector {
    /// The most recent release with metadata.
    pub fn latest() -> Self {
        Self::FirstEligible {
            min_delay: Duration::ZERO,
            cutoff_hour: 0,
        }
    }

    pub fn matches(&self, release: &Release, now: DateTime<Utc>) -> bool {
        match self {
            Self::FirstEligible {
                min_delay,
                cutoff_hour,
            } => {
                if !release.has_metadata() {
                    return false;
                }
                if !min_delay.is_zero() && release.age(now) < *min_delay {
                    debug!(release = %release.name, "Release is too new");
                    return false;
                }
                if *cutoff_hour != 0 && release.local_hour() >= *cutoff_hour {
                    debug!(
                        release = %release.name,
                        hour = release.local_hour(),
                        cutoff = cutoff_hour,
                        "Release is past the cutoff hour"
                    );
                    return false;
                }
                true
            }
            Self::ExactName(name) => release.name == *name,
            Self::ExactVersion(version) => release.has_metadata() && release.version == *version,
        }
    }
}

/// Adjacent releases whose versions go backwards in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingViolation {
    pub newer: String,
    pub newer_version: String,
    pub older: String,
    pub older_version: String,
}

/// Releases for one platform, most recent first.
#[derive(Debug, Clone, Default)]
pub struct ReleaseCatalog {
    releases: Vec<Release>,
}

impl ReleaseCatalog {
    /// Build a catalog from storage keys.
    ///
    /// Keys not ending in `suffix` and the index page are skipped. A
    /// positive `limit` keeps only the most recent releases.
    pub fn load<I, K>(keys: I, prefix: &str, suffix: &str, limit: usize) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut releases: Vec<Release> = keys
            .into_iter()
            .filter(|key| key.as_ref().ends_with(suffix))
            .filter(|key| key.as_ref().strip_prefix(prefix).unwrap_or(key.as_ref()) != INDEX_PAGE)
            .map(|key| Release::from_key(key.as_ref(), prefix))
            .collect();

        // Stable: equal dates keep listing order
        releases.sort_by(|a, b| b.date.cmp(&a.date));
        if limit > 0 {
            releases.truncate(limit);
        }
        Self { releases }
    }

    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn into_releases(self) -> Vec<Release> {
        self.releases
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Release> {
        self.releases.iter()
    }

    /// First release matching the selector.
    pub fn find(&self, selector: &ReleaseSelector, now: DateTime<Utc>) -> Option<&Release> {
        self.releases.iter().find(|r| selector.matches(r, now))
    }

    /// Pairs where a more recent build carries a lower version.
    pub fn check_ordering(&self) -> Vec<OrderingViolation> {
        let parsed: Vec<(&Release, Version)> = self
            .releases
            .iter()
            .filter_map(|r| r.semver().map(|v| (r, v)))
            .collect();

        parsed
            .windows(2)
            .filter(|pair| version::compare(&pair[0].1, &pair[1].1).is_lt())
            .map(|pair| OrderingViolation {
                newer: pair[0].0.name.clone(),
                newer_version: pair[0].0.version.clone(),
                older: pair[1].0.name.clone(),
                older_version: pair[1].0.version.clone(),
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ReleaseCatalog {
    type Item = &'a Release;
    type IntoIter = std::slice::Iter<'a, Release>;

    fn into_iter(self) -> Self::IntoIter {
        self.releases.iter()
    }
}
