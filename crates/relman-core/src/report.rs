//! Summary of what is currently published.

use std::collections::HashSet;

use chrono::DateTime;
use chrono_tz::Tz;

use crate::catalog::REFERENCE_TZ;
use crate::channel::Channel;
use crate::promotion::Promoter;
use crate::storage::ObjectStore;

/// Published state of one channel manifest.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportStatus {
    Published {
        version: String,
        published_at: Option<DateTime<Tz>>,
    },
    /// Nothing published
    None,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    /// Manifest platform name
    pub platform: String,
    pub channel: Channel,
    pub status: ReportStatus,
}

/// Read the test and public manifests of every distinct manifest name.
///
/// Failures are reported per row rather than aborting the report.
pub fn build_report<S: ObjectStore>(promoter: &Promoter<'_, S>) -> Vec<ReportRow> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for platform in &promoter.config().platforms {
        let name = platform.manifest_name();
        if !seen.insert(name) {
            continue;
        }
        for channel in [Channel::test(), Channel::Public] {
            let status = match promoter.current_manifest(&channel, name) {
                Ok(Some(manifest)) => ReportStatus::Published {
                    published_at: manifest
                        .published_at_utc()
                        .map(|at| at.with_timezone(&REFERENCE_TZ)),
                    version: manifest.version,
                },
                Ok(None) => ReportStatus::None,
                Err(err) => ReportStatus::Error(err.to_string()),
            };
            rows.push(ReportRow {
                platform: name.to_string(),
                channel,
                status,
            });
        }
    }
    rows
}
