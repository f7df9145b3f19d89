//! Version metadata embedded in artifact file names.
//!
//! Build artifacts carry their version, build time and source commit in
//! the file name. Two conventions are recognized:
//!
//! - Generic: `<name>-<major>.<minor>.<patch>-<YYYYMMDDhhmmss>+<commit>.<ext>`,
//!   parsed as a strict semantic version.
//! - Linux packages (`.deb`, `.rpm`): RPM forbids characters that semantic
//!   versions require, so these are matched with a looser regex.
//!
//! Timestamps are always decoded as UTC.

use std::cmp::Ordering;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use semver::Version;

use crate::error::{ReleaseError, Result};

/// Layout of the 14-digit build timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Required length of a commit component.
pub const COMMIT_LEN: usize = 7;

const LINUX_EXTENSIONS: [&str; 2] = [".deb", ".rpm"];

const LINUX_PATTERN: &str = r"(\d+\.\d+\.\d+)[-.](\d+)[+.]([[:alnum:]]+)";

/// Metadata recovered from an artifact file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVersion {
    /// Normalized `major.minor.patch`
    pub version: String,
    /// Build timestamp (UTC)
    pub published_at: DateTime<Utc>,
    /// Short commit hash, if present and well formed
    pub commit: Option<String>,
}

/// Parse version, timestamp and commit out of an artifact file name.
///
/// # Errors
///
/// Returns `ReleaseError::Parse` if the name matches neither convention or
/// the embedded timestamp is not a valid `YYYYMMDDhhmmss` value.
pub fn parse(name: &str) -> Result<ParsedVersion> {
    if LINUX_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        return parse_linux(name);
    }
    parse_generic(name)
}

fn parse_generic(name: &str) -> Result<ParsedVersion> {
    let start = name
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| ReleaseError::Parse(format!("no version in {name}")))?;
    let verstr = strip_extension(&name[start..]);

    let sversion = Version::parse(verstr)
        .map_err(|e| ReleaseError::Parse(format!("invalid version {verstr}: {e}")))?;

    let pre: Vec<&str> = if sversion.pre.is_empty() {
        Vec::new()
    } else {
        sversion.pre.as_str().split('.').collect()
    };
    if pre.len() != 1 {
        return Err(ReleaseError::Parse(format!("invalid prerelease in {name}")));
    }

    let build = sversion
        .build
        .as_str()
        .split('.')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    // Anything other than a short sha is build noise, not a commit
    let commit = (build.len() == COMMIT_LEN).then_some(build);

    Ok(ParsedVersion {
        version: format!("{}.{}.{}", sversion.major, sversion.minor, sversion.patch),
        published_at: decode_timestamp(pre[0])?,
        commit,
    })
}

fn parse_linux(name: &str) -> Result<ParsedVersion> {
    let caps = linux_regex()
        .captures(name)
        .ok_or_else(|| ReleaseError::Parse(format!("no package version in {name}")))?;

    Ok(ParsedVersion {
        version: caps[1].to_string(),
        published_at: decode_timestamp(&caps[2])?,
        commit: Some(caps[3].to_string()),
    })
}

fn linux_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LINUX_PATTERN).expect("linux package pattern is valid"))
}

/// Remove a trailing file extension.
///
/// Any final dot-suffix without `-` or `+` is an extension, so `.7z` is
/// stripped while a bare `1.2.3-...+abc1234` is left intact.
fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains(&['-', '+'][..]) => stem,
        _ => name,
    }
}

/// Decode a `YYYYMMDDhhmmss` timestamp as UTC.
pub fn decode_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if s.len() != 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ReleaseError::Parse(format!("invalid timestamp {s}")));
    }
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| ReleaseError::Parse(format!("invalid timestamp {s}: {e}")))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Build an artifact name in the generic convention.
pub fn render(
    prefix: &str,
    version: &str,
    published_at: DateTime<Utc>,
    commit: Option<&str>,
    extension: &str,
) -> String {
    let mut name = format!(
        "{prefix}-{version}-{}",
        published_at.format(TIMESTAMP_FORMAT)
    );
    if let Some(commit) = commit {
        name.push('+');
        name.push_str(commit);
    }
    if !extension.is_empty() {
        name.push('.');
        name.push_str(extension);
    }
    name
}

/// Strictly parse a semantic version string.
pub fn parse_semver(s: &str) -> Result<Version> {
    Ok(Version::parse(s.trim())?)
}

/// Compare two versions by precedence, ignoring build metadata.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// Compare two versions by `major.minor.patch` only.
///
/// Catalog releases carry just the release triple, while published
/// manifests may hold the full build version.
pub fn compare_release(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch).cmp(&(b.major, b.minor, b.patch))
}
