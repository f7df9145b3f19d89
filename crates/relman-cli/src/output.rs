//! Output formatting for CLI results
//!
//! This module provides consistent output formatting across all CLI commands.
//! It supports three output formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting and automation
//! - Quiet: Minimal output, exit codes only

use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use comfy_table::{presets::UTF8_FULL, Table};
use relman_core::{
    LatestCopy, OrderingViolation, ParsedVersion, PlatformOutcome, PromotionOutcome, Release,
    ReportRow, ReportStatus,
};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for scripting
    Json,
    /// Minimal output - exit codes only
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper for consistent schema
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    /// Whether the operation was successful
    pub success: bool,
    /// The response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Command that was executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl<T: Serialize> JsonResponse<T> {
    /// Create a successful response
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
        }
    }

    /// Create a successful response with command context
    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            command: Some(command.to_string()),
            ..Self::success(data)
        }
    }
}

impl JsonResponse<()> {
    /// Create an error response
    pub fn error(message: &str) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
        }
    }
}

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// Get the current output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    /// Format a single value such as a version or URL.
    ///
    /// Table mode prints the bare value so scripts can capture it.
    pub fn format_value(&self, key: &str, value: &str, command: &str) -> String {
        match self.format {
            OutputFormat::Table => value.to_string(),
            OutputFormat::Json => {
                let mut data = serde_json::Map::new();
                data.insert(key.to_string(), serde_json::Value::String(value.to_string()));
                self.to_json_response(&data, command)
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format the pieces parsed out of an artifact name
    pub fn format_parsed_version(&self, name: &str, parsed: &ParsedVersion) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Property", "Value"]);
                table.add_row(vec!["Name", name]);
                table.add_row(vec!["Version", &parsed.version]);
                table.add_row(vec!["Published", &format_time(&parsed.published_at)]);
                table.add_row(vec!["Commit", parsed.commit.as_deref().unwrap_or("-")]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(
                &ParsedVersionOutput {
                    name: name.to_string(),
                    version: parsed.version.clone(),
                    published_at: parsed.published_at.to_rfc3339(),
                    commit: parsed.commit.clone(),
                },
                "version-parse",
            ),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format catalog listings, one entry per (platform, release)
    pub fn format_releases(&self, releases: &[(String, Release)]) -> String {
        match self.format {
            OutputFormat::Table => {
                if releases.is_empty() {
                    return "No releases found.".to_string();
                }
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Platform", "Name", "Version", "Date", "Commit"]);
                for (platform, release) in releases {
                    table.add_row(vec![
                        platform.as_str(),
                        &release.name,
                        or_dash(&release.version),
                        &release_date(release),
                        release.commit.as_deref().unwrap_or("-"),
                    ]);
                }
                table.to_string()
            }
            OutputFormat::Json => {
                let output = ReleasesOutput {
                    count: releases.len(),
                    releases: releases
                        .iter()
                        .map(|(platform, release)| ReleaseJson::new(platform, release))
                        .collect(),
                };
                self.to_json_response(&output, "list")
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format adjacent releases whose versions go backwards
    pub fn format_violations(&self, violations: &[(String, OrderingViolation)]) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Platform", "Newer", "Version", "Older", "Version"]);
                for (platform, v) in violations {
                    table.add_row(vec![
                        platform.as_str(),
                        &v.newer,
                        &v.newer_version,
                        &v.older,
                        &v.older_version,
                    ]);
                }
                table.to_string()
            }
            OutputFormat::Json => {
                let output: Vec<ViolationJson> = violations
                    .iter()
                    .map(|(platform, v)| ViolationJson {
                        platform: platform.clone(),
                        newer: v.newer.clone(),
                        newer_version: v.newer_version.clone(),
                        older: v.older.clone(),
                        older_version: v.older_version.clone(),
                    })
                    .collect();
                self.to_json_response(&output, "list --check-order")
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format promotion outcomes
    pub fn format_outcomes(&self, outcomes: &[PlatformOutcome], command: &str) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Platform", "Outcome", "Release", "Detail"]);
                for o in outcomes {
                    let release = o
                        .outcome
                        .release()
                        .map(|r| r.name.as_str())
                        .unwrap_or("-");
                    table.add_row(vec![
                        o.platform.as_str(),
                        outcome_label(&o.outcome),
                        release,
                        &outcome_detail(&o.outcome),
                    ]);
                }
                table.to_string()
            }
            OutputFormat::Json => {
                let output: Vec<OutcomeJson> = outcomes.iter().map(OutcomeJson::from).collect();
                self.to_json_response(&output, command)
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format "latest" pointer copies
    pub fn format_latest_copies(&self, copies: &[LatestCopy]) -> String {
        match self.format {
            OutputFormat::Table => {
                if copies.is_empty() {
                    return "Nothing to copy.".to_string();
                }
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Platform", "Source", "Destination", "Dry Run"]);
                for c in copies {
                    table.add_row(vec![
                        c.platform.as_str(),
                        &c.source,
                        &c.destination,
                        yes_no(c.dry_run),
                    ]);
                }
                table.to_string()
            }
            OutputFormat::Json => {
                let output: Vec<LatestCopyJson> = copies
                    .iter()
                    .map(|c| LatestCopyJson {
                        platform: c.platform.clone(),
                        source: c.source.clone(),
                        destination: c.destination.clone(),
                        dry_run: c.dry_run,
                    })
                    .collect();
                self.to_json_response(&output, "copy-latest")
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format the keys moved under `broken/`
    pub fn format_broken(&self, removed: &[String]) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Moved to broken/"]);
                for key in removed {
                    table.add_row(vec![key.as_str()]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(
                &BrokenJson {
                    count: removed.len(),
                    removed: removed.to_vec(),
                },
                "mark-broken",
            ),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format the published state report
    pub fn format_report(&self, rows: &[ReportRow]) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Platform", "Channel", "Version", "Published"]);
                for row in rows {
                    let (version, published) = match &row.status {
                        ReportStatus::Published {
                            version,
                            published_at,
                        } => (
                            version.clone(),
                            published_at
                                .as_ref()
                                .map(format_time)
                                .unwrap_or_else(|| "-".to_string()),
                        ),
                        ReportStatus::None => ("None".to_string(), "-".to_string()),
                        ReportStatus::Error(e) => ("Error".to_string(), e.clone()),
                    };
                    table.add_row(vec![
                        row.platform.clone(),
                        row.channel.to_string(),
                        version,
                        published,
                    ]);
                }
                table.to_string()
            }
            OutputFormat::Json => {
                let output: Vec<ReportJson> = rows.iter().map(ReportJson::from).collect();
                self.to_json_response(&output, "report")
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format a generic success result
    pub fn format_success<T: Serialize>(&self, data: &T, command: &str) -> String {
        match self.format {
            OutputFormat::Table => String::new(),
            OutputFormat::Json => self.to_json_response(data, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format error
    pub fn format_error(&self, error: &dyn std::error::Error) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {error}"),
            OutputFormat::Json => self.to_json(&ErrorOutput {
                error: error.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            }),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format progress message (only shown in verbose mode)
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    /// Format success message
    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("✓ {message}");
        }
    }

    /// Format error message
    pub fn error(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("✗ {message}");
        } else if self.format == OutputFormat::Json {
            println!(
                "{}",
                self.to_json(&ErrorOutput {
                    error: message.to_string(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                })
            );
        }
    }

    /// Format warning message
    pub fn warning(&self, message: &str) {
        if self.format == OutputFormat::Table {
            eprintln!("⚠ {message}");
        } else if self.format == OutputFormat::Json {
            eprintln!(
                "{}",
                self.to_json(&WarningOutput {
                    warning: message.to_string(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                })
            );
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    /// Format data with consistent JSON response wrapper
    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        let response = JsonResponse::success_with_command(value, command);
        serde_json::to_string_pretty(&response).unwrap_or_else(|e| {
            self.to_json(&JsonResponse::<()>::error(&format!("Serialization error: {e}")))
        })
    }
}

fn format_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

fn release_date(release: &Release) -> String {
    if release.has_metadata() {
        format_time(&release.date)
    } else {
        "-".to_string()
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn outcome_label(outcome: &PromotionOutcome) -> &'static str {
    match outcome {
        PromotionOutcome::Promoted { dry_run: true, .. } => "would promote",
        PromotionOutcome::Mirrored { dry_run: true, .. } => "would mirror",
        other => other.label(),
    }
}

fn outcome_detail(outcome: &PromotionOutcome) -> String {
    match outcome {
        PromotionOutcome::NotFound => "no eligible release".to_string(),
        PromotionOutcome::Unchanged { current, .. } => format!("{current} is live"),
        PromotionOutcome::Older { current, .. } => format!("{current} is newer and live"),
        PromotionOutcome::Promoted {
            source,
            destination,
            ..
        }
        | PromotionOutcome::Mirrored {
            source,
            destination,
            ..
        } => format!("{source} -> {destination}"),
        PromotionOutcome::Unsupported => "no promotion policy".to_string(),
    }
}

// JSON output structures

#[derive(Serialize)]
struct ParsedVersionOutput {
    name: String,
    version: String,
    published_at: String,
    commit: Option<String>,
}

#[derive(Serialize)]
struct ReleasesOutput {
    releases: Vec<ReleaseJson>,
    count: usize,
}

#[derive(Serialize)]
struct ReleaseJson {
    platform: String,
    name: String,
    key: String,
    version: Option<String>,
    date: Option<String>,
    commit: Option<String>,
}

impl ReleaseJson {
    fn new(platform: &str, release: &Release) -> Self {
        let parsed = release.has_metadata();
        Self {
            platform: platform.to_string(),
            name: release.name.clone(),
            key: release.key.clone(),
            version: parsed.then(|| release.version.clone()),
            date: parsed.then(|| release.date.to_rfc3339()),
            commit: release.commit.clone(),
        }
    }
}

#[derive(Serialize)]
struct ViolationJson {
    platform: String,
    newer: String,
    newer_version: String,
    older: String,
    older_version: String,
}

#[derive(Serialize)]
struct OutcomeJson {
    platform: String,
    outcome: &'static str,
    release: Option<ReleaseJson>,
    current: Option<String>,
    source: Option<String>,
    destination: Option<String>,
    dry_run: bool,
}

impl From<&PlatformOutcome> for OutcomeJson {
    fn from(o: &PlatformOutcome) -> Self {
        let (current, source, destination, dry_run) = match &o.outcome {
            PromotionOutcome::Unchanged { current, .. } | PromotionOutcome::Older { current, .. } => {
                (Some(current.clone()), None, None, false)
            }
            PromotionOutcome::Promoted {
                source,
                destination,
                dry_run,
                ..
            }
            | PromotionOutcome::Mirrored {
                source,
                destination,
                dry_run,
            } => (None, Some(source.clone()), Some(destination.clone()), *dry_run),
            PromotionOutcome::NotFound | PromotionOutcome::Unsupported => (None, None, None, false),
        };
        Self {
            platform: o.platform.clone(),
            outcome: o.outcome.label(),
            release: o.outcome.release().map(|r| ReleaseJson::new(&o.platform, r)),
            current,
            source,
            destination,
            dry_run,
        }
    }
}

#[derive(Serialize)]
struct LatestCopyJson {
    platform: String,
    source: String,
    destination: String,
    dry_run: bool,
}

#[derive(Serialize)]
struct BrokenJson {
    removed: Vec<String>,
    count: usize,
}

#[derive(Serialize)]
struct ReportJson {
    platform: String,
    channel: String,
    status: &'static str,
    version: Option<String>,
    published_at: Option<String>,
    error: Option<String>,
}

impl From<&ReportRow> for ReportJson {
    fn from(row: &ReportRow) -> Self {
        let mut out = Self {
            platform: row.platform.clone(),
            channel: row.channel.to_string(),
            status: "none",
            version: None,
            published_at: None,
            error: None,
        };
        match &row.status {
            ReportStatus::Published {
                version,
                published_at,
            } => {
                out.status = "published";
                out.version = Some(version.clone());
                out.published_at = published_at.as_ref().map(|at| at.to_rfc3339());
            }
            ReportStatus::None => {}
            ReportStatus::Error(e) => {
                out.status = "error";
                out.error = Some(e.clone());
            }
        }
        out
    }
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
    timestamp: String,
}

#[derive(Serialize)]
struct WarningOutput {
    warning: String,
    timestamp: String,
}

/// Simple success message for JSON output
#[derive(Serialize)]
pub struct SuccessMessage {
    pub message: String,
}

impl SuccessMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
