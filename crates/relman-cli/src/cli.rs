//! CLI command definitions and argument parsing

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use relman_core::{
    build_report, manifest, version, Channel, EncodeRequest, FilesystemStore, Platform,
    PlatformOutcome, Promoter, ReleaseSelector,
};
use url::Url;

use crate::config::{CliOverrides, Config};
use crate::github::{self, GithubClient, GithubError};
use crate::output::{OutputFormat, OutputFormatter, SuccessMessage};
use crate::ExitCode;

/// relman - release tool for build and release scripts
#[derive(Parser, Debug)]
#[command(name = "relman")]
#[command(version, about = "Release tool for build and release scripts")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json, quiet
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Bucket directory (overrides storage.root)
    #[arg(long, global = true, env = "RELMAN_BUCKET")]
    pub bucket: Option<PathBuf>,

    /// Manifest environment (overrides release.environment)
    #[arg(long, global = true)]
    pub env: Option<String>,
}

impl Cli {
    /// Config values overridden by global flags
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            output_format: self.output.map(|format| format.to_string()),
            verbose: if self.verbose { Some(true) } else { None },
            debug: if self.debug { Some(true) } else { None },
            bucket: self.bucket.clone(),
            environment: self.env.clone(),
        }
    }

    /// Execute the CLI command with a pre-loaded configuration
    pub fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let ctx = Context::new(config);

        match self.command {
            Commands::VersionParse(args) => args.execute(&ctx),
            Commands::Platform => {
                ctx.emit(ctx.formatter.format_value("platform", current_platform(), "platform"));
                Ok(ExitCode::Success)
            }
            Commands::UpdateJson(args) => args.execute(&ctx),
            Commands::List(args) => args.execute(&ctx),
            Commands::PromoteRelease(args) => args.execute(&ctx),
            Commands::PromoteReleases(args) => args.execute(&ctx, Schedule::Public),
            Commands::PromoteTestReleases(args) => args.execute(&ctx, Schedule::Test),
            Commands::CopyLatest(args) => args.execute(&ctx),
            Commands::MarkBroken(args) => args.execute(&ctx),
            Commands::Report => execute_report(&ctx),
            Commands::LatestVersion(args) => args.execute(&ctx),
            Commands::Url(args) => args.execute(&ctx),
            Commands::Create(args) => args.execute(&ctx),
            Commands::Upload(args) => args.execute(&ctx),
            Commands::Download(args) => args.execute(&ctx),
        }
    }
}

/// Resolved settings shared by every command
pub struct Context {
    pub config: Config,
    pub formatter: OutputFormatter,
}

impl Context {
    pub fn new(config: Config) -> Self {
        let format = config.output.format.parse().unwrap_or_default();
        let formatter = OutputFormatter::new(format, config.output.verbose);
        Self { config, formatter }
    }

    /// Print formatted output unless there is none.
    fn emit(&self, text: String) {
        if !text.is_empty() {
            println!("{text}");
        }
    }

    fn invalid(&self, message: &str) -> ExitCode {
        self.formatter.error(message);
        ExitCode::InvalidInput
    }

    fn store(&self) -> Result<FilesystemStore, ExitCode> {
        match &self.config.storage.root {
            Some(root) => {
                self.formatter
                    .progress(&format!("Using bucket {}", root.display()));
                Ok(FilesystemStore::new(root))
            }
            None => Err(self.invalid("No bucket configured; pass --bucket or set storage.root")),
        }
    }

    fn platforms(&self, name: &str) -> Result<Vec<&Platform>, ExitCode> {
        self.config
            .release
            .select(name)
            .map_err(|e| self.invalid(&e.to_string()))
    }

    fn github(&self) -> anyhow::Result<GithubClient> {
        GithubClient::new(
            &self.config.github.api_url,
            GithubClient::token_from_env(),
            self.config.network.timeout(),
        )
        .context("Failed to create GitHub client")
    }

    fn owner<'a>(&'a self, flag: &'a Option<String>) -> Result<&'a str, ExitCode> {
        match flag.as_deref() {
            Some(owner) if !owner.is_empty() => Ok(owner),
            _ if !self.config.github.owner.is_empty() => Ok(&self.config.github.owner),
            _ => Err(self.invalid("No repository owner; pass --owner or set github.owner")),
        }
    }
}

/// Unwrap a lookup that already reported its failure.
macro_rules! try_code {
    ($e:expr) => {
        match $e {
            Ok(value) => value,
            Err(code) => return Ok(code),
        }
    };
}

/// Platform name of the running OS, using `darwin` for macOS.
pub fn current_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse version, build time and commit from an artifact name
    VersionParse(VersionParseArgs),
    /// Print the OS platform name
    Platform,
    /// Generate an update manifest for the updater
    UpdateJson(UpdateJsonArgs),
    /// List releases in the bucket, newest first
    List(ListArgs),
    /// Promote a release into a channel
    PromoteRelease(PromoteReleaseArgs),
    /// Promote releases using each platform's schedule
    PromoteReleases(ScheduleArgs),
    /// Bring the test channel up to date
    PromoteTestReleases(ScheduleArgs),
    /// Copy the current build of each platform to its "latest" key
    CopyLatest(CopyLatestArgs),
    /// Move a release and its associated files under broken/
    MarkBroken(MarkBrokenArgs),
    /// Show what is published on each channel
    Report,
    /// Get the latest version of a GitHub repo
    LatestVersion(LatestVersionArgs),
    /// Get the GitHub release URL for a version
    Url(UrlArgs),
    /// Create a GitHub release
    Create(CreateArgs),
    /// Upload a file to a GitHub release
    Upload(UploadArgs),
    /// Download a file from a GitHub release
    Download(DownloadArgs),
}

/// Platform selection: a platform name, a family, or all when empty
#[derive(Args, Debug, Default)]
pub struct PlatformArg {
    /// Platform name or family (darwin, linux, windows); all when omitted
    #[arg(long, default_value = "")]
    pub platform: String,
}

/// Repository selection
#[derive(Args, Debug)]
pub struct RepoArgs {
    /// Repository owner (defaults to github.owner)
    #[arg(long)]
    pub owner: Option<String>,

    /// Repository name
    #[arg(long)]
    pub repo: String,
}

/// Arguments for the version-parse command
#[derive(Args, Debug)]
pub struct VersionParseArgs {
    /// Artifact file name
    pub name: String,
}

impl VersionParseArgs {
    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        match version::parse(&self.name) {
            Ok(parsed) => {
                ctx.emit(ctx.formatter.format_parsed_version(&self.name, &parsed));
                Ok(ExitCode::Success)
            }
            Err(e) => Ok(ctx.invalid(&e.to_string())),
        }
    }
}

/// Arguments for the update-json command
#[derive(Args, Debug)]
pub struct UpdateJsonArgs {
    /// Version
    #[arg(long)]
    pub version: String,

    /// Release name (defaults to v<version>)
    #[arg(long)]
    pub name: Option<String>,

    /// Source file the asset describes
    #[arg(long)]
    pub src: Option<PathBuf>,

    /// Base URI the source file is served from
    #[arg(long)]
    pub uri: Option<Url>,

    /// File holding the release description
    #[arg(long)]
    pub description: Option<PathBuf>,

    /// File holding the asset signature
    #[arg(long)]
    pub signature: Option<PathBuf>,

    /// Installer code as KEY=VALUE (repeatable)
    #[arg(long = "installer-code", value_parser = parse_key_val)]
    pub installer_codes: Vec<(String, String)>,

    /// Write the manifest here instead of stdout
    #[arg(long)]
    pub dest: Option<PathBuf>,
}

impl UpdateJsonArgs {
    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        let name = self
            .name
            .unwrap_or_else(|| github::tag_for_version(&self.version));
        let mut req = EncodeRequest::new(self.version, name);
        req.source_file = self.src;
        req.base_uri = self.uri;
        req.description_file = self.description;
        req.signature_file = self.signature;
        req.installer_codes = self.installer_codes.into_iter().collect::<BTreeMap<_, _>>();

        let encoded = manifest::encode(&req)?;
        match self.dest {
            Some(dest) => {
                std::fs::write(&dest, &encoded)
                    .with_context(|| format!("Failed to write {}", dest.display()))?;
                ctx.formatter
                    .success(&format!("Wrote update manifest to {}", dest.display()));
                ctx.emit(ctx.formatter.format_success(
                    &SuccessMessage::new(dest.display().to_string()),
                    "update-json",
                ));
            }
            None => println!("{}", String::from_utf8_lossy(&encoded)),
        }
        Ok(ExitCode::Success)
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Arguments for the list command
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub platform: PlatformArg,

    /// Keep only the most recent N releases per platform (0 = all)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    /// Report newer releases carrying a lower version
    #[arg(long)]
    pub check_order: bool,
}

impl ListArgs {
    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        let store = try_code!(ctx.store());
        let platforms = try_code!(ctx.platforms(&self.platform.platform));
        let promoter = Promoter::new(&store, &ctx.config.release);

        let mut releases = Vec::new();
        let mut violations = Vec::new();
        for platform in platforms {
            ctx.formatter
                .progress(&format!("Listing {}", platform.prefix));
            let catalog = promoter.catalog(platform, self.limit)?;
            if self.check_order {
                violations.extend(
                    catalog
                        .check_ordering()
                        .into_iter()
                        .map(|v| (platform.name.clone(), v)),
                );
            }
            releases.extend(
                catalog
                    .into_releases()
                    .into_iter()
                    .map(|r| (platform.name.clone(), r)),
            );
        }

        ctx.emit(ctx.formatter.format_releases(&releases));
        if violations.is_empty() {
            return Ok(ExitCode::Success);
        }
        ctx.formatter.warning(&format!(
            "{} release(s) are newer than a higher version",
            violations.len()
        ));
        ctx.emit(ctx.formatter.format_violations(&violations));
        Ok(ExitCode::GeneralError)
    }
}

/// Arguments for the promote-release command
#[derive(Args, Debug)]
pub struct PromoteReleaseArgs {
    #[command(flatten)]
    pub platform: PlatformArg,

    /// Channel to promote into (public when omitted)
    #[arg(long, default_value = "")]
    pub channel: String,

    /// Exact artifact name to promote
    #[arg(long, conflicts_with = "version")]
    pub release: Option<String>,

    /// Promote the most recent build of this version
    #[arg(long)]
    pub version: Option<String>,

    /// Minimum build age in hours
    #[arg(long, default_value_t = 0)]
    pub delay_hours: u64,

    /// Skip builds made at or after this hour (America/New_York, 0 = any)
    #[arg(long, default_value_t = 0)]
    pub cutoff_hour: u32,

    /// Show what would change without writing
    #[arg(long)]
    pub dry_run: bool,
}

impl PromoteReleaseArgs {
    pub fn selector(&self) -> ReleaseSelector {
        if let Some(name) = &self.release {
            ReleaseSelector::ExactName(name.clone())
        } else if let Some(version) = &self.version {
            ReleaseSelector::ExactVersion(version.clone())
        } else {
            ReleaseSelector::FirstEligible {
                min_delay: Duration::from_secs(self.delay_hours * 3600),
                cutoff_hour: self.cutoff_hour,
            }
        }
    }

    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        if self.cutoff_hour > 23 {
            return Ok(ctx.invalid("--cutoff-hour must be 0-23"));
        }
        let store = try_code!(ctx.store());
        let platforms = try_code!(ctx.platforms(&self.platform.platform));
        let promoter = Promoter::new(&store, &ctx.config.release).dry_run(self.dry_run);
        let channel = Channel::named(self.channel.as_str());
        let selector = self.selector();

        let mut outcomes = Vec::with_capacity(platforms.len());
        for platform in platforms {
            ctx.formatter
                .progress(&format!("Promoting {} into {channel}", platform.name));
            outcomes.push(PlatformOutcome {
                platform: platform.name.clone(),
                outcome: promoter.promote(platform, &channel, &selector)?,
            });
        }

        ctx.emit(ctx.formatter.format_outcomes(&outcomes, "promote-release"));
        Ok(ExitCode::Success)
    }
}

/// Which scheduled promotion to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Public,
    Test,
}

/// Arguments for the promote-releases and promote-test-releases commands
#[derive(Args, Debug)]
pub struct ScheduleArgs {
    #[command(flatten)]
    pub platform: PlatformArg,

    /// Show what would change without writing
    #[arg(long)]
    pub dry_run: bool,
}

impl ScheduleArgs {
    pub fn execute(self, ctx: &Context, schedule: Schedule) -> anyhow::Result<ExitCode> {
        let store = try_code!(ctx.store());
        let platforms = try_code!(ctx.platforms(&self.platform.platform));
        let promoter = Promoter::new(&store, &ctx.config.release).dry_run(self.dry_run);

        let (outcomes, command) = match schedule {
            Schedule::Public => (
                promoter.promote_scheduled(&platforms, Utc::now())?,
                "promote-releases",
            ),
            Schedule::Test => (
                promoter.promote_test(&platforms, Utc::now())?,
                "promote-test-releases",
            ),
        };

        ctx.emit(ctx.formatter.format_outcomes(&outcomes, command));
        Ok(ExitCode::Success)
    }
}

/// Arguments for the copy-latest command
#[derive(Args, Debug)]
pub struct CopyLatestArgs {
    #[command(flatten)]
    pub platform: PlatformArg,

    /// Show what would be copied without writing
    #[arg(long)]
    pub dry_run: bool,
}

impl CopyLatestArgs {
    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        let store = try_code!(ctx.store());
        let platforms = try_code!(ctx.platforms(&self.platform.platform));
        let promoter = Promoter::new(&store, &ctx.config.release).dry_run(self.dry_run);

        let copies = promoter.copy_latest(&platforms)?;
        ctx.emit(ctx.formatter.format_latest_copies(&copies));
        Ok(ExitCode::Success)
    }
}

/// Arguments for the mark-broken command
#[derive(Args, Debug)]
pub struct MarkBrokenArgs {
    /// Artifact name of the broken release
    #[arg(long)]
    pub release: String,

    #[command(flatten)]
    pub platform: PlatformArg,

    /// Show what would be moved without writing
    #[arg(long)]
    pub dry_run: bool,
}

impl MarkBrokenArgs {
    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        let store = try_code!(ctx.store());
        let platforms = try_code!(ctx.platforms(&self.platform.platform));
        let promoter = Promoter::new(&store, &ctx.config.release).dry_run(self.dry_run);

        let outcome = promoter.mark_broken(&self.release, &platforms);
        if outcome.releases.is_empty() && outcome.errors.is_empty() {
            ctx.formatter
                .error(&format!("No release named {}", self.release));
            return Ok(ExitCode::NotFound);
        }

        ctx.emit(ctx.formatter.format_broken(&outcome.removed));
        match outcome.into_result() {
            Ok(_) => Ok(ExitCode::Success),
            Err(e) => {
                ctx.formatter.error(&e.to_string());
                Ok(ExitCode::GeneralError)
            }
        }
    }
}

fn execute_report(ctx: &Context) -> anyhow::Result<ExitCode> {
    let store = try_code!(ctx.store());
    let promoter = Promoter::new(&store, &ctx.config.release);
    let rows = build_report(&promoter);
    ctx.emit(ctx.formatter.format_report(&rows));
    Ok(ExitCode::Success)
}

/// Arguments for the latest-version command
#[derive(Args, Debug)]
pub struct LatestVersionArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
}

impl LatestVersionArgs {
    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        let owner = try_code!(ctx.owner(&self.repo.owner));
        let client = ctx.github()?;

        match client.latest_tag(owner, &self.repo.repo) {
            Ok(tag) => {
                let version = github::version_of_tag(&tag.name).unwrap_or(&tag.name);
                ctx.emit(ctx.formatter.format_value("version", version, "latest-version"));
                Ok(ExitCode::Success)
            }
            Err(GithubError::NotFound(what)) => {
                ctx.formatter.error(&format!("{what} not found"));
                Ok(ExitCode::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Arguments for the url command
#[derive(Args, Debug)]
pub struct UrlArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Version
    #[arg(long)]
    pub version: String,
}

impl UrlArgs {
    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        let owner = try_code!(ctx.owner(&self.repo.owner));
        let client = ctx.github()?;
        let tag = github::tag_for_version(&self.version);

        match client.release_of_tag(owner, &self.repo.repo, &tag) {
            Ok(release) => {
                ctx.emit(ctx.formatter.format_value("url", &release.url, "url"));
                Ok(ExitCode::Success)
            }
            Err(GithubError::NotFound(what)) => {
                ctx.formatter.progress(&format!("No release: {what}"));
                Ok(ExitCode::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Arguments for the create command
#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Version
    #[arg(long)]
    pub version: String,
}

impl CreateArgs {
    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        let owner = try_code!(ctx.owner(&self.repo.owner));
        let client = ctx.github()?;
        if !client.has_token() {
            return Ok(ctx.invalid("No GITHUB_TOKEN set"));
        }
        let tag = github::tag_for_version(&self.version);

        let release = client.create_release(owner, &self.repo.repo, &tag, &tag)?;
        ctx.formatter
            .success(&format!("Created release {tag}: {}", release.url));
        ctx.emit(ctx.formatter.format_success(&SuccessMessage::new(release.url), "create"));
        Ok(ExitCode::Success)
    }
}

/// Arguments for the upload command
#[derive(Args, Debug)]
pub struct UploadArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Version
    #[arg(long)]
    pub version: String,

    /// Source file
    #[arg(long)]
    pub src: PathBuf,

    /// Asset name (defaults to the source file name)
    #[arg(long)]
    pub dest: Option<String>,
}

impl UploadArgs {
    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        if !self.src.is_file() {
            return Ok(ctx.invalid(&format!("File not found: {}", self.src.display())));
        }
        let owner = try_code!(ctx.owner(&self.repo.owner));
        let client = ctx.github()?;
        if !client.has_token() {
            return Ok(ctx.invalid("No GITHUB_TOKEN set"));
        }

        let name = match self.dest {
            Some(name) => name,
            None => asset_name(&self.src)?,
        };
        let tag = github::tag_for_version(&self.version);
        ctx.formatter.progress(&format!(
            "Uploading {} as {name} ({tag})",
            self.src.display()
        ));

        let asset = client.upload_asset(owner, &self.repo.repo, &tag, &name, &self.src)?;
        ctx.formatter
            .success(&format!("Uploaded {} to {tag}", asset.name));
        ctx.emit(ctx.formatter.format_success(&SuccessMessage::new(asset.name), "upload"));
        Ok(ExitCode::Success)
    }
}

fn asset_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("No file name in {}", path.display()))
}

/// Arguments for the download command
#[derive(Args, Debug)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Version
    #[arg(long)]
    pub version: String,

    /// Asset name (defaults to <repo>-<version>-<platform>.tgz)
    #[arg(long)]
    pub src: Option<String>,

    /// Destination path (defaults to the asset name)
    #[arg(long)]
    pub dest: Option<PathBuf>,
}

impl DownloadArgs {
    /// Asset to fetch when none is named.
    pub fn asset(&self) -> String {
        self.src.clone().unwrap_or_else(|| {
            format!(
                "{}-{}-{}.tgz",
                self.repo.repo,
                self.version,
                current_platform()
            )
        })
    }

    pub fn execute(self, ctx: &Context) -> anyhow::Result<ExitCode> {
        let owner = try_code!(ctx.owner(&self.repo.owner));
        let client = ctx.github()?;
        let asset = self.asset();
        let dest = self.dest.clone().unwrap_or_else(|| PathBuf::from(&asset));
        let tag = github::tag_for_version(&self.version);
        ctx.formatter
            .progress(&format!("Downloading {asset} ({tag})"));

        match client.download_asset(owner, &self.repo.repo, &tag, &asset, &dest) {
            Ok(bytes) => {
                ctx.formatter
                    .success(&format!("Downloaded {asset} to {} ({bytes} bytes)", dest.display()));
                ctx.emit(ctx.formatter.format_success(
                    &SuccessMessage::new(dest.display().to_string()),
                    "download",
                ));
                Ok(ExitCode::Success)
            }
            Err(e @ (GithubError::NotFound(_) | GithubError::AssetNotFound(_))) => {
                ctx.formatter.error(&e.to_string());
                Ok(ExitCode::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }
}
