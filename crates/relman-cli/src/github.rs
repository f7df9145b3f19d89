//! GitHub release client.
//!
//! Blocking REST calls for looking up, creating and filling releases.
//! Requests carry a bearer token when one is configured; calls that modify
//! a repository refuse to run without it.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use relman_core::version;
use reqwest::blocking::{Body, Client, RequestBuilder};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

const API_MEDIA_TYPE: &str = "application/vnd.github+json";
const OCTET_STREAM: &str = "application/octet-stream";

/// Errors talking to GitHub.
#[derive(Debug, Error)]
pub enum GithubError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The release or tag does not exist
    #[error("{0} not found")]
    NotFound(String),

    #[error("github returned {0} (this is probably because the release already exists)")]
    AlreadyExists(StatusCode),

    #[error("github returned {0}")]
    Status(StatusCode),

    #[error("could not find asset named {0}")]
    AssetNotFound(String),

    #[error("response has no Content-Length")]
    MissingContentLength,

    #[error("downloaded data did not match content length {expected} != {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("no GITHUB_TOKEN set")]
    MissingToken,

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl GithubError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GithubError>;

/// A release as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Browser URL of the release page
    #[serde(rename = "html_url")]
    pub url: String,
    /// Upload URL template (`...{?name,label}`)
    pub upload_url: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl GithubRelease {
    pub fn clean_upload_url(&self) -> &str {
        clean_upload_url(&self.upload_url)
    }

    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Serialize)]
struct ReleaseCreate<'a> {
    tag_name: &'a str,
    name: &'a str,
}

/// Tag name for a version.
pub fn tag_for_version(version: &str) -> String {
    format!("v{version}")
}

/// Version named by a `v`-prefixed tag.
pub fn version_of_tag(tag: &str) -> Option<&str> {
    tag.strip_prefix('v')
}

/// Strip the URI template suffix from an upload URL.
pub fn clean_upload_url(url: &str) -> &str {
    url.split_once('{').map_or(url, |(base, _)| base)
}

/// Tag with the highest semantic version; tags that are not versions are
/// ignored.
pub fn latest_version_tag(tags: &[Tag]) -> Option<&Tag> {
    let mut best: Option<(&Tag, semver::Version)> = None;
    for tag in tags {
        let Some(parsed) = version_of_tag(&tag.name).and_then(|v| version::parse_semver(v).ok())
        else {
            continue;
        };
        match &best {
            Some((_, current)) if version::compare(&parsed, current).is_le() => {}
            _ => best = Some((tag, parsed)),
        }
    }
    best.map(|(tag, _)| tag)
}

fn check_created(status: StatusCode) -> Result<()> {
    match status {
        StatusCode::CREATED => Ok(()),
        StatusCode::UNPROCESSABLE_ENTITY => Err(GithubError::AlreadyExists(status)),
        other => Err(GithubError::Status(other)),
    }
}

/// Blocking GitHub REST client.
pub struct GithubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GithubClient {
    /// Create a client against `api_url` with a per-request timeout.
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .user_agent(concat!("relman/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Read the token from `GITHUB_TOKEN`.
    pub fn token_from_env() -> Option<String> {
        std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty())
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn require_token(&self) -> Result<()> {
        if self.has_token() {
            Ok(())
        } else {
            Err(GithubError::MissingToken)
        }
    }

    fn repo_url(&self, owner: &str, repo: &str, path: &str) -> String {
        format!("{}/repos/{owner}/{repo}{path}", self.api_url)
    }

    fn request(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        let req = self.client.request(method, url).header(ACCEPT, accept);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Look up the release for a tag.
    pub fn release_of_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<GithubRelease> {
        let url = self.repo_url(owner, repo, &format!("/releases/tags/{tag}"));
        debug!(url = %url, "Fetching release");

        let resp = self.request(Method::GET, &url, API_MEDIA_TYPE).send()?;
        match resp.status() {
            StatusCode::OK => Ok(resp.json()?),
            StatusCode::NOT_FOUND => Err(GithubError::NotFound(format!(
                "release {tag} of {owner}/{repo}"
            ))),
            status => Err(GithubError::Status(status)),
        }
    }

    /// Highest `v`-prefixed version tag of a repository.
    pub fn latest_tag(&self, owner: &str, repo: &str) -> Result<Tag> {
        let url = self.repo_url(owner, repo, "/tags");
        debug!(url = %url, "Fetching tags");

        let resp = self
            .request(Method::GET, &url, API_MEDIA_TYPE)
            .query(&[("per_page", "100")])
            .send()?;
        match resp.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(GithubError::NotFound(format!("repository {owner}/{repo}")))
            }
            status => return Err(GithubError::Status(status)),
        }

        let tags: Vec<Tag> = resp.json()?;
        latest_version_tag(&tags)
            .cloned()
            .ok_or_else(|| GithubError::NotFound(format!("version tag in {owner}/{repo}")))
    }

    /// Create a release for an existing or new tag.
    pub fn create_release(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        name: &str,
    ) -> Result<GithubRelease> {
        self.require_token()?;
        let url = self.repo_url(owner, repo, "/releases");
        info!(repo = %repo, tag = %tag, "Creating release");

        let resp = self
            .request(Method::POST, &url, API_MEDIA_TYPE)
            .json(&ReleaseCreate {
                tag_name: tag,
                name,
            })
            .send()?;
        check_created(resp.status())?;
        Ok(resp.json()?)
    }

    /// Upload `file` to the release of `tag` as an asset called `name`.
    pub fn upload_asset(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        name: &str,
        file: &Path,
    ) -> Result<ReleaseAsset> {
        self.require_token()?;
        let release = self.release_of_tag(owner, repo, tag)?;

        let src = File::open(file).map_err(GithubError::io(file))?;
        let len = src.metadata().map_err(GithubError::io(file))?.len();
        info!(file = %file.display(), name = %name, tag = %tag, bytes = len, "Uploading asset");

        let resp = self
            .request(Method::POST, release.clean_upload_url(), API_MEDIA_TYPE)
            .query(&[("name", name)])
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(Body::sized(src, len))
            .send()?;
        check_created(resp.status())?;
        Ok(resp.json()?)
    }

    /// Download the asset `name` of the release of `tag` into `dest`.
    ///
    /// Returns the number of bytes written.
    pub fn download_asset(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        name: &str,
        dest: &Path,
    ) -> Result<u64> {
        let release = self.release_of_tag(owner, repo, tag)?;
        let asset = release
            .asset(name)
            .ok_or_else(|| GithubError::AssetNotFound(name.to_string()))?;

        let url = self.repo_url(owner, repo, &format!("/releases/assets/{}", asset.id));
        debug!(url = %url, "Downloading asset");

        let mut resp = self.request(Method::GET, &url, OCTET_STREAM).send()?;
        if resp.status() != StatusCode::OK {
            return Err(GithubError::Status(resp.status()));
        }
        let expected = resp
            .content_length()
            .ok_or(GithubError::MissingContentLength)?;

        let actual = write_verified(&mut resp, dest, expected)?;
        info!(name = %name, dest = %dest.display(), bytes = actual, "Downloaded asset");
        Ok(actual)
    }
}

/// Stream `src` into `dest`, keeping the file only if exactly `expected`
/// bytes arrived.
///
/// Data lands in a `.part` sibling that is renamed into place on success
/// and removed on failure.
pub fn write_verified<R: Read>(src: &mut R, dest: &Path, expected: u64) -> Result<u64> {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let copied = File::create(&part)
        .and_then(|mut out| io::copy(src, &mut out))
        .map_err(GithubError::io(&part));
    let result = match copied {
        Ok(actual) if actual != expected => Err(GithubError::LengthMismatch { expected, actual }),
        Ok(actual) => fs::rename(&part, dest)
            .map(|()| actual)
            .map_err(GithubError::io(dest)),
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}
