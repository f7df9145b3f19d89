//! Update manifest encoding and decoding.
//!
//! A manifest is the JSON document auto-updaters poll to learn which build
//! is live for a platform, environment and channel. Promotion overwrites
//! it wholesale; it is never merged.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": "1.3.0-20230102130000+def5678",
//!   "name": "v1.3.0",
//!   "publishedAt": 1672664400000,
//!   "asset": {
//!     "name": "App-1.3.0-20230102130000+def5678.zip",
//!     "url": "https://example.com/darwin-updates/App-1.3.0-20230102130000%2Bdef5678.zip",
//!     "digest": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{ReleaseError, Result};
use crate::version;

/// Buffer size for streaming digests.
const HASH_BUFFER_SIZE: usize = 8192;

/// Published update descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateManifest {
    /// Semantic version of the build
    pub version: String,
    /// Release name, usually the tag
    pub name: String,
    /// Release notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Build time in milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<i64>,
    /// Downloadable artifact; absent while a release is announced but not uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<Asset>,
}

/// Artifact referenced by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Asset {
    pub name: String,
    pub url: String,
    /// Hex encoded SHA-256 of the artifact
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Platform specific installer identifiers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub installer_codes: BTreeMap<String, String>,
}

impl UpdateManifest {
    /// The manifest version as a semantic version.
    pub fn semver(&self) -> Result<Version> {
        version::parse_semver(&self.version)
    }

    /// Publish time as a UTC timestamp.
    pub fn published_at_utc(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

/// Inputs for [`encode`].
#[derive(Debug, Clone, Default)]
pub struct EncodeRequest {
    pub version: String,
    pub name: String,
    pub description_file: Option<PathBuf>,
    /// Artifact the manifest points at
    pub source_file: Option<PathBuf>,
    /// Location the artifact is served from
    pub base_uri: Option<Url>,
    pub signature_file: Option<PathBuf>,
    pub installer_codes: BTreeMap<String, String>,
}

impl EncodeRequest {
    pub fn new(version: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Build a manifest from local files.
///
/// The asset section is only produced when both a source file and a base
/// URI are given.
pub fn build(req: &EncodeRequest) -> Result<UpdateManifest> {
    let description = req
        .description_file
        .as_deref()
        .map(read_file)
        .transpose()?;

    let (published_at, asset) = match (&req.source_file, &req.base_uri) {
        (Some(source), Some(base_uri)) => {
            let file_name = source
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    ReleaseError::Config(format!("invalid source file {}", source.display()))
                })?;

            let published_at = source_published_at(source, file_name)?;
            let digest = sha256_digest(source)?;
            let signature = req
                .signature_file
                .as_deref()
                .map(read_file)
                .transpose()?;

            let asset = Asset {
                name: file_name.to_string(),
                url: asset_url(base_uri, file_name),
                digest,
                signature,
                installer_codes: req.installer_codes.clone(),
            };
            (Some(published_at), Some(asset))
        }
        _ => {
            if req.source_file.is_some() {
                tracing::debug!("Source file given without a base URI, omitting asset");
            }
            let published_at = version::parse(&req.version)
                .ok()
                .map(|p| p.published_at.timestamp_millis());
            (published_at, None)
        }
    };

    Ok(UpdateManifest {
        version: req.version.clone(),
        name: req.name.clone(),
        description,
        published_at,
        asset,
    })
}

/// Encode a manifest as pretty-printed JSON.
pub fn encode(req: &EncodeRequest) -> Result<Vec<u8>> {
    let manifest = build(req)?;
    Ok(serde_json::to_vec_pretty(&manifest)?)
}

/// Strictly decode a manifest.
pub fn decode(data: &[u8]) -> Result<UpdateManifest> {
    Ok(serde_json::from_slice(data)?)
}

/// Publish time for an artifact: from its name, else its modification time.
fn source_published_at(path: &Path, file_name: &str) -> Result<i64> {
    if let Ok(parsed) = version::parse(file_name) {
        return Ok(parsed.published_at.timestamp_millis());
    }
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| ReleaseError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(DateTime::<Utc>::from(modified).timestamp_millis())
}

/// `<base>/<query-escaped name>`
pub fn asset_url(base_uri: &Url, file_name: &str) -> String {
    let escaped: String = url::form_urlencoded::byte_serialize(file_name.as_bytes()).collect();
    format!("{}/{}", base_uri.as_str().trim_end_matches('/'), escaped)
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ReleaseError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Hex encoded SHA-256 of a file, streamed through a fixed buffer.
pub fn sha256_digest(path: &Path) -> Result<String> {
    let digest_err = |source| ReleaseError::Digest {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(digest_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(digest_err)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
