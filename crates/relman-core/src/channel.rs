//! Promotion channels and manifest key naming.
//!
//! # Channels
//!
//! - **Public**: every user of an environment polls this manifest
//! - **Named**: a restricted audience (e.g. `test`) that sees builds first
//!
//! Each (platform, environment, channel) triple owns exactly one manifest
//! key. Environments never share keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Label used for the public channel in output.
pub const PUBLIC_LABEL: &str = "public";

/// Channel that test builds are promoted into.
pub const TEST_CHANNEL: &str = "test";

/// Audience tier for a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    /// Everyone in the environment
    #[default]
    Public,
    /// Restricted audience
    Named(String),
}

impl Channel {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() || name == PUBLIC_LABEL {
            Self::Public
        } else {
            Self::Named(name)
        }
    }

    pub fn test() -> Self {
        Self::Named(TEST_CHANNEL.to_string())
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Self::Public)
    }

    /// Manifest key for this channel.
    ///
    /// `update-<platform>-<env>.json` for the public channel and
    /// `update-<platform>-<env>-<channel>.json` otherwise.
    pub fn manifest_key(&self, platform: &str, env: &str) -> String {
        match self {
            Self::Public => format!("update-{platform}-{env}.json"),
            Self::Named(name) => format!("update-{platform}-{env}-{name}.json"),
        }
    }
}

/// Key of the per-version manifest uploaded next to each build.
pub fn support_manifest_key(support_prefix: &str, platform: &str, env: &str, version: &str) -> String {
    format!("{support_prefix}update-{platform}-{env}-{version}.json")
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "{PUBLIC_LABEL}"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for Channel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::named(s))
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Public => serializer.serialize_str(""),
            Self::Named(name) => serializer.serialize_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::named(s))
    }
}
