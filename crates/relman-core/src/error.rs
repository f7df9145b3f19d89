//! Error types for release tooling.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur while parsing, encoding or promoting releases.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Filename or version string does not match a known convention
    #[error("parse error: {0}")]
    Parse(String),

    /// A lookup the caller depends on found nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// Object store failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Local file could not be read
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Asset digest could not be computed
    #[error("error creating digest for {path}: {source}")]
    Digest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest JSON is malformed
    #[error("manifest decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown platform name
    #[error("invalid platform {0}")]
    InvalidPlatform(String),

    /// Several independent operations failed
    #[error("there were multiple errors: {}", join_errors(.0))]
    Multiple(Vec<ReleaseError>),
}

impl From<semver::Error> for ReleaseError {
    fn from(err: semver::Error) -> Self {
        ReleaseError::Parse(err.to_string())
    }
}

impl ReleaseError {
    /// Fold a list of errors into a single error.
    ///
    /// Returns `None` for an empty list and the error itself when there is
    /// only one.
    pub fn combine(mut errors: Vec<ReleaseError>) -> Option<ReleaseError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ReleaseError::Multiple(errors)),
        }
    }
}

fn join_errors(errors: &[ReleaseError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ReleaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_empty() {
        assert!(ReleaseError::combine(Vec::new()).is_none());
    }

    #[test]
    fn test_combine_single_is_unwrapped() {
        let err = ReleaseError::combine(vec![ReleaseError::Parse("bad".to_string())]).unwrap();
        assert!(matches!(err, ReleaseError::Parse(_)));
    }

    #[test]
    fn test_combine_multiple_message() {
        let err = ReleaseError::combine(vec![
            ReleaseError::Parse("first".to_string()),
            ReleaseError::Config("second".to_string()),
        ])
        .unwrap();
        assert_eq!(
            err.to_string(),
            "there were multiple errors: parse error: first; configuration error: second"
        );
    }
}
