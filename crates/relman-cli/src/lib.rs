//! relman - release tooling CLI
//!
//! This crate provides a command-line interface for:
//! - Parsing versions out of artifact names and generating update manifests
//! - Listing, promoting and retiring releases stored in a bucket
//! - Creating GitHub releases and moving assets to and from them

pub mod cli;
pub mod config;
pub mod github;
pub mod output;

#[cfg(test)]
mod proptests;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter, SuccessMessage};

/// Exit codes for CLI operations
///
/// Exit codes provide machine-readable status for scripting and automation:
/// - 0: Success - operation completed successfully
/// - 1: General error - unspecified error occurred
/// - 2: Invalid input - bad arguments, platform or configuration
/// - 3: Not found - the thing being looked up does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Invalid input provided (exit code 2)
    InvalidInput = 2,
    /// Lookup target not found (exit code 3)
    NotFound = 3,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::NotFound => "NOT_FOUND",
        }
    }

    /// Get a human-readable description of the exit code
    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::InvalidInput => "Invalid arguments or data provided",
            ExitCode::NotFound => "The requested release or asset does not exist",
        }
    }
}

#[cfg(test)]
mod exit_code_tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::InvalidInput as i32, 2);
        assert_eq!(ExitCode::NotFound as i32, 3);
    }

    #[test]
    fn test_exit_code_from_i32() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::NotFound), 3);
    }

    #[test]
    fn test_exit_code_names() {
        assert_eq!(ExitCode::Success.name(), "SUCCESS");
        assert_eq!(ExitCode::GeneralError.name(), "GENERAL_ERROR");
        assert_eq!(ExitCode::InvalidInput.name(), "INVALID_INPUT");
        assert_eq!(ExitCode::NotFound.name(), "NOT_FOUND");
    }

    #[test]
    fn test_exit_code_descriptions() {
        for code in [
            ExitCode::Success,
            ExitCode::GeneralError,
            ExitCode::InvalidInput,
            ExitCode::NotFound,
        ] {
            assert!(!code.description().is_empty());
        }
    }

    #[test]
    fn test_exit_code_to_process_exit_code() {
        let _ = ExitCode::Success.to_exit_code();
        let _ = ExitCode::NotFound.to_exit_code();
    }
}
