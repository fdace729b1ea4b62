//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use tilepack::config::ConfigFileError;
use tilepack::offline::OfflineError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be read or written
    Config(ConfigFileError),
    /// Malformed command-line argument
    InvalidArgument(String),
    /// Failed to install the Ctrl+C handler
    Signal(String),
    /// An offline region operation failed
    Offline(OfflineError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Offline(OfflineError::NotFound(_)) => {
                eprintln!();
                eprintln!("Run `tilepack list` to see the ids of downloaded regions.");
            }
            CliError::Offline(OfflineError::InvalidRegionDefinition(_)) => {
                eprintln!();
                eprintln!("The style must be a URL, for example:");
                eprintln!("  --style mapbox://styles/mapbox/streets-v11");
            }
            CliError::Offline(OfflineError::TileCountLimitExceeded { .. }) => {
                eprintln!();
                eprintln!("The region was deleted. Either download a smaller region or");
                eprintln!("raise the limit with `tilepack limit <n>` (0 = unlimited).");
            }
            CliError::Offline(OfflineError::AlreadyDownloading(_)) => {
                eprintln!();
                eprintln!("Another download of this region is still running.");
            }
            CliError::Offline(OfflineError::List(_)) | CliError::Config(_) => {
                eprintln!();
                eprintln!(
                    "Check the files under {}",
                    tilepack::config::config_directory().display()
                );
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Signal(msg) => write!(f, "Failed to set signal handler: {}", msg),
            CliError::Offline(e) => write!(f, "{} [{}]", e, e.code()),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Offline(e) => Some(e),
            _ => None,
        }
    }
}

impl From<OfflineError> for CliError {
    fn from(e: OfflineError) -> Self {
        CliError::Offline(e)
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_offline_error_shows_code() {
        let err = CliError::from(OfflineError::NotFound(7));
        assert_eq!(
            err.to_string(),
            "There is no region with given id: 7 [NotFound]"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_invalid_argument() {
        let err = CliError::InvalidArgument("bounds".into());
        assert_eq!(err.to_string(), "Invalid argument: bounds");
        assert!(err.source().is_none());
    }
}
