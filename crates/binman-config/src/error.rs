//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File system operation failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The YAML document could not be parsed.
    #[error("failed to parse configuration document")]
    Parse {
        /// Path of the document when loaded from disk.
        path: Option<PathBuf>,
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// The configuration could not be rendered back to YAML.
    #[error("failed to serialise configuration document")]
    Serialize {
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation.
        section: String,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A release referenced a source that is not configured.
    #[error("unknown release source")]
    UnknownSource {
        /// Repository that referenced the source.
        repo: String,
        /// Name of the missing source.
        source_name: String,
    },
    /// The same repository was listed more than once.
    #[error("duplicate release entry")]
    DuplicateRelease {
        /// Repository listed more than once.
        repo: String,
    },
    /// A filename pattern failed to compile.
    #[error("invalid filename pattern")]
    InvalidPattern {
        /// Pattern field that failed to compile.
        field: &'static str,
        /// Pattern text supplied by the user.
        pattern: String,
        /// Source regex error.
        source: regex::Error,
    },
    /// The home directory could not be determined while expanding `~`.
    #[error("home directory unavailable")]
    HomeDirUnavailable,
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    pub(crate) fn invalid(
        section: impl Into<String>,
        field: &'static str,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section: section.into(),
            field,
            value,
            reason,
        }
    }
}
