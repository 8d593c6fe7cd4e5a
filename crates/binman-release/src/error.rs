//! Error types for release resolution.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use binman_config::ConfigError;
use thiserror::Error;

/// Boxed error raised by an external collaborator (extractor, linker).
pub type CollaboratorError = Box<dyn StdError + Send + Sync + 'static>;

/// Primary error type for release resolution.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The repository identifier is not of the form `org/project`.
    #[error("invalid repository identifier")]
    InvalidRepo {
        /// Identifier supplied by the configuration.
        repo: String,
    },
    /// No published asset matched the release constraints.
    #[error("release asset not found")]
    AssetNotFound {
        /// Repository being resolved.
        repo: String,
    },
    /// An action ran before the state it depends on was resolved.
    #[error("release state not resolved")]
    MissingState {
        /// Repository being resolved.
        repo: String,
        /// Descriptor field that was still unset.
        field: &'static str,
    },
    /// A filename pattern failed to compile.
    #[error("invalid filename pattern")]
    InvalidPattern {
        /// Pattern field that failed to compile.
        field: &'static str,
        /// Source regex error.
        source: regex::Error,
    },
    /// Configuration values could not be resolved.
    #[error("configuration resolution failed")]
    Config {
        /// Source configuration error.
        #[from]
        source: ConfigError,
    },
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
    /// Walking the publish directory failed.
    #[error("directory traversal failed")]
    Walk {
        /// Root of the traversal.
        path: PathBuf,
        /// Source walkdir error.
        source: walkdir::Error,
    },
    /// The link location is occupied by something other than a link.
    #[error("link path occupied by a regular file")]
    LinkOccupied {
        /// Path where the link was to be created.
        path: PathBuf,
    },
    /// A post command exited unsuccessfully.
    #[error("post command failed")]
    CommandFailed {
        /// Command that failed.
        command: String,
        /// Exit code when the process was not terminated by a signal.
        code: Option<i32>,
    },
    /// An external collaborator failed.
    #[error("release collaborator failed")]
    Collaborator {
        /// Operation identifier.
        operation: &'static str,
        /// Source error raised by the collaborator.
        source: CollaboratorError,
    },
}

/// Convenience alias for release results.
pub type ReleaseResult<T> = Result<T, ReleaseError>;

impl ReleaseError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing(repo: &str, field: &'static str) -> Self {
        Self::MissingState {
            repo: repo.to_string(),
            field,
        }
    }

    /// Wrap an error raised by an external collaborator.
    #[must_use]
    pub fn collaborator(operation: &'static str, source: impl Into<CollaboratorError>) -> Self {
        Self::Collaborator {
            operation,
            source: source.into(),
        }
    }

    /// Whether the failure stems from invalid configuration rather than runtime state.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidRepo { .. } | Self::InvalidPattern { .. } | Self::Config { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_wraps_boxed_sources() {
        let err = ReleaseError::collaborator("extract", io::Error::other("truncated archive"));
        assert!(matches!(
            err,
            ReleaseError::Collaborator {
                operation: "extract",
                ..
            }
        ));
        assert!(err.source().is_some());
        assert!(!err.is_configuration());
    }

    #[test]
    fn invalid_repo_is_a_configuration_error() {
        let err = ReleaseError::InvalidRepo {
            repo: "syft".into(),
        };
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "invalid repository identifier");
    }
}
