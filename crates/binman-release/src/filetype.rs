//! Filename classification for downloaded assets.

use binman_config::PatternConfig;
use regex::Regex;

use crate::error::{ReleaseError, ReleaseResult};

/// Broad category of a downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Tar archive, optionally compressed.
    Tar,
    /// Zip archive.
    Zip,
    /// Anything else, assumed to be the executable itself.
    Binary,
}

impl FileKind {
    /// Whether the file must be unpacked before use.
    #[must_use]
    pub const fn is_archive(self) -> bool {
        matches!(self, Self::Tar | Self::Zip)
    }

    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Zip => "zip",
            Self::Binary => "binary",
        }
    }
}

/// Compiled tar/zip filename patterns.
#[derive(Debug, Clone)]
pub struct FileTypeMatcher {
    tar: Regex,
    zip: Regex,
}

impl FileTypeMatcher {
    /// Compile the configured archive patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidPattern`] when a pattern does not compile.
    pub fn new(patterns: &PatternConfig) -> ReleaseResult<Self> {
        Ok(Self {
            tar: compile("patterns.tar", &patterns.tar)?,
            zip: compile("patterns.zip", &patterns.zip)?,
        })
    }

    /// Classify a filename.
    #[must_use]
    pub fn classify(&self, name: &str) -> FileKind {
        if self.tar.is_match(name) {
            FileKind::Tar
        } else if self.zip.is_match(name) {
            FileKind::Zip
        } else {
            FileKind::Binary
        }
    }

    /// Whether a filename looks like a tar or zip archive.
    #[must_use]
    pub fn is_archive(&self, name: &str) -> bool {
        self.classify(name).is_archive()
    }
}

pub(crate) fn compile(field: &'static str, pattern: &str) -> ReleaseResult<Regex> {
    Regex::new(pattern).map_err(|source| ReleaseError::InvalidPattern { field, source })
}
