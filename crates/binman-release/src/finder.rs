//! Discovery of the real executable once an archive has been unpacked.
//!
//! # Design
//! - One walk over the publish directory, in filename order.
//! - An exact filename match ends the walk; archives are never candidates.
//! - Files with mode `0755` are a fallback, disabled when an extract filename is pinned.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::descriptor::BinmanRelease;
use crate::error::{ReleaseError, ReleaseResult};
use crate::filetype::FileTypeMatcher;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Mode bits marking a file as a plausible executable.
#[cfg(unix)]
const EXECUTABLE_MODE: u32 = 0o755;

/// Walks an unpacked release looking for one executable.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactFinder<'a> {
    matcher: &'a FileTypeMatcher,
    exact_only: bool,
}

impl<'a> ArtifactFinder<'a> {
    /// Create a finder; `exact_only` disables the permission fallback.
    #[must_use]
    pub const fn new(matcher: &'a FileTypeMatcher, exact_only: bool) -> Self {
        Self {
            matcher,
            exact_only,
        }
    }

    /// Locate `target` under `root`.
    ///
    /// Returns the exact match when one exists, otherwise the last executable-mode
    /// file seen, otherwise `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Walk`] when the tree cannot be traversed.
    pub fn find(&self, root: &Path, target: &str) -> ReleaseResult<Option<PathBuf>> {
        let mut fallback = None;
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|source| ReleaseError::Walk {
                path: root.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if self.matcher.is_archive(&name) {
                debug!(path = %entry.path().display(), "skipping archive");
                continue;
            }
            if name == target {
                debug!(path = %entry.path().display(), "exact artifact match");
                return Ok(Some(entry.into_path()));
            }
            if self.exact_only {
                continue;
            }
            if is_executable(&entry)? {
                debug!(path = %entry.path().display(), "executable candidate");
                fallback = Some(entry.into_path());
            }
        }
        Ok(fallback)
    }
}

#[cfg(unix)]
fn is_executable(entry: &walkdir::DirEntry) -> ReleaseResult<bool> {
    let metadata = entry
        .metadata()
        .map_err(|source| ReleaseError::Walk {
            path: entry.path().to_path_buf(),
            source,
        })?;
    Ok(metadata.permissions().mode() & 0o777 == EXECUTABLE_MODE)
}

#[cfg(not(unix))]
fn is_executable(_entry: &walkdir::DirEntry) -> ReleaseResult<bool> {
    Ok(false)
}

impl BinmanRelease {
    /// Expected filename of the executable, with `.exe` on Windows targets.
    #[must_use]
    pub fn target_file_name(&self) -> Option<String> {
        let base = self.artifact_path.as_deref()?.file_name()?.to_string_lossy();
        let mut target = self.format(&base);
        if self.os == "windows" && !target.ends_with(".exe") {
            target.push_str(".exe");
        }
        Some(target)
    }

    /// Confirm the artifact location after extraction and realign the link path.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::MissingState`] before paths are resolved and
    /// [`ReleaseError::Walk`] when the publish directory cannot be traversed.
    pub fn find_target(&mut self, matcher: &FileTypeMatcher) -> ReleaseResult<&Path> {
        let publish = self.require_publish_path()?.to_path_buf();
        let target = self
            .target_file_name()
            .ok_or_else(|| ReleaseError::missing(&self.repo, "artifact_path"))?;
        let finder = ArtifactFinder::new(matcher, self.extract_file_name.is_some());
        if let Some(found) = finder.find(&publish, &target)? {
            self.artifact_path = Some(found);
        }
        self.realign_link();
        self.require_artifact_path()
    }

    fn realign_link(&mut self) {
        let Some(base) = self
            .artifact_path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(OsStr::to_str)
            .map(str::to_string)
        else {
            return;
        };
        let link_name = self.link_name.as_deref();
        if link_name == Some(base.as_str()) || link_name == Some(self.repo.as_str()) {
            return;
        }
        let name = self.link_name.get_or_insert(base).clone();
        if let Some(parent) = self.link_path.as_deref().and_then(Path::parent) {
            let link = parent.join(name);
            debug!(repo = %self.repo, link = %link.display(), "link path realigned");
            self.link_path = Some(link);
        }
    }
}
