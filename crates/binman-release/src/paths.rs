//! Path resolution for publish directories, artifacts and links.
//!
//! # Design
//! - Artifact path precedence is a strict priority list: explicit release filename,
//!   explicit extract filename, external URL, provider asset. The first set field wins.
//! - The two inference branches share one rule: archives are assumed to contain a
//!   binary named after the project, anything else is the binary itself.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::descriptor::BinmanRelease;
use crate::error::ReleaseResult;
use crate::filetype::FileTypeMatcher;

impl BinmanRelease {
    /// Set `publish_path` to `<release_root>/repos/<org>/<project>/<version>`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReleaseError::MissingState`] while the version is unresolved.
    pub fn set_publish_path(&mut self, release_root: &Path) -> ReleaseResult<&Path> {
        let version = self.require_version()?;
        let path = trim_root(release_root)
            .join("repos")
            .join(&self.org)
            .join(&self.project)
            .join(version);
        Ok(self.publish_path.insert(path))
    }

    /// Predict the artifact location and compute the link location.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReleaseError::MissingState`] before the publish path and
    /// asset have been resolved.
    pub fn set_artifact_path(
        &mut self,
        release_root: &Path,
        matcher: &FileTypeMatcher,
    ) -> ReleaseResult<()> {
        let publish = self.require_publish_path()?.to_path_buf();
        let asset_name = self.require_asset()?.name.clone();

        let (branch, artifact) = if let Some(template) = self.release_file_name.as_deref() {
            ("release_file_name", publish.join(self.format(template)))
        } else if let Some(name) = self.extract_file_name.as_deref() {
            ("extract_file_name", publish.join(name))
        } else if self.external_url.is_some() {
            ("external_url", self.infer_artifact(&publish, &asset_name, matcher))
        } else {
            ("asset", self.infer_artifact(&publish, &asset_name, matcher))
        };

        let link_name = self.link_name.as_deref().unwrap_or(&self.project);
        let link_path = trim_root(release_root).join(link_name);
        debug!(
            repo = %self.repo,
            branch,
            artifact = %artifact.display(),
            link = %link_path.display(),
            "resolved artifact path"
        );
        self.artifact_path = Some(artifact);
        self.link_path = Some(link_path);
        Ok(())
    }

    fn infer_artifact(&self, publish: &Path, asset_name: &str, matcher: &FileTypeMatcher) -> PathBuf {
        if matcher.is_archive(asset_name) {
            publish.join(&self.project)
        } else {
            publish.join(asset_name)
        }
    }
}

fn trim_root(root: &Path) -> PathBuf {
    let raw = root.to_string_lossy();
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        root.to_path_buf()
    } else {
        PathBuf::from(trimmed)
    }
}
