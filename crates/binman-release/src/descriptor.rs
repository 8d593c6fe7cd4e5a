//! Release descriptor carried through one pipeline run.
//!
//! # Design
//! - User intent is copied from [`ReleaseSpec`] once and never edited by actions,
//!   apart from the link name rewrite performed after artifact discovery.
//! - Resolved fields start empty and are filled in pipeline order.
//! - The resolved asset name and URL live in one [`Asset`] so they are set together.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use binman_config::{PostCommand, QueryType, ReleaseSpec, split_repo};
use tracing::{debug, info};

use crate::actions::FinalizeMode;
use crate::error::{ReleaseError, ReleaseResult};
use crate::model::{Asset, ReleaseData};
use crate::template::{DataMap, format_string};

/// State of one tracked repository during a pipeline run.
#[derive(Debug, Clone)]
pub struct BinmanRelease {
    pub(crate) repo: String,
    pub(crate) org: String,
    pub(crate) project: String,
    pub(crate) source: String,
    pub(crate) os: String,
    pub(crate) arch: String,
    pub(crate) version: Option<String>,
    pub(crate) query_type: QueryType,
    pub(crate) external_url: Option<String>,
    pub(crate) release_file_name: Option<String>,
    pub(crate) extract_file_name: Option<String>,
    pub(crate) link_name: Option<String>,
    pub(crate) post_commands: Vec<PostCommand>,
    pub(crate) finalize_mode: FinalizeMode,
    pub(crate) release_data: Option<Arc<ReleaseData>>,
    pub(crate) publish_path: Option<PathBuf>,
    pub(crate) asset: Option<Asset>,
    pub(crate) artifact_path: Option<PathBuf>,
    pub(crate) link_path: Option<PathBuf>,
    pub(crate) cleanup_on_failure: bool,
}

impl BinmanRelease {
    /// Build a descriptor from a configured release.
    ///
    /// The repository is split at its last `/`, so nested groups stay in `org`.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidRepo`] when `repo` has no `org/project` form.
    pub fn from_spec(spec: &ReleaseSpec) -> ReleaseResult<Self> {
        let (org, project) = split_repo(&spec.repo).ok_or_else(|| ReleaseError::InvalidRepo {
            repo: spec.repo.clone(),
        })?;
        let finalize_mode = if spec.download_only {
            FinalizeMode::DownloadOnly
        } else if spec.post_only {
            FinalizeMode::PostOnly
        } else {
            FinalizeMode::Full
        };
        Ok(Self {
            repo: spec.repo.clone(),
            org: org.to_string(),
            project: project.to_string(),
            source: spec.source.clone(),
            os: spec.os.clone(),
            arch: spec.arch.clone(),
            version: spec.version.clone().filter(|version| !version.is_empty()),
            query_type: spec.query_type,
            external_url: spec.external_url.clone(),
            release_file_name: spec.release_file_name.clone(),
            extract_file_name: spec.extract_file_name.clone(),
            link_name: spec.link_name.clone(),
            post_commands: spec.post_commands.clone(),
            finalize_mode,
            release_data: None,
            publish_path: None,
            asset: None,
            artifact_path: None,
            link_path: None,
            cleanup_on_failure: false,
        })
    }

    /// Use a known download URL template when the release does not set its own.
    pub fn apply_known_url(&mut self, known_urls: &BTreeMap<String, String>) {
        if self.external_url.is_some() {
            return;
        }
        if let Some(url) = known_urls.get(&self.repo) {
            debug!(repo = %self.repo, url = %url, "using known download url");
            self.external_url = Some(url.clone());
        }
    }

    /// Attach the provider payload; "latest" queries adopt its tag as the version.
    pub fn attach_release(&mut self, data: impl Into<Arc<ReleaseData>>) {
        let data = data.into();
        if self.query_type.is_latest() || self.version.is_none() {
            self.version = Some(data.tag_name().to_string());
        }
        self.release_data = Some(data);
    }

    /// Repository identifier (`org/project`).
    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Owner part of the repository.
    #[must_use]
    pub fn org(&self) -> &str {
        &self.org
    }

    /// Project part of the repository.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Configured source name.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Target operating system.
    #[must_use]
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Target architecture.
    #[must_use]
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// How the release version is queried.
    #[must_use]
    pub const fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// Pinned or resolved version, if known yet.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// External URL template, if any.
    #[must_use]
    pub fn external_url(&self) -> Option<&str> {
        self.external_url.as_deref()
    }

    /// Explicit asset filename template, if any.
    #[must_use]
    pub fn release_file_name(&self) -> Option<&str> {
        self.release_file_name.as_deref()
    }

    /// Explicit in-archive filename, if any.
    #[must_use]
    pub fn extract_file_name(&self) -> Option<&str> {
        self.extract_file_name.as_deref()
    }

    /// Link name requested by the user or chosen by artifact discovery.
    #[must_use]
    pub fn link_name(&self) -> Option<&str> {
        self.link_name.as_deref()
    }

    /// Commands run after linking.
    #[must_use]
    pub fn post_commands(&self) -> &[PostCommand] {
        &self.post_commands
    }

    /// Which finalize actions run after the download.
    #[must_use]
    pub const fn finalize_mode(&self) -> FinalizeMode {
        self.finalize_mode
    }

    /// Attached provider payload.
    #[must_use]
    pub fn release_data(&self) -> Option<&ReleaseData> {
        self.release_data.as_deref()
    }

    /// Versioned storage directory.
    #[must_use]
    pub fn publish_path(&self) -> Option<&Path> {
        self.publish_path.as_deref()
    }

    /// Chosen remote asset.
    #[must_use]
    pub const fn asset(&self) -> Option<&Asset> {
        self.asset.as_ref()
    }

    /// Location of the executable.
    #[must_use]
    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    /// Location of the stable link.
    #[must_use]
    pub fn link_path(&self) -> Option<&Path> {
        self.link_path.as_deref()
    }

    /// Whether a failed run may have left files that need removing.
    #[must_use]
    pub const fn cleanup_on_failure(&self) -> bool {
        self.cleanup_on_failure
    }

    /// Resolved fields exposed to templates.
    #[must_use]
    pub fn data_map(&self) -> DataMap {
        let version = self
            .version
            .clone()
            .or_else(|| self.release_data().map(|data| data.tag_name().to_string()))
            .unwrap_or_default();
        DataMap::from([
            ("version", version),
            ("os", self.os.clone()),
            ("arch", self.arch.clone()),
            ("org", self.org.clone()),
            ("project", self.project.clone()),
            ("artifactPath", display(self.artifact_path.as_deref())),
            ("linkpath", display(self.link_path.as_deref())),
            (
                "filename",
                self.asset
                    .as_ref()
                    .map(|asset| asset.name.clone())
                    .unwrap_or_default(),
            ),
        ])
    }

    /// Render a template against [`Self::data_map`].
    #[must_use]
    pub fn format(&self, template: &str) -> String {
        format_string(template, &self.data_map())
    }

    /// Where the chosen asset is downloaded to.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::MissingState`] before the publish path and asset are resolved.
    pub fn download_path(&self) -> ReleaseResult<PathBuf> {
        let publish = self.require_publish_path()?;
        let asset = self.require_asset()?;
        Ok(publish.join(&asset.name))
    }

    /// Remove the publish directory after a failed run.
    ///
    /// Returns `true` when a directory was removed.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Io`] when removal fails for a reason other than absence.
    pub fn rollback(&mut self) -> ReleaseResult<bool> {
        if !self.cleanup_on_failure {
            return Ok(false);
        }
        let Some(publish) = self.publish_path.as_deref() else {
            return Ok(false);
        };
        match fs::remove_dir_all(publish) {
            Ok(()) => {
                info!(repo = %self.repo, path = %publish.display(), "rolled back release");
                self.cleanup_on_failure = false;
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.cleanup_on_failure = false;
                Ok(false)
            }
            Err(err) => Err(ReleaseError::io("release.rollback", publish, err)),
        }
    }

    pub(crate) fn require_version(&self) -> ReleaseResult<&str> {
        self.version
            .as_deref()
            .ok_or_else(|| ReleaseError::missing(&self.repo, "version"))
    }

    pub(crate) fn require_publish_path(&self) -> ReleaseResult<&Path> {
        self.publish_path
            .as_deref()
            .ok_or_else(|| ReleaseError::missing(&self.repo, "publish_path"))
    }

    pub(crate) fn require_asset(&self) -> ReleaseResult<&Asset> {
        self.asset
            .as_ref()
            .ok_or_else(|| ReleaseError::missing(&self.repo, "asset"))
    }

    pub(crate) fn require_artifact_path(&self) -> ReleaseResult<&Path> {
        self.artifact_path
            .as_deref()
            .ok_or_else(|| ReleaseError::missing(&self.repo, "artifact_path"))
    }

    pub(crate) fn require_link_path(&self) -> ReleaseResult<&Path> {
        self.link_path
            .as_deref()
            .ok_or_else(|| ReleaseError::missing(&self.repo, "link_path"))
    }

    pub(crate) fn set_asset(&mut self, asset: Asset) {
        self.asset = Some(asset);
    }

    pub(crate) const fn mark_cleanup(&mut self) {
        self.cleanup_on_failure = true;
    }
}

fn display(path: Option<&Path>) -> String {
    path.map(|path| path.display().to_string())
        .unwrap_or_default()
}
