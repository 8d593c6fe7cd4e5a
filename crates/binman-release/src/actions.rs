//! Ordered release actions and the pipeline that runs them.
//!
//! # Design
//! - Each action is a small struct holding only what it needs and mutating the
//!   shared [`BinmanRelease`] through [`Action::execute`].
//! - "Already up to date" is an outcome, not an error; it ends the run successfully.
//! - The first error aborts the remaining actions and is returned untouched.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use binman_config::{GlobalConfig, ReleaseSpec, expand_home};
use binman_telemetry::{Metrics, ReleaseObservation};
use tracing::{debug, info, warn};

use crate::descriptor::BinmanRelease;
use crate::error::{ReleaseError, ReleaseResult};
use crate::filetype::FileTypeMatcher;
use crate::finalize::{
    ExtractAction, Extractor, FindTargetAction, LinkAction, Linker, PostCommandsAction,
};
use crate::model::Asset;
use crate::select::AssetSelector;

/// Identifies an action in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Idempotency check against the publish path.
    ReleaseStatus,
    /// Download URL resolution.
    SetUrl,
    /// Artifact path resolution and directory setup.
    SetArtifactPath,
    /// Archive extraction or executable marking.
    Extract,
    /// Post-extraction artifact discovery.
    FindTarget,
    /// Link creation.
    Link,
    /// User post commands.
    PostCommands,
}

impl ActionKind {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReleaseStatus => "release_status",
            Self::SetUrl => "set_url",
            Self::SetArtifactPath => "set_artifact_path",
            Self::Extract => "extract",
            Self::FindTarget => "find_target",
            Self::Link => "link",
            Self::PostCommands => "post_commands",
        }
    }
}

/// Successful result of one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action finished; the detail is logged.
    Completed(Option<String>),
    /// The release is already materialized; remaining actions are skipped.
    UpToDate,
}

impl ActionOutcome {
    const fn status(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::UpToDate => "up_to_date",
        }
    }
}

/// A unit of work applied to a release descriptor.
pub trait Action: Send + Sync {
    /// Identifier used in logs and metrics.
    fn kind(&self) -> ActionKind;

    /// Apply the action.
    ///
    /// # Errors
    ///
    /// Any error aborts the remaining actions for this release.
    fn execute(&self, release: &mut BinmanRelease) -> ReleaseResult<ActionOutcome>;
}

/// Result of a full pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every action completed.
    Completed,
    /// The release was already materialized.
    UpToDate,
}

/// Which actions run once the asset has been downloaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FinalizeMode {
    /// Extract, find the target, link and run post commands.
    #[default]
    Full,
    /// Keep the downloaded asset untouched.
    DownloadOnly,
    /// Only run post commands against the downloaded asset.
    PostOnly,
}

/// Settings shared by every release processed in one cycle.
#[derive(Debug, Clone)]
pub struct ReleaseContext {
    /// Root directory for publish paths and links.
    pub release_root: PathBuf,
    /// Directory created for `PATH` binaries, when requested.
    pub bin_path: Option<PathBuf>,
    /// Archive filename classifier.
    pub matcher: FileTypeMatcher,
    /// Asset selector.
    pub selector: AssetSelector,
    /// Repository to URL-template overrides.
    pub known_urls: BTreeMap<String, String>,
    /// Metrics sink, when enabled.
    pub metrics: Option<Metrics>,
}

impl ReleaseContext {
    /// Resolve shared settings from the global configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Config`] when a path cannot be expanded and
    /// [`ReleaseError::InvalidPattern`] when a filename pattern does not compile.
    pub fn from_config(config: &GlobalConfig, metrics: Option<Metrics>) -> ReleaseResult<Self> {
        let bin_path = config
            .bin_path
            .as_deref()
            .map(expand_home)
            .transpose()?;
        Ok(Self {
            release_root: expand_home(&config.release_path)?,
            bin_path,
            matcher: FileTypeMatcher::new(&config.patterns)?,
            selector: AssetSelector::new(&config.patterns, config.selection)?,
            known_urls: config.known_urls.clone(),
            metrics,
        })
    }

    /// Drop the bin directory, for callers that only fetch a release.
    #[must_use]
    pub fn without_bin_path(mut self) -> Self {
        self.bin_path = None;
        self
    }

    /// Build a descriptor for `spec` with known URL overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidRepo`] for a malformed repository.
    pub fn release(&self, spec: &ReleaseSpec) -> ReleaseResult<BinmanRelease> {
        let mut release = BinmanRelease::from_spec(spec)?;
        release.apply_known_url(&self.known_urls);
        Ok(release)
    }
}

/// Ordered list of actions run against one release.
pub struct Pipeline {
    actions: Vec<Box<dyn Action>>,
    metrics: Option<Metrics>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("actions", &self.kinds())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub const fn new(metrics: Option<Metrics>) -> Self {
        Self {
            actions: Vec::new(),
            metrics,
        }
    }

    /// Status check, URL resolution and artifact path resolution.
    #[must_use]
    pub fn preparation(context: &ReleaseContext) -> Self {
        Self::new(context.metrics.clone())
            .then(ReleaseStatusAction::new(
                context.release_root.clone(),
                context.metrics.clone(),
            ))
            .then(SetUrlAction::new(context.selector.clone()))
            .then(SetArtifactPathAction::new(
                context.release_root.clone(),
                context.bin_path.clone(),
                context.matcher.clone(),
            ))
    }

    /// Actions run once the asset is downloaded.
    ///
    /// [`FinalizeMode::Full`] extracts, finds the target, links and runs post
    /// commands; [`FinalizeMode::PostOnly`] keeps only the post commands and
    /// [`FinalizeMode::DownloadOnly`] runs nothing.
    #[must_use]
    pub fn finalize(
        context: &ReleaseContext,
        mode: FinalizeMode,
        extractor: Arc<dyn Extractor>,
        linker: Arc<dyn Linker>,
    ) -> Self {
        let pipeline = Self::new(context.metrics.clone());
        match mode {
            FinalizeMode::Full => pipeline
                .then(ExtractAction::new(context.matcher.clone(), extractor))
                .then(FindTargetAction::new(context.matcher.clone()))
                .then(LinkAction::new(linker))
                .then(PostCommandsAction),
            FinalizeMode::PostOnly => pipeline.then(PostCommandsAction),
            FinalizeMode::DownloadOnly => pipeline,
        }
    }

    /// Append an action.
    #[must_use]
    pub fn then(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    /// Kinds of the queued actions, in run order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(|action| action.kind()).collect()
    }

    /// Run every action in order against `release`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an action; later actions do not run.
    pub fn run(&self, release: &mut BinmanRelease) -> ReleaseResult<PipelineOutcome> {
        for action in &self.actions {
            let kind = action.kind();
            match action.execute(release) {
                Ok(outcome) => {
                    self.record(kind, outcome.status());
                    match outcome {
                        ActionOutcome::Completed(detail) => debug!(
                            repo = %release.repo(),
                            action = kind.as_str(),
                            detail = detail.as_deref().unwrap_or_default(),
                            "action completed"
                        ),
                        ActionOutcome::UpToDate => {
                            info!(
                                repo = %release.repo(),
                                version = release.version().unwrap_or_default(),
                                "release already up to date"
                            );
                            return Ok(PipelineOutcome::UpToDate);
                        }
                    }
                }
                Err(err) => {
                    self.record(kind, "failed");
                    warn!(
                        repo = %release.repo(),
                        action = kind.as_str(),
                        error = %err,
                        "action failed"
                    );
                    return Err(err);
                }
            }
        }
        Ok(PipelineOutcome::Completed)
    }

    fn record(&self, kind: ActionKind, status: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_action(kind.as_str(), status);
        }
    }
}

/// Checks whether the resolved version is already materialized.
#[derive(Debug, Clone)]
pub struct ReleaseStatusAction {
    release_root: PathBuf,
    metrics: Option<Metrics>,
}

impl ReleaseStatusAction {
    /// Create the action for releases stored under `release_root`.
    #[must_use]
    pub const fn new(release_root: PathBuf, metrics: Option<Metrics>) -> Self {
        Self {
            release_root,
            metrics,
        }
    }
}

impl Action for ReleaseStatusAction {
    fn kind(&self) -> ActionKind {
        ActionKind::ReleaseStatus
    }

    fn execute(&self, release: &mut BinmanRelease) -> ReleaseResult<ActionOutcome> {
        let publish = release.set_publish_path(&self.release_root)?.to_path_buf();
        if let Some(metrics) = &self.metrics {
            metrics.observe_release(ReleaseObservation {
                latest: release.query_type().is_latest(),
                source: release.source(),
                repo: release.repo(),
                version: release.version().unwrap_or_default(),
            });
        }
        match fs::metadata(&publish) {
            Ok(_) => Ok(ActionOutcome::UpToDate),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ActionOutcome::Completed(
                Some(format!("{} not present", publish.display())),
            )),
            Err(err) => Err(ReleaseError::io("release.status", publish, err)),
        }
    }
}

/// Resolves the asset to download.
#[derive(Debug, Clone, Default)]
pub struct SetUrlAction {
    selector: AssetSelector,
}

impl SetUrlAction {
    /// Create the action with the selector used when no filename is pinned.
    #[must_use]
    pub const fn new(selector: AssetSelector) -> Self {
        Self { selector }
    }

    fn from_external(release: &BinmanRelease, template: &str) -> Option<Asset> {
        let url = release.format(template);
        let name = url_basename(&url)?;
        Some(Asset::new(name, url))
    }

    fn from_provider(&self, release: &BinmanRelease) -> ReleaseResult<Option<Asset>> {
        let data = release
            .release_data()
            .ok_or_else(|| ReleaseError::missing(release.repo(), "release_data"))?;
        if let Some(template) = release.release_file_name() {
            let name = release.format(template);
            debug!(repo = %release.repo(), name = %name, "looking up asset by name");
            return Ok(data.asset_by_name(&name));
        }
        let version = release.require_version()?;
        Ok(self.selector.select(
            release.arch(),
            release.os(),
            version,
            release.project(),
            &data.assets(),
        ))
    }
}

impl Action for SetUrlAction {
    fn kind(&self) -> ActionKind {
        ActionKind::SetUrl
    }

    fn execute(&self, release: &mut BinmanRelease) -> ReleaseResult<ActionOutcome> {
        let asset = match release.external_url() {
            Some(template) => Self::from_external(release, template),
            None => self.from_provider(release)?,
        };
        let asset = asset
            .filter(|asset| !asset.url.is_empty())
            .ok_or_else(|| ReleaseError::AssetNotFound {
                repo: release.repo().to_string(),
            })?;
        let detail = format!("{} <- {}", asset.name, asset.url);
        release.set_asset(asset);
        Ok(ActionOutcome::Completed(Some(detail)))
    }
}

fn url_basename(raw: &str) -> Option<String> {
    let name = match url::Url::parse(raw) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        Err(_) => raw.rsplit('/').next().map(str::to_string),
    };
    name.filter(|name| !name.is_empty())
}

/// Resolves artifact and link paths and creates the publish directory.
#[derive(Debug, Clone)]
pub struct SetArtifactPathAction {
    release_root: PathBuf,
    bin_path: Option<PathBuf>,
    matcher: FileTypeMatcher,
}

impl SetArtifactPathAction {
    /// Create the action; `bin_path` is only created when set.
    #[must_use]
    pub const fn new(
        release_root: PathBuf,
        bin_path: Option<PathBuf>,
        matcher: FileTypeMatcher,
    ) -> Self {
        Self {
            release_root,
            bin_path,
            matcher,
        }
    }
}

impl Action for SetArtifactPathAction {
    fn kind(&self) -> ActionKind {
        ActionKind::SetArtifactPath
    }

    fn execute(&self, release: &mut BinmanRelease) -> ReleaseResult<ActionOutcome> {
        release.set_artifact_path(&self.release_root, &self.matcher)?;
        release.mark_cleanup();
        if let Some(bin_path) = self.bin_path.as_deref() {
            create_dir(bin_path)?;
        }
        let publish = release.require_publish_path()?;
        create_dir(publish)?;
        Ok(ActionOutcome::Completed(
            release
                .artifact_path()
                .map(|path| path.display().to_string()),
        ))
    }
}

fn create_dir(path: &Path) -> ReleaseResult<()> {
    fs::create_dir_all(path).map_err(|source| ReleaseError::io("release.create_dir", path, source))
}

#[cfg(test)]
mod tests {
    use binman_config::{PatternConfig, SelectionConfig};

    use super::*;
    use crate::model::{GitHubAsset, GitHubRelease, GitLabAssets, GitLabLink, GitLabRelease, ReleaseData};

    fn context(root: &Path) -> ReleaseResult<ReleaseContext> {
        let patterns = PatternConfig::default();
        Ok(ReleaseContext {
            release_root: root.to_path_buf(),
            bin_path: Some(root.join("bin")),
            matcher: FileTypeMatcher::new(&patterns)?,
            selector: AssetSelector::new(&patterns, SelectionConfig::default())?,
            known_urls: BTreeMap::new(),
            metrics: None,
        })
    }

    fn spec(repo: &str) -> ReleaseSpec {
        ReleaseSpec {
            os: "linux".into(),
            arch: "amd64".into(),
            source: "github.com".into(),
            ..ReleaseSpec::new(repo)
        }
    }

    fn github(tag: &str, names: &[&str]) -> ReleaseData {
        ReleaseData::GitHub(GitHubRelease {
            tag_name: tag.into(),
            assets: names
                .iter()
                .map(|name| GitHubAsset {
                    name: (*name).to_string(),
                    browser_download_url: format!("https://github.example/{name}"),
                })
                .collect(),
        })
    }

    #[test]
    fn action_kinds_have_stable_labels() -> ReleaseResult<()> {
        let temp = std::env::temp_dir();
        let pipeline = Pipeline::preparation(&context(&temp)?);
        assert_eq!(
            pipeline
                .kinds()
                .into_iter()
                .map(ActionKind::as_str)
                .collect::<Vec<_>>(),
            vec!["release_status", "set_url", "set_artifact_path"]
        );
        Ok(())
    }

    #[test]
    fn external_url_is_templated_and_named() -> ReleaseResult<()> {
        let mut release = BinmanRelease::from_spec(&ReleaseSpec {
            external_url: Some("https://dl.k8s.io/release/{{.version}}/bin/{{.os}}/{{.arch}}/kubectl".into()),
            ..spec("kubernetes/kubernetes")
        })?;
        release.attach_release(github("v1.31.0", &[]));
        SetUrlAction::default().execute(&mut release)?;
        assert_eq!(
            release.asset(),
            Some(&Asset::new(
                "kubectl",
                "https://dl.k8s.io/release/v1.31.0/bin/linux/amd64/kubectl"
            ))
        );
        Ok(())
    }

    #[test]
    fn release_file_name_looks_up_gitlab_links() -> ReleaseResult<()> {
        let mut release = BinmanRelease::from_spec(&ReleaseSpec {
            release_file_name: Some("cli-{{.os}}-{{.arch}}".into()),
            source: "gitlab.com".into(),
            ..spec("group/cli")
        })?;
        release.attach_release(ReleaseData::GitLab(GitLabRelease {
            tag_name: "v0.2.0".into(),
            assets: GitLabAssets {
                links: vec![
                    GitLabLink {
                        name: "cli-darwin-amd64".into(),
                        url: "https://gitlab.example/1".into(),
                    },
                    GitLabLink {
                        name: "cli-linux-amd64".into(),
                        url: "https://gitlab.example/2".into(),
                    },
                ],
            },
        }));
        SetUrlAction::default().execute(&mut release)?;
        assert_eq!(
            release.asset().map(|asset| asset.url.as_str()),
            Some("https://gitlab.example/2")
        );
        Ok(())
    }

    #[test]
    fn missing_asset_is_a_hard_stop() -> ReleaseResult<()> {
        let mut release = BinmanRelease::from_spec(&spec("acme/tool"))?;
        release.attach_release(github("v1.0.0", &["tool_darwin_arm64.tar.gz"]));
        let err = SetUrlAction::default().execute(&mut release).err();
        assert!(matches!(err, Some(ReleaseError::AssetNotFound { .. })));
        assert!(release.asset().is_none());
        Ok(())
    }

    #[test]
    fn artifact_path_action_creates_directories() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::TempDir::new()?;
        let context = context(temp.path())?;
        let mut release = context.release(&spec("acme/tool"))?;
        release.attach_release(github("v1.0.0", &["tool_linux_amd64.tar.gz"]));

        let outcome = Pipeline::preparation(&context).run(&mut release)?;
        assert_eq!(outcome, PipelineOutcome::Completed);
        assert!(release.cleanup_on_failure());
        assert!(temp.path().join("bin").is_dir());
        assert!(temp.path().join("repos/acme/tool/v1.0.0").is_dir());
        assert_eq!(
            release.artifact_path(),
            Some(temp.path().join("repos/acme/tool/v1.0.0/tool").as_path())
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_publish_path_fails_status_check() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::TempDir::new()?;
        let root = temp.path().join("not-a-directory");
        fs::write(&root, b"file")?;

        let mut release = BinmanRelease::from_spec(&ReleaseSpec {
            version: Some("v1.0.0".into()),
            ..spec("acme/tool")
        })?;
        let err = ReleaseStatusAction::new(root, None)
            .execute(&mut release)
            .err();
        assert!(matches!(
            err,
            Some(ReleaseError::Io {
                operation: "release.status",
                ..
            })
        ));
        assert!(!release.cleanup_on_failure());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn blocked_publish_directory_is_a_hard_error() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::TempDir::new()?;
        fs::create_dir_all(temp.path().join("repos"))?;
        fs::write(temp.path().join("repos/acme"), b"file")?;

        let context = context(temp.path())?;
        let mut release = BinmanRelease::from_spec(&ReleaseSpec {
            version: Some("v1.0.0".into()),
            ..spec("acme/tool")
        })?;
        release.set_publish_path(temp.path())?;
        release.set_asset(Asset::new("tool_linux_amd64", "https://github.example/tool"));

        let err = SetArtifactPathAction::new(temp.path().to_path_buf(), None, context.matcher)
            .execute(&mut release)
            .err();
        assert!(matches!(
            err,
            Some(ReleaseError::Io {
                operation: "release.create_dir",
                ..
            })
        ));
        assert!(temp.path().join("repos/acme").is_file());
        Ok(())
    }

    #[test]
    fn get_style_context_skips_bin_directory() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::TempDir::new()?;
        let context = context(temp.path())?.without_bin_path();
        let mut release = context.release(&spec("acme/tool"))?;
        release.attach_release(github("v1.0.0", &["tool_linux_amd64"]));
        Pipeline::preparation(&context).run(&mut release)?;
        assert!(!temp.path().join("bin").exists());
        Ok(())
    }
}
