//! Actions run after the asset has been downloaded into the publish directory.
//!
//! Unpacking archives and creating links are delegated to the [`Extractor`] and
//! [`Linker`] collaborators; [`SymlinkLinker`] is the filesystem default.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, info};

use crate::actions::{Action, ActionKind, ActionOutcome};
use crate::descriptor::BinmanRelease;
use crate::error::{ReleaseError, ReleaseResult};
use crate::filetype::{FileKind, FileTypeMatcher};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Unpacks a downloaded archive.
pub trait Extractor: Send + Sync + fmt::Debug {
    /// Unpack `archive` of the given kind into `destination`.
    ///
    /// # Errors
    ///
    /// Implementations report failures as [`ReleaseError`]s, typically
    /// [`ReleaseError::Collaborator`].
    fn extract(&self, kind: FileKind, archive: &Path, destination: &Path) -> ReleaseResult<()>;
}

/// Points a stable name at an artifact.
pub trait Linker: Send + Sync + fmt::Debug {
    /// Make `link` reference `artifact`.
    ///
    /// # Errors
    ///
    /// Implementations report failures as [`ReleaseError`]s.
    fn link(&self, artifact: &Path, link: &Path) -> ReleaseResult<()>;
}

/// Links artifacts with filesystem symlinks, replacing earlier links.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymlinkLinker;

impl Linker for SymlinkLinker {
    fn link(&self, artifact: &Path, link: &Path) -> ReleaseResult<()> {
        match fs::symlink_metadata(link) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                fs::remove_file(link).map_err(|err| ReleaseError::io("link.remove", link, err))?;
            }
            Ok(_) => {
                return Err(ReleaseError::LinkOccupied {
                    path: link.to_path_buf(),
                });
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(ReleaseError::io("link.inspect", link, err)),
        }
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| ReleaseError::io("link.create_parent", parent, err))?;
        }
        symlink(artifact, link).map_err(|err| ReleaseError::io("link.create", link, err))
    }
}

#[cfg(unix)]
fn symlink(artifact: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(artifact, link)
}

#[cfg(windows)]
fn symlink(artifact: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(artifact, link)
}

/// Unpacks archives, or marks a raw binary executable.
#[derive(Debug, Clone)]
pub struct ExtractAction {
    matcher: FileTypeMatcher,
    extractor: Arc<dyn Extractor>,
}

impl ExtractAction {
    /// Create the action.
    #[must_use]
    pub const fn new(matcher: FileTypeMatcher, extractor: Arc<dyn Extractor>) -> Self {
        Self { matcher, extractor }
    }
}

impl Action for ExtractAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Extract
    }

    fn execute(&self, release: &mut BinmanRelease) -> ReleaseResult<ActionOutcome> {
        let download = release.download_path()?;
        let publish = release.require_publish_path()?;
        let kind = self.matcher.classify(&release.require_asset()?.name);
        if kind.is_archive() {
            self.extractor.extract(kind, &download, publish)?;
        } else {
            mark_executable(&download)?;
        }
        Ok(ActionOutcome::Completed(Some(format!(
            "{} handled as {}",
            download.display(),
            kind.as_str()
        ))))
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> ReleaseResult<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|err| ReleaseError::io("extract.chmod", path, err))
}

#[cfg(not(unix))]
fn mark_executable(path: &Path) -> ReleaseResult<()> {
    fs::metadata(path)
        .map(drop)
        .map_err(|err| ReleaseError::io("extract.stat", path, err))
}

/// Runs the artifact finder over the publish directory.
#[derive(Debug, Clone)]
pub struct FindTargetAction {
    matcher: FileTypeMatcher,
}

impl FindTargetAction {
    /// Create the action.
    #[must_use]
    pub const fn new(matcher: FileTypeMatcher) -> Self {
        Self { matcher }
    }
}

impl Action for FindTargetAction {
    fn kind(&self) -> ActionKind {
        ActionKind::FindTarget
    }

    fn execute(&self, release: &mut BinmanRelease) -> ReleaseResult<ActionOutcome> {
        let found = release.find_target(&self.matcher)?;
        Ok(ActionOutcome::Completed(Some(found.display().to_string())))
    }
}

/// Points the release link at the discovered artifact.
#[derive(Debug, Clone)]
pub struct LinkAction {
    linker: Arc<dyn Linker>,
}

impl LinkAction {
    /// Create the action.
    #[must_use]
    pub const fn new(linker: Arc<dyn Linker>) -> Self {
        Self { linker }
    }
}

impl Action for LinkAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Link
    }

    fn execute(&self, release: &mut BinmanRelease) -> ReleaseResult<ActionOutcome> {
        let artifact = release.require_artifact_path()?;
        let link = release.require_link_path()?;
        self.linker.link(artifact, link)?;
        info!(
            repo = %release.repo(),
            link = %link.display(),
            artifact = %artifact.display(),
            "release linked"
        );
        Ok(ActionOutcome::Completed(None))
    }
}

/// Runs the configured post commands in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostCommandsAction;

impl Action for PostCommandsAction {
    fn kind(&self) -> ActionKind {
        ActionKind::PostCommands
    }

    fn execute(&self, release: &mut BinmanRelease) -> ReleaseResult<ActionOutcome> {
        for command in release.post_commands() {
            let args: Vec<String> = command.args.iter().map(|arg| release.format(arg)).collect();
            debug!(
                repo = %release.repo(),
                command = %command.command,
                ?args,
                "running post command"
            );
            let output = Command::new(&command.command)
                .args(&args)
                .output()
                .map_err(|err| {
                    ReleaseError::io("post_command.spawn", PathBuf::from(&command.command), err)
                })?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                info!(
                    repo = %release.repo(),
                    command = %command.command,
                    output = %stdout.trim(),
                    "post command output"
                );
            }
            if !output.status.success() {
                return Err(ReleaseError::CommandFailed {
                    command: command.command.clone(),
                    code: output.status.code(),
                });
            }
        }
        Ok(ActionOutcome::Completed(Some(format!(
            "{} command(s)",
            release.post_commands().len()
        ))))
    }
}
