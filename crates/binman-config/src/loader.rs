//! YAML loading and normalisation.
//!
//! # Design
//! - Parsing, normalisation and validation run in that order for both file and string input.
//! - Normalisation only fills absent values; explicit user values are never rewritten.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::defaults::{self, DEFAULT_RELEASE_PATH, DEFAULT_SOURCE};
use crate::error::{ConfigError, ConfigResult};
use crate::model::BinmanConfig;
use crate::validate::validate;

/// Load, normalise and validate the configuration document at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read, [`ConfigError::Parse`]
/// when it is not valid YAML, and any validation error raised by [`validate`].
pub fn load(path: &Path) -> ConfigResult<BinmanConfig> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: Some(path.to_path_buf()),
        source,
    })?;
    let config = finish(config)?;
    debug!(
        path = %path.display(),
        releases = config.releases.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Parse, normalise and validate a configuration document held in memory.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed YAML and any validation error.
pub fn parse(text: &str) -> ConfigResult<BinmanConfig> {
    let config = serde_yaml::from_str(text)
        .map_err(|source| ConfigError::Parse { path: None, source })?;
    finish(config)
}

/// Render a configuration back to YAML.
///
/// # Errors
///
/// Returns [`ConfigError::Serialize`] when serialisation fails.
pub fn to_yaml(config: &BinmanConfig) -> ConfigResult<String> {
    serde_yaml::to_string(config).map_err(|source| ConfigError::Serialize { source })
}

/// Expand a leading `~` to the current user's home directory.
///
/// # Errors
///
/// Returns [`ConfigError::HomeDirUnavailable`] when the path starts with `~`
/// and no home directory is known.
pub fn expand_home(raw: &str) -> ConfigResult<PathBuf> {
    let rest = match raw.strip_prefix('~') {
        None => return Ok(PathBuf::from(raw)),
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        // `~user` forms are taken literally.
        Some(_) => return Ok(PathBuf::from(raw)),
    };
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirUnavailable)?;
    if rest.is_empty() {
        Ok(home)
    } else {
        Ok(home.join(rest))
    }
}

fn finish(mut config: BinmanConfig) -> ConfigResult<BinmanConfig> {
    normalize(&mut config);
    validate(&config)?;
    Ok(config)
}

fn normalize(config: &mut BinmanConfig) {
    if config.config.release_path.trim().is_empty() {
        config.config.release_path = DEFAULT_RELEASE_PATH.to_string();
    }
    for release in &mut config.releases {
        if release.source.is_empty() {
            release.source = DEFAULT_SOURCE.to_string();
        }
        if release.os.is_empty() {
            release.os = defaults::host_os().to_string();
        }
        if release.arch.is_empty() {
            release.arch = defaults::host_arch().to_string();
        }
        if release.version.as_deref().is_some_and(str::is_empty) {
            release.version = None;
        }
    }
}
