//! Typed configuration documents.
//!
//! # Design
//! - Pure data carriers deserialised from YAML; field names follow the on-disk keys.
//! - Normalisation and validation live in `loader.rs` and `validate.rs`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinmanConfig {
    /// Settings shared by every tracked release.
    #[serde(default)]
    pub config: GlobalConfig,
    /// Releases to track.
    #[serde(default)]
    pub releases: Vec<ReleaseSpec>,
}

impl BinmanConfig {
    /// Look up a tracked release by repository.
    #[must_use]
    pub fn release(&self, repo: &str) -> Option<&ReleaseSpec> {
        self.releases.iter().find(|release| release.repo == repo)
    }

    /// Look up a configured source by name.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.config.sources.iter().find(|source| source.name == name)
    }
}

/// Settings shared by every tracked release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Root directory receiving versioned releases and links.
    #[serde(rename = "releasepath", default)]
    pub release_path: String,
    /// Optional directory created for binaries placed on `PATH`.
    #[serde(rename = "binpath", default, skip_serializing_if = "Option::is_none")]
    pub bin_path: Option<String>,
    /// Release providers available to tracked releases.
    #[serde(default = "defaults::default_sources")]
    pub sources: Vec<SourceConfig>,
    /// Asset selection policy.
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Filename patterns used to classify assets.
    #[serde(default)]
    pub patterns: PatternConfig,
    /// Repository to URL-template overrides for binaries hosted outside releases.
    #[serde(rename = "knownurls", default = "defaults::default_known_urls")]
    pub known_urls: BTreeMap<String, String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            release_path: String::new(),
            bin_path: None,
            sources: defaults::default_sources(),
            selection: SelectionConfig::default(),
            patterns: PatternConfig::default(),
            known_urls: defaults::default_known_urls(),
        }
    }
}

/// A release provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Identifier releases use to reference this source.
    pub name: String,
    /// Base URL of the provider API.
    pub url: String,
    /// Provider API flavour.
    #[serde(rename = "apitype", default)]
    pub api_type: ApiType,
    /// Environment variable holding an access token.
    #[serde(rename = "tokenvar", default, skip_serializing_if = "Option::is_none")]
    pub token_var: Option<String>,
}

/// Provider API flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// GitHub-style releases API.
    #[default]
    Github,
    /// GitLab-style releases API.
    Gitlab,
}

/// Asset selection policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Rule applied when several assets match the requested platform.
    #[serde(rename = "tiebreak", default)]
    pub tie_break: TieBreak,
}

/// Rule applied when several assets match the requested platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// Keep the first candidate in provider order.
    #[default]
    First,
    /// Keep the candidate with the shortest name, then provider order.
    Shortest,
}

/// Regular expressions classifying asset filenames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Names treated as tar archives.
    #[serde(default = "default_tar")]
    pub tar: String,
    /// Names treated as zip archives.
    #[serde(default = "default_zip")]
    pub zip: String,
    /// Names never picked by automatic selection.
    #[serde(default = "default_ignore")]
    pub ignore: String,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            tar: default_tar(),
            zip: default_zip(),
            ignore: default_ignore(),
        }
    }
}

fn default_tar() -> String {
    defaults::DEFAULT_TAR_PATTERN.to_string()
}

fn default_zip() -> String {
    defaults::DEFAULT_ZIP_PATTERN.to_string()
}

fn default_ignore() -> String {
    defaults::DEFAULT_IGNORE_PATTERN.to_string()
}

/// How a release version is queried from its provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    /// Newest published release.
    #[default]
    #[serde(rename = "release")]
    Latest,
    /// Release matching the pinned `version` tag.
    #[serde(rename = "releasebytag")]
    ByTag,
}

impl QueryType {
    /// Whether the release is resolved as "latest".
    #[must_use]
    pub const fn is_latest(self) -> bool {
        matches!(self, Self::Latest)
    }
}

/// A command run after a release has been linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCommand {
    /// Executable to run.
    pub command: String,
    /// Arguments, templated with release data before execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// User intent for a single tracked repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSpec {
    /// Repository identifier (`org/project`).
    pub repo: String,
    /// Name of the source serving this repository.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Target operating system.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,
    /// Target CPU architecture.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arch: String,
    /// Pinned version tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// How the version is queried.
    #[serde(rename = "querytype", default)]
    pub query_type: QueryType,
    /// External download URL template replacing provider assets.
    #[serde(rename = "url", default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    /// Explicit release asset filename template.
    #[serde(rename = "releasefilename", default, skip_serializing_if = "Option::is_none")]
    pub release_file_name: Option<String>,
    /// Explicit path of the binary inside the release archive.
    #[serde(rename = "extractfilename", default, skip_serializing_if = "Option::is_none")]
    pub extract_file_name: Option<String>,
    /// Name of the final link.
    #[serde(rename = "linkname", default, skip_serializing_if = "Option::is_none")]
    pub link_name: Option<String>,
    /// Commands run once the release is linked.
    #[serde(rename = "postcommands", default, skip_serializing_if = "Vec::is_empty")]
    pub post_commands: Vec<PostCommand>,
    /// Keep the downloaded asset as is: no extraction, link or post commands.
    #[serde(rename = "downloadonly", default, skip_serializing_if = "is_false")]
    pub download_only: bool,
    /// Skip extraction and linking and hand the download to the post commands.
    #[serde(rename = "postonly", default, skip_serializing_if = "is_false")]
    pub post_only: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl ReleaseSpec {
    /// Create a spec tracking `repo` with every other field left to defaults.
    #[must_use]
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Self::default()
        }
    }
}

/// Split `org/project` at the last `/`, so nested groups stay in the owner part.
///
/// Returns `None` unless both halves are non-empty.
#[must_use]
pub fn split_repo(repo: &str) -> Option<(&str, &str)> {
    repo.rsplit_once('/')
        .filter(|(org, project)| !org.is_empty() && !project.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_type_uses_on_disk_names() -> Result<(), serde_yaml::Error> {
        let spec: ReleaseSpec =
            serde_yaml::from_str("repo: a/b\nquerytype: releasebytag\nversion: v1.0.0\n")?;
        assert_eq!(spec.query_type, QueryType::ByTag);
        assert!(!spec.query_type.is_latest());
        assert_eq!(spec.version.as_deref(), Some("v1.0.0"));

        let latest: ReleaseSpec = serde_yaml::from_str("repo: a/b\n")?;
        assert!(latest.query_type.is_latest());
        Ok(())
    }

    #[test]
    fn release_spec_reads_override_fields() -> Result<(), serde_yaml::Error> {
        let spec: ReleaseSpec = serde_yaml::from_str(
            "repo: jesseduffield/lazygit\nlinkname: lg\nreleasefilename: lazygit_{{.version}}\nextractfilename: lazygit\nurl: https://example.com/lg\npostcommands:\n  - command: echo\n    args: [\"{{.linkpath}}\"]\n",
        )?;
        assert_eq!(spec.link_name.as_deref(), Some("lg"));
        assert_eq!(spec.release_file_name.as_deref(), Some("lazygit_{{.version}}"));
        assert_eq!(spec.extract_file_name.as_deref(), Some("lazygit"));
        assert_eq!(spec.external_url.as_deref(), Some("https://example.com/lg"));
        assert_eq!(spec.post_commands.len(), 1);
        assert_eq!(spec.post_commands[0].args, vec!["{{.linkpath}}".to_string()]);
        Ok(())
    }

    #[test]
    fn finalize_flags_default_off_and_stay_off_disk() -> Result<(), serde_yaml::Error> {
        let spec: ReleaseSpec = serde_yaml::from_str("repo: a/b\npostonly: true\n")?;
        assert!(spec.post_only);
        assert!(!spec.download_only);
        let text = serde_yaml::to_string(&spec)?;
        assert!(text.contains("postonly: true"));
        assert!(!text.contains("downloadonly"));
        Ok(())
    }

    #[test]
    fn repo_splits_at_last_separator() {
        assert_eq!(split_repo("group/sub/tool"), Some(("group/sub", "tool")));
        assert_eq!(split_repo("group/sub/"), None);
        assert_eq!(split_repo("/tool"), None);
        assert_eq!(split_repo("tool"), None);
    }
}
