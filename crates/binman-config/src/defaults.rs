//! Built-in configuration values.
//!
//! # Design
//! - Keep every default in one place so the loader and tests agree.
//! - Host detection maps Rust target names onto the names release assets use.

use std::collections::BTreeMap;

use crate::model::{ApiType, SourceConfig};

/// Release root used when the document does not set `releasepath`.
pub const DEFAULT_RELEASE_PATH: &str = "~/binMan";
/// Source assigned to releases that do not name one.
pub const DEFAULT_SOURCE: &str = "github.com";
/// Public GitHub REST endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";
/// Public GitLab REST endpoint.
pub const GITLAB_API_URL: &str = "https://gitlab.com/api/v4";
/// Filenames treated as tar archives (optionally compressed).
pub const DEFAULT_TAR_PATTERN: &str =
    r"(?i)(\.tar|\.tar\.gz|\.tgz|\.tar\.xz|\.txz|\.tar\.bz2|\.tbz2?|\.tar\.zst)$";
/// Filenames treated as zip archives.
pub const DEFAULT_ZIP_PATTERN: &str = r"(?i)\.zip$";
/// Asset names never considered by automatic selection.
pub const DEFAULT_IGNORE_PATTERN: &str = r"(?i)(\.(sha1|sha256|sha512|md5|sig|asc|pem|crt|sbom|spdx|json|txt|sum|deb|rpm|apk|msi|pkg|dmg)$|checksums?)";

/// Sources available without any user configuration.
#[must_use]
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: DEFAULT_SOURCE.to_string(),
            url: GITHUB_API_URL.to_string(),
            api_type: ApiType::Github,
            token_var: Some("GH_TOKEN".to_string()),
        },
        SourceConfig {
            name: "gitlab.com".to_string(),
            url: GITLAB_API_URL.to_string(),
            api_type: ApiType::Gitlab,
            token_var: Some("GL_TOKEN".to_string()),
        },
    ]
}

/// Repositories whose binaries are published outside their release assets.
#[must_use]
pub fn default_known_urls() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "kubernetes/kubernetes".to_string(),
            "https://dl.k8s.io/release/{{.version}}/bin/{{.os}}/{{.arch}}/kubectl".to_string(),
        ),
        (
            "helm/helm".to_string(),
            "https://get.helm.sh/helm-{{.version}}-{{.os}}-{{.arch}}.tar.gz".to_string(),
        ),
    ])
}

/// Operating system name of the running host, as used in release asset names.
#[must_use]
pub fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// CPU architecture of the running host, as used in release asset names.
#[must_use]
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_names_use_release_vocabulary() {
        assert_ne!(host_os(), "macos");
        assert_ne!(host_arch(), "x86_64");
        assert_ne!(host_arch(), "aarch64");
    }

    #[test]
    fn default_sources_cover_both_providers() {
        let sources = default_sources();
        assert!(sources.iter().any(|source| source.api_type == ApiType::Github));
        assert!(sources.iter().any(|source| source.api_type == ApiType::Gitlab));
        assert!(sources.iter().any(|source| source.name == DEFAULT_SOURCE));
    }
}
