//! Provider release payloads and the normalized asset shape.
//!
//! # Design
//! - Each provider keeps its own payload shape; [`ReleaseData`] is the closed set of them.
//! - Consumers only ever see [`Asset`] lists, produced by exhaustive matching.

use serde::{Deserialize, Serialize};

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset filename.
    pub name: String,
    /// Download URL.
    pub url: String,
}

impl Asset {
    /// Build an asset from its name and download URL.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Release payload returned by GitHub-style APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRelease {
    /// Release tag.
    pub tag_name: String,
    /// Attached assets.
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// Asset entry of a GitHub-style release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubAsset {
    /// Asset filename.
    pub name: String,
    /// Public download URL.
    pub browser_download_url: String,
}

/// Release payload returned by GitLab-style APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabRelease {
    /// Release tag.
    pub tag_name: String,
    /// Attached assets.
    #[serde(default)]
    pub assets: GitLabAssets,
}

/// Asset section of a GitLab-style release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabAssets {
    /// Release links.
    #[serde(default)]
    pub links: Vec<GitLabLink>,
}

/// Release link of a GitLab-style release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabLink {
    /// Link name, used as the asset filename.
    pub name: String,
    /// Link target.
    pub url: String,
}

impl GitHubRelease {
    fn normalized(&self) -> Vec<Asset> {
        self.assets
            .iter()
            .map(|asset| Asset::new(&asset.name, &asset.browser_download_url))
            .collect()
    }

    fn asset_by_name(&self, name: &str) -> Option<Asset> {
        self.assets
            .iter()
            .find(|asset| asset.name == name)
            .map(|asset| Asset::new(&asset.name, &asset.browser_download_url))
    }
}

impl GitLabRelease {
    fn normalized(&self) -> Vec<Asset> {
        self.assets
            .links
            .iter()
            .map(|link| Asset::new(&link.name, &link.url))
            .collect()
    }

    fn asset_by_name(&self, name: &str) -> Option<Asset> {
        self.assets
            .links
            .iter()
            .find(|link| link.name == name)
            .map(|link| Asset::new(&link.name, &link.url))
    }
}

/// Release payload of any supported provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseData {
    /// GitHub-style payload.
    GitHub(GitHubRelease),
    /// GitLab-style payload.
    GitLab(GitLabRelease),
}

impl ReleaseData {
    /// Tag the payload was published under.
    #[must_use]
    pub fn tag_name(&self) -> &str {
        match self {
            Self::GitHub(release) => &release.tag_name,
            Self::GitLab(release) => &release.tag_name,
        }
    }

    /// Assets in provider order, converted to the common shape.
    #[must_use]
    pub fn assets(&self) -> Vec<Asset> {
        match self {
            Self::GitHub(release) => release.normalized(),
            Self::GitLab(release) => release.normalized(),
        }
    }

    /// Find an asset by exact filename.
    #[must_use]
    pub fn asset_by_name(&self, name: &str) -> Option<Asset> {
        match self {
            Self::GitHub(release) => release.asset_by_name(name),
            Self::GitLab(release) => release.asset_by_name(name),
        }
    }
}

impl From<GitHubRelease> for ReleaseData {
    fn from(release: GitHubRelease) -> Self {
        Self::GitHub(release)
    }
}

impl From<GitLabRelease> for ReleaseData {
    fn from(release: GitLabRelease) -> Self {
        Self::GitLab(release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_payload_normalizes_download_urls() -> Result<(), serde_json::Error> {
        let release: GitHubRelease = serde_json::from_str(
            r#"{"tag_name":"v1.2.0","draft":false,"assets":[{"name":"tool_linux_amd64.tar.gz","browser_download_url":"https://example.com/t.tgz","size":10}]}"#,
        )?;
        let data = ReleaseData::from(release);
        assert_eq!(data.tag_name(), "v1.2.0");
        assert_eq!(
            data.assets(),
            vec![Asset::new("tool_linux_amd64.tar.gz", "https://example.com/t.tgz")]
        );
        Ok(())
    }

    #[test]
    fn gitlab_payload_uses_release_links() -> Result<(), serde_json::Error> {
        let release: GitLabRelease = serde_json::from_str(
            r#"{"tag_name":"v0.3.1","assets":{"count":1,"links":[{"id":4,"name":"cli-linux-amd64","url":"https://gitlab.example/cli"}]}}"#,
        )?;
        let data = ReleaseData::from(release);
        assert_eq!(
            data.asset_by_name("cli-linux-amd64"),
            Some(Asset::new("cli-linux-amd64", "https://gitlab.example/cli"))
        );
        assert_eq!(data.asset_by_name("cli-darwin-amd64"), None);
        Ok(())
    }
}
