//! Release provider clients and asset download.

use std::path::Path;

use anyhow::{Context, anyhow};
use binman_config::{ApiType, QueryType, SourceConfig};
use binman_release::{GitHubRelease, GitLabRelease, ReleaseData};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::client::{CliError, CliResult};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITLAB_TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const ERROR_BODY_LIMIT: usize = 256;

/// Fetches release payloads from one configured source.
#[derive(Debug, Clone)]
pub(crate) struct ProviderClient {
    client: Client,
    base_url: String,
    api_type: ApiType,
    token: Option<String>,
}

impl ProviderClient {
    pub(crate) fn new(client: Client, source: &SourceConfig, token: Option<String>) -> Self {
        Self {
            client,
            base_url: source.url.trim_end_matches('/').to_string(),
            api_type: source.api_type,
            token: token.filter(|token| !token.is_empty()),
        }
    }

    /// Build a client whose token is read from the source's `tokenvar`.
    pub(crate) fn from_env(client: Client, source: &SourceConfig) -> Self {
        let token = source
            .token_var
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        Self::new(client, source, token)
    }

    pub(crate) fn release_url(
        &self,
        repo: &str,
        query: QueryType,
        version: Option<&str>,
    ) -> CliResult<String> {
        let tag = match query {
            QueryType::Latest => None,
            QueryType::ByTag => Some(version.filter(|v| !v.is_empty()).ok_or_else(|| {
                CliError::validation(format!("{repo}: releasebytag requires a version"))
            })?),
        };
        let url = match (self.api_type, tag) {
            (ApiType::Github, None) => format!("{}/repos/{repo}/releases/latest", self.base_url),
            (ApiType::Github, Some(tag)) => {
                format!("{}/repos/{repo}/releases/tags/{}", self.base_url, encode(tag))
            }
            (ApiType::Gitlab, None) => format!(
                "{}/projects/{}/releases/permalink/latest",
                self.base_url,
                encode(repo)
            ),
            (ApiType::Gitlab, Some(tag)) => format!(
                "{}/projects/{}/releases/{}",
                self.base_url,
                encode(repo),
                encode(tag)
            ),
        };
        Ok(url)
    }

    /// Fetch the latest release, or the one tagged `version`.
    pub(crate) async fn fetch(
        &self,
        repo: &str,
        query: QueryType,
        version: Option<&str>,
    ) -> CliResult<ReleaseData> {
        let url = self.release_url(repo, query, version)?;
        debug!(repo, url = %url, "fetching release");
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|err| CliError::failure(anyhow!("request to {url} failed: {err}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CliError::failure(anyhow!("{repo}: release not found at {url}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CliError::failure(anyhow!(
                "{repo}: provider returned {status}: {}",
                truncate(&body)
            )));
        }

        let data = match self.api_type {
            ApiType::Github => response
                .json::<GitHubRelease>()
                .await
                .map(ReleaseData::from),
            ApiType::Gitlab => response
                .json::<GitLabRelease>()
                .await
                .map(ReleaseData::from),
        };
        data.map_err(|err| CliError::failure(anyhow!("{repo}: failed to parse release: {err}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match (self.api_type, self.token.as_deref()) {
            (ApiType::Github, Some(token)) => {
                request.header(ACCEPT, GITHUB_ACCEPT).bearer_auth(token)
            }
            (ApiType::Github, None) => request.header(ACCEPT, GITHUB_ACCEPT),
            (ApiType::Gitlab, Some(token)) => request.header(GITLAB_TOKEN_HEADER, token),
            (ApiType::Gitlab, None) => request,
        }
    }
}

/// Stream `url` into `destination`, returning the number of bytes written.
pub(crate) async fn download(client: &Client, url: &str, destination: &Path) -> CliResult<u64> {
    let mut response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|err| CliError::failure(anyhow!("download of {url} failed: {err}")))?;

    let mut file = tokio::fs::File::create(destination)
        .await
        .with_context(|| format!("failed to create {}", destination.display()))
        .map_err(CliError::failure)?;
    let mut written = 0_u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| CliError::failure(anyhow!("download of {url} interrupted: {err}")))?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("failed to write {}", destination.display()))
            .map_err(CliError::failure)?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .with_context(|| format!("failed to flush {}", destination.display()))
        .map_err(CliError::failure)?;
    debug!(url, path = %destination.display(), bytes = written, "download complete");
    Ok(written)
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}
