use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use binman_config::{BinmanConfig, ReleaseSpec};
use binman_release::{
    BinmanRelease, FinalizeMode, Pipeline, PipelineOutcome, ReleaseContext, ReleaseError,
    SymlinkLinker,
};
use binman_telemetry::Metrics;
use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::cli::{AppContext, SyncArgs};
use crate::client::{CliError, CliResult};
use crate::commands::config::load_required;
use crate::extract::ArchiveExtractor;
use crate::output::{
    RepoReport, SyncStatus, describe_release_error, render_metrics, render_reports,
};
use crate::providers::{ProviderClient, download};

pub(crate) async fn handle_sync(ctx: &AppContext, args: SyncArgs) -> CliResult<()> {
    let config = load_required(&ctx.config_path()?)?;
    let metrics = new_metrics(args.metrics)?;
    let context = Arc::new(release_context(&config, metrics.clone())?);

    let specs: Vec<ReleaseSpec> = if args.repos.is_empty() {
        config.releases.clone()
    } else {
        args.repos
            .iter()
            .map(|repo| {
                config.release(repo).cloned().ok_or_else(|| {
                    CliError::validation(format!("{repo} is not tracked in the configuration"))
                })
            })
            .collect::<CliResult<_>>()?
    };
    let jobs = plan_jobs(&ctx.client, &config, &context, specs)?;

    let reports = sync_all(jobs, args.jobs).await;
    finish(&reports, ctx, metrics.as_ref())
}

pub(crate) fn new_metrics(enabled: bool) -> CliResult<Option<Metrics>> {
    if !enabled {
        return Ok(None);
    }
    Metrics::new()
        .map(Some)
        .map_err(|err| CliError::failure(anyhow!("failed to create metrics registry: {err}")))
}

pub(crate) fn release_context(
    config: &BinmanConfig,
    metrics: Option<Metrics>,
) -> CliResult<ReleaseContext> {
    ReleaseContext::from_config(&config.config, metrics).map_err(release_failure)
}

/// Pair every spec with a client for its source.
pub(crate) fn plan_jobs(
    client: &Client,
    config: &BinmanConfig,
    context: &Arc<ReleaseContext>,
    specs: Vec<ReleaseSpec>,
) -> CliResult<Vec<ReleaseJob>> {
    specs
        .into_iter()
        .map(|spec| {
            let source = config.source(&spec.source).ok_or_else(|| {
                CliError::validation(format!("{}: unknown source {:?}", spec.repo, spec.source))
            })?;
            Ok(ReleaseJob {
                client: client.clone(),
                provider: ProviderClient::from_env(client.clone(), source),
                context: Arc::clone(context),
                spec,
            })
        })
        .collect()
}

/// Render the summary and metrics, failing when any repository failed.
pub(crate) fn finish(
    reports: &[RepoReport],
    ctx: &AppContext,
    metrics: Option<&Metrics>,
) -> CliResult<()> {
    render_reports(reports, ctx.output)?;
    if let Some(metrics) = metrics {
        let text = metrics
            .render()
            .map_err(|err| CliError::failure(anyhow!("failed to render metrics: {err}")))?;
        render_metrics(&text);
    }
    let failed = reports
        .iter()
        .filter(|report| report.status == SyncStatus::Failed)
        .count();
    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::failure(anyhow!(
            "{failed} of {} release(s) failed",
            reports.len()
        )))
    }
}

/// Everything needed to sync one repository.
#[derive(Debug)]
pub(crate) struct ReleaseJob {
    pub(crate) client: Client,
    pub(crate) provider: ProviderClient,
    pub(crate) context: Arc<ReleaseContext>,
    pub(crate) spec: ReleaseSpec,
}

/// Sync every job with at most `parallelism` running at once.
pub(crate) async fn sync_all(jobs: Vec<ReleaseJob>, parallelism: usize) -> Vec<RepoReport> {
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut tasks = JoinSet::new();
    let mut repos = HashMap::new();
    for job in jobs {
        let repo = job.spec.repo.clone();
        let semaphore = Arc::clone(&semaphore);
        let handle = tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            sync_release(job).await
        });
        repos.insert(handle.id(), repo);
    }

    let mut reports = Vec::with_capacity(repos.len());
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, report)) => reports.push(report),
            Err(err) => {
                let repo = repos.remove(&err.id()).unwrap_or_default();
                error!(repo = %repo, error = %err, "sync task aborted");
                reports.push(RepoReport {
                    repo,
                    version: None,
                    status: SyncStatus::Failed,
                    detail: Some(format!("sync task aborted: {err}")),
                });
            }
        }
    }
    reports.sort_by(|left, right| left.repo.cmp(&right.repo));
    reports
}

/// Fetch, prepare, download and finalize one release, rolling back on failure.
pub(crate) async fn sync_release(job: ReleaseJob) -> RepoReport {
    let repo = job.spec.repo.clone();
    let mut slot = match job.context.release(&job.spec) {
        Ok(release) => Some(release),
        Err(err) => return failed(repo, None, &release_failure(err)),
    };

    let result = drive(&job, &mut slot).await;
    let version = slot
        .as_ref()
        .and_then(BinmanRelease::version)
        .map(str::to_string);
    match result {
        Ok(PipelineOutcome::UpToDate) => {
            info!(repo = %repo, version = ?version, "release up to date");
            RepoReport {
                repo,
                version,
                status: SyncStatus::UpToDate,
                detail: None,
            }
        }
        Ok(PipelineOutcome::Completed) => {
            let detail = slot.as_ref().and_then(completed_path);
            info!(repo = %repo, version = ?version, link = ?detail, "release synced");
            RepoReport {
                repo,
                version,
                status: SyncStatus::Updated,
                detail,
            }
        }
        Err(err) => {
            if let Some(release) = slot.as_mut()
                && let Err(rollback) = release.rollback()
            {
                warn!(
                    repo = %repo,
                    error = %describe_release_error(&rollback),
                    "rollback failed"
                );
            }
            error!(repo = %repo, error = %err.display_message(), "release sync failed");
            failed(repo, version, &err)
        }
    }
}

async fn drive(job: &ReleaseJob, slot: &mut Option<BinmanRelease>) -> CliResult<PipelineOutcome> {
    let data = job
        .provider
        .fetch(&job.spec.repo, job.spec.query_type, job.spec.version.as_deref())
        .await?;
    slot.as_mut().ok_or_else(state_lost)?.attach_release(data);

    let preparation = Pipeline::preparation(&job.context);
    if run_pipeline(preparation, slot).await? == PipelineOutcome::UpToDate {
        return Ok(PipelineOutcome::UpToDate);
    }

    let (url, destination) = {
        let release = slot.as_ref().ok_or_else(state_lost)?;
        let asset = release
            .asset()
            .ok_or_else(|| CliError::failure(anyhow!("{}: no asset resolved", release.repo())))?;
        (
            asset.url.clone(),
            release.download_path().map_err(release_failure)?,
        )
    };
    download(&job.client, &url, &destination).await?;

    let mode = slot.as_ref().ok_or_else(state_lost)?.finalize_mode();
    let finalize = Pipeline::finalize(
        &job.context,
        mode,
        Arc::new(ArchiveExtractor),
        Arc::new(SymlinkLinker),
    );
    run_pipeline(finalize, slot).await
}

/// Run a pipeline off the async runtime, handing the release back afterwards.
///
/// A panicking action still returns the release so the caller can roll it back.
async fn run_pipeline(
    pipeline: Pipeline,
    slot: &mut Option<BinmanRelease>,
) -> CliResult<PipelineOutcome> {
    let mut release = slot.take().ok_or_else(state_lost)?;
    let (release, result) = tokio::task::spawn_blocking(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&mut release)));
        (release, result)
    })
    .await
    .map_err(|err| CliError::failure(anyhow!("pipeline task failed: {err}")))?;
    *slot = Some(release);
    match result {
        Ok(outcome) => outcome.map_err(release_failure),
        Err(_) => Err(CliError::failure(anyhow!("pipeline action panicked"))),
    }
}

/// The link for a full run, otherwise the downloaded file.
fn completed_path(release: &BinmanRelease) -> Option<String> {
    let path = match release.finalize_mode() {
        FinalizeMode::Full => release.link_path().map(Path::to_path_buf),
        FinalizeMode::DownloadOnly | FinalizeMode::PostOnly => release.download_path().ok(),
    };
    path.map(|path| path.display().to_string())
}

fn state_lost() -> CliError {
    CliError::failure(anyhow!("release state unavailable"))
}

/// Configuration problems are user errors; runtime failures are operational.
pub(crate) fn release_failure(error: ReleaseError) -> CliError {
    let message = describe_release_error(&error);
    if error.is_configuration() {
        CliError::validation(message)
    } else {
        CliError::failure(anyhow!(message))
    }
}

fn failed(repo: String, version: Option<String>, error: &CliError) -> RepoReport {
    RepoReport {
        repo,
        version,
        status: SyncStatus::Failed,
        detail: Some(error.display_message()),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use anyhow::anyhow;
    use binman_release::{
        Action, ActionKind, ActionOutcome, GitHubAsset, GitHubRelease, ReleaseData,
        ReleaseResult,
    };
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    const ASSET: &str = "tool_1.0.0_linux_amd64.tar.gz";

    fn tarball(entries: &[(&str, &[u8])]) -> anyhow::Result<Vec<u8>> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *body)?;
        }
        Ok(builder.into_inner()?.finish()?)
    }

    fn config(root: &Path, server: &MockServer, repos: &[&str]) -> anyhow::Result<BinmanConfig> {
        let mut text = format!(
            "config:\n  releasepath: {}\n  sources:\n    - name: github.com\n      url: {}\n      apitype: github\nreleases:\n",
            root.display(),
            server.base_url()
        );
        for repo in repos {
            text.push_str(&format!("  - repo: {repo}\n    os: linux\n    arch: amd64\n"));
        }
        binman_config::parse(&text).map_err(|err| anyhow!("{err:?}"))
    }

    fn jobs(config: &BinmanConfig, metrics: Option<Metrics>) -> anyhow::Result<Vec<ReleaseJob>> {
        let context = release_context(config, metrics).map_err(|err| anyhow!(err.display_message()))?;
        plan_jobs(
            &Client::new(),
            config,
            &Arc::new(context),
            config.releases.clone(),
        )
        .map_err(|err| anyhow!(err.display_message()))
    }

    async fn mock_release(server: &MockServer, repo: &str, tag: &str, asset: &str) {
        let url = server.url(format!("/download/{repo}/{asset}"));
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/repos/{repo}/releases/latest"));
                then.status(200).json_body(json!({
                    "tag_name": tag,
                    "assets": [
                        {"name": asset, "browser_download_url": url},
                        {"name": "checksums.txt", "browser_download_url": "https://unused"}
                    ]
                }));
            })
            .await;
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn sync_release_downloads_extracts_and_links() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let temp = TempDir::new()?;
        mock_release(&server, "acme/tool", "v1.0.0", ASSET).await;
        let body = tarball(&[("tool_1.0.0_linux_amd64/tool", b"#!/bin/sh\n")])?;
        let download = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/download/acme/tool/{ASSET}"));
                then.status(200).body(body);
            })
            .await;

        let config = config(temp.path(), &server, &["acme/tool"])?;
        let metrics = Metrics::new()?;
        let mut planned = jobs(&config, Some(metrics.clone()))?;
        let report = sync_release(planned.remove(0)).await;

        assert_eq!(report.status, SyncStatus::Updated, "{report:?}");
        assert_eq!(report.version.as_deref(), Some("v1.0.0"));
        let publish = temp.path().join("repos/acme/tool/v1.0.0");
        let link = temp.path().join("tool");
        assert_eq!(
            fs::read_link(&link)?,
            publish.join("tool_1.0.0_linux_amd64/tool")
        );
        assert_eq!(report.detail, Some(link.display().to_string()));
        assert_eq!(metrics.action_count("post_commands", "completed"), 1);

        let mut planned = jobs(&config, None)?;
        let again = sync_release(planned.remove(0)).await;
        assert_eq!(again.status, SyncStatus::UpToDate);
        download.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn download_only_release_reports_the_download() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let temp = TempDir::new()?;
        mock_release(&server, "acme/tool", "v1.0.0", ASSET).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/download/acme/tool/{ASSET}"));
                then.status(200).body("not really a tarball");
            })
            .await;

        let mut config = config(temp.path(), &server, &["acme/tool"])?;
        config.releases[0].download_only = true;
        let mut planned = jobs(&config, None)?;
        let report = sync_release(planned.remove(0)).await;

        let download = temp.path().join("repos/acme/tool/v1.0.0").join(ASSET);
        assert_eq!(report.status, SyncStatus::Updated, "{report:?}");
        assert_eq!(report.detail, Some(download.display().to_string()));
        assert_eq!(fs::read(&download)?, b"not really a tarball");
        assert!(fs::symlink_metadata(temp.path().join("tool")).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn failed_download_rolls_back_and_reports() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let temp = TempDir::new()?;
        mock_release(&server, "acme/broken", "v2.0.0", "broken_linux_amd64").await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/download/acme/broken/broken_linux_amd64");
                then.status(500);
            })
            .await;

        let config = config(temp.path(), &server, &["acme/broken"])?;
        let mut planned = jobs(&config, None)?;
        let report = sync_release(planned.remove(0)).await;

        assert_eq!(report.status, SyncStatus::Failed);
        assert_eq!(report.version.as_deref(), Some("v2.0.0"));
        assert!(report.detail.is_some_and(|detail| detail.contains("download")));
        assert!(!temp.path().join("repos/acme/broken/v2.0.0").exists());
        Ok(())
    }

    #[tokio::test]
    async fn sync_all_isolates_failures_and_sorts_reports() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let temp = TempDir::new()?;
        mock_release(&server, "zeta/tool", "v1.0.0", "tool_linux_amd64").await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/download/zeta/tool/tool_linux_amd64");
                then.status(200).body("#!/bin/sh\n");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/alpha/missing/releases/latest");
                then.status(404);
            })
            .await;

        let config = config(temp.path(), &server, &["zeta/tool", "alpha/missing"])?;
        let reports = sync_all(jobs(&config, None)?, 2).await;

        let summary: Vec<(&str, SyncStatus)> = reports
            .iter()
            .map(|report| (report.repo.as_str(), report.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("alpha/missing", SyncStatus::Failed),
                ("zeta/tool", SyncStatus::Updated)
            ]
        );
        assert!(temp.path().join("tool_linux_amd64").exists());
        Ok(())
    }

    #[derive(Debug)]
    struct PanickingAction;

    impl Action for PanickingAction {
        fn kind(&self) -> ActionKind {
            ActionKind::Extract
        }

        fn execute(&self, _release: &mut BinmanRelease) -> ReleaseResult<ActionOutcome> {
            panic!("extractor bug");
        }
    }

    #[tokio::test]
    async fn panicking_action_hands_release_back_for_rollback() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let temp = TempDir::new()?;
        let config = config(temp.path(), &server, &["acme/tool"])?;
        let context = release_context(&config, None).map_err(|err| anyhow!(err.display_message()))?;
        let mut release = context.release(&config.releases[0])?;
        release.attach_release(ReleaseData::GitHub(GitHubRelease {
            tag_name: "v1.0.0".into(),
            assets: vec![GitHubAsset {
                name: "tool_linux_amd64".into(),
                browser_download_url: "https://github.example/tool_linux_amd64".into(),
            }],
        }));
        let mut slot = Some(release);

        let prepared = run_pipeline(Pipeline::preparation(&context), &mut slot)
            .await
            .map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(prepared, PipelineOutcome::Completed);
        let publish = temp.path().join("repos/acme/tool/v1.0.0");
        assert!(publish.is_dir());

        let result = run_pipeline(Pipeline::new(None).then(PanickingAction), &mut slot).await;
        assert!(result.is_err_and(|err| err.exit_code() == 3));
        let release = slot.as_mut().ok_or_else(|| anyhow!("release was not handed back"))?;
        assert!(release.rollback()?);
        assert!(!publish.exists());
        Ok(())
    }

    #[test]
    fn configuration_errors_map_to_validation() {
        let invalid = release_failure(ReleaseError::InvalidRepo {
            repo: "nope".into(),
        });
        assert_eq!(invalid.exit_code(), 2);
        let runtime = release_failure(ReleaseError::AssetNotFound {
            repo: "acme/tool".into(),
        });
        assert_eq!(runtime.exit_code(), 3);
    }
}
